//! Checkout execution — apply a plan to the working session.
//!
//! [`execute`] applies a [`CheckoutPlan`]'s operations in order inside one
//! working-store transaction. Each operation's outcome is recorded
//! independently; a failure does **not** abort the loop — execution runs to
//! completion to gather a full failure report. After the loop the
//! transaction commits only when every operation succeeded; any failure
//! rolls back the entire transaction, partial in-loop successes included.
//!
//! Every operation appends an SSE-style event record for observability:
//! `{"type":"tool_call","tool":…,"params":…}` on success,
//! `{"type":"error","tool":…,"error":…}` on failure.

use serde::Serialize;

use crate::error::HistoryError;
use crate::store::{StoreError, WorkingStore, WorkingTransaction};

use super::plan::{CheckoutPlan, ToolCall};

// ---------------------------------------------------------------------------
// ExecutionEvent
// ---------------------------------------------------------------------------

/// One observability record emitted per executed operation.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    /// An operation was applied successfully.
    ToolCall {
        /// Canonical tool name.
        tool: String,
        /// The operation's arguments.
        params: serde_json::Value,
    },
    /// An operation failed.
    Error {
        /// Canonical tool name.
        tool: String,
        /// The failure description.
        error: String,
    },
}

// ---------------------------------------------------------------------------
// ExecutionResult
// ---------------------------------------------------------------------------

/// Outcome of executing a checkout plan.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExecutionResult {
    /// Operations that succeeded.
    pub executed: usize,
    /// Operations that failed.
    pub failed: usize,
    /// Per-operation event log, in plan order.
    pub events: Vec<ExecutionEvent>,
    /// `true` when the plan was a no-op and nothing ran.
    pub noop: bool,
}

impl ExecutionResult {
    /// `true` when no operation failed.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.failed == 0
    }
}

// ---------------------------------------------------------------------------
// execute
// ---------------------------------------------------------------------------

/// Execute a checkout plan against the working store, transactionally.
///
/// No-op plans short-circuit without opening a transaction. Otherwise the
/// store mutation is atomic-or-nothing: commit on zero failures, full
/// rollback on any failure.
///
/// # Errors
/// Propagates transaction open/commit/rollback failures. Per-operation
/// failures are *not* errors here — they are reported in the result and
/// trigger rollback.
pub fn execute(
    plan: &CheckoutPlan,
    store: &mut dyn WorkingStore,
) -> Result<ExecutionResult, HistoryError> {
    if plan.is_noop {
        tracing::debug!(target_variation = %plan.target_variation_id, "no-op checkout plan");
        return Ok(ExecutionResult {
            executed: 0,
            failed: 0,
            events: Vec::new(),
            noop: true,
        });
    }

    let label = format!("checkout {}", plan.target_variation_id);
    let mut txn = store.begin_transaction(&label)?;

    let mut executed = 0;
    let mut failed = 0;
    let mut events: Vec<ExecutionEvent> = Vec::with_capacity(plan.operations.len());

    for op in &plan.operations {
        match apply(txn.as_mut(), op) {
            Ok(()) => {
                executed += 1;
                events.push(ExecutionEvent::ToolCall {
                    tool: op.tool_name().to_owned(),
                    params: arguments_json(op),
                });
            }
            Err(err) => {
                failed += 1;
                tracing::debug!(tool = op.tool_name(), error = %err, "operation failed");
                events.push(ExecutionEvent::Error {
                    tool: op.tool_name().to_owned(),
                    error: err.to_string(),
                });
            }
        }
    }

    if failed == 0 {
        txn.commit()?;
    } else {
        txn.rollback()?;
    }
    tracing::info!(
        target_variation = %plan.target_variation_id,
        executed,
        failed,
        "checkout plan executed"
    );

    Ok(ExecutionResult {
        executed,
        failed,
        events,
        noop: false,
    })
}

/// Dispatch one operation to the corresponding store mutator.
fn apply(txn: &mut dyn WorkingTransaction, op: &ToolCall) -> Result<(), StoreError> {
    match op {
        ToolCall::ClearNotes { region_id } => {
            let current = txn.region_notes(region_id)?;
            txn.remove_notes(region_id, &current)
        }
        ToolCall::AddNotes { region_id, notes } => txn.add_notes(region_id, notes),
        ToolCall::AddMidiCc {
            region_id, events, ..
        } => txn.add_cc(region_id, events),
        ToolCall::AddPitchBend { region_id, events } => txn.add_pitch_bends(region_id, events),
        ToolCall::AddAftertouch { region_id, events } => txn.add_aftertouch(region_id, events),
    }
}

/// The `arguments` object of an operation's wire form.
fn arguments_json(op: &ToolCall) -> serde_json::Value {
    serde_json::to_value(op)
        .ok()
        .and_then(|mut v| v.get_mut("arguments").map(serde_json::Value::take))
        .unwrap_or(serde_json::Value::Null)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
