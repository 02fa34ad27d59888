//! History error types for cadenza.
//!
//! Defines [`HistoryError`], the unified error type for checkout and merge
//! operations. Error messages are designed to be caller-friendly: each
//! variant includes a clear description of what went wrong and actionable
//! guidance on how to proceed.
//!
//! No error class is retried internally — all retry policy belongs to the
//! caller. Blocking classes (dirty working tree, merge conflicts) expose a
//! structured wire payload via [`HistoryError::to_payload`].

use std::fmt;

use crate::checkout::execute::ExecutionEvent;
use crate::drift::DriftSeverity;
use crate::merge::MergeConflict;
use crate::model::VariationId;
use crate::store::StoreError;

// ---------------------------------------------------------------------------
// HistoryError
// ---------------------------------------------------------------------------

/// Unified error type for history operations.
#[derive(Debug)]
pub enum HistoryError {
    /// The target (or a merge side) variation cannot be reconstructed.
    VariationNotFound {
        /// The id that could not be resolved.
        id: VariationId,
    },

    /// The working tree has drifted from HEAD and `force` was not set.
    CheckoutBlocked {
        /// Always `dirty` when this error is raised.
        severity: DriftSeverity,
        /// Total changed events across all dirty regions.
        total_changes: usize,
    },

    /// One or more irreconcilable three-way conflicts.
    MergeConflicted {
        /// Every conflict found, across all regions and event types.
        conflicts: Vec<MergeConflict>,
    },

    /// Some plan operations failed; the transaction was rolled back in
    /// full and HEAD was not moved.
    ExecutionFailed {
        /// Operations that succeeded before the rollback.
        executed: usize,
        /// Operations that failed.
        failed: usize,
        /// The full per-operation event log, including error events.
        events: Vec<ExecutionEvent>,
    },

    /// A recorded change violates a structural invariant. This is a
    /// programming-error class: propagated, never swallowed.
    InvalidChange {
        /// Description of the violated invariant.
        detail: String,
    },

    /// An adapter (repository or working store) failed.
    Store(StoreError),
}

impl fmt::Display for HistoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VariationNotFound { id } => {
                write!(
                    f,
                    "variation '{id}' not found.\n  To fix: list the project's history and pick an existing variation id."
                )
            }
            Self::CheckoutBlocked {
                severity,
                total_changes,
            } => {
                write!(
                    f,
                    "checkout blocked: working tree is {severity} ({total_changes} uncommitted change(s)).\n  To fix: commit or discard the working changes, or re-run with force."
                )
            }
            Self::MergeConflicted { conflicts } => {
                write!(f, "merge conflict in {} place(s):", conflicts.len())?;
                for c in conflicts {
                    write!(f, "\n  - {c}")?;
                }
                write!(
                    f,
                    "\n  To fix: edit one side and retry, or re-run with force to keep the left side."
                )
            }
            Self::ExecutionFailed { executed, failed, .. } => {
                write!(
                    f,
                    "checkout plan partially failed: {executed} operation(s) applied, {failed} failed.\n  The working session was rolled back and HEAD was not moved.\n  To fix: inspect the per-operation events and retry."
                )
            }
            Self::InvalidChange { detail } => {
                write!(f, "structurally invalid change: {detail}")
            }
            Self::Store(err) => write!(f, "store error: {err}"),
        }
    }
}

impl std::error::Error for HistoryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for HistoryError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

// ---------------------------------------------------------------------------
// Wire payloads
// ---------------------------------------------------------------------------

impl HistoryError {
    /// Structured payload for the blocking error classes.
    ///
    /// `CheckoutBlocked` → `{"error":"checkout_blocked","severity":…,"total_changes":…}`;
    /// `MergeConflicted` → `{"error":"merge_conflict","conflicts":[…]}`.
    /// Other classes have no wire payload and return `None`.
    #[must_use]
    pub fn to_payload(&self) -> Option<serde_json::Value> {
        match self {
            Self::CheckoutBlocked {
                severity,
                total_changes,
            } => Some(serde_json::json!({
                "error": "checkout_blocked",
                "severity": severity,
                "total_changes": total_changes,
            })),
            Self::MergeConflicted { conflicts } => Some(serde_json::json!({
                "error": "merge_conflict",
                "conflicts": conflicts,
            })),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
