//! Three-way event resolution with conflict detection.
//!
//! For one region and one event layer, [`merge_events`] runs the matcher
//! base→left and base→right independently, then resolves per base event:
//!
//! - both sides modified it → conflict
//! - one side removed it while the other modified it → conflict
//! - one side removed it (other side untouched or also removed) → drop
//! - exactly one side modified it → that side's version
//! - neither side touched it → keep base
//!
//! Independent additions take the union; two additions that collide at the
//! same identity with differing content conflict.
//!
//! [`MergePolicy::PreferLeft`] resolves every would-be conflict by keeping
//! the left side's outcome — used by forced merges at the orchestration
//! layer. The engine's own reporting always runs strict.

use serde::Serialize;

use crate::matcher::{EventMatch, MatchClass, MatchKey, match_events};
use crate::model::RegionId;

// ---------------------------------------------------------------------------
// MergeEventType
// ---------------------------------------------------------------------------

/// The event layer a conflict belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum MergeEventType {
    /// MIDI note.
    #[serde(rename = "note")]
    Note,
    /// Continuous controller.
    #[serde(rename = "cc")]
    Cc,
    /// Pitch bend.
    #[serde(rename = "pb")]
    PitchBend,
    /// Aftertouch.
    #[serde(rename = "at")]
    Aftertouch,
}

impl std::fmt::Display for MergeEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Note => write!(f, "note"),
            Self::Cc => write!(f, "cc"),
            Self::PitchBend => write!(f, "pb"),
            Self::Aftertouch => write!(f, "at"),
        }
    }
}

// ---------------------------------------------------------------------------
// MergeConflict
// ---------------------------------------------------------------------------

/// One irreconcilable three-way disagreement.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MergeConflict {
    /// The region where the conflict occurred (`*` for whole-merge
    /// failures such as a missing common ancestor).
    pub region_id: RegionId,
    /// The event layer involved.
    #[serde(rename = "type")]
    pub event_type: MergeEventType,
    /// Human-readable description.
    pub description: String,
}

impl std::fmt::Display for MergeConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}): {}",
            self.region_id, self.event_type, self.description
        )
    }
}

// ---------------------------------------------------------------------------
// MergePolicy
// ---------------------------------------------------------------------------

/// How disagreements are resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergePolicy {
    /// Report every disagreement as a conflict.
    Strict,
    /// Keep the left side's outcome wherever the sides disagree.
    PreferLeft,
}

// ---------------------------------------------------------------------------
// merge_events
// ---------------------------------------------------------------------------

/// Per-base-event side state, derived from one matcher run.
#[derive(Clone, Debug)]
enum SideState<T> {
    Untouched,
    Removed,
    Modified(T),
}

/// Three-way merge of one event layer within one region.
///
/// Conflicts are appended to `conflicts`; the merged event list is
/// returned (meaningful only when no conflict was appended, but always
/// deterministic). `label` renders an event for conflict descriptions.
#[allow(clippy::too_many_arguments)]
pub fn merge_events<T: MatchKey>(
    base: &[T],
    left: &[T],
    right: &[T],
    tolerance: f64,
    policy: MergePolicy,
    region: &RegionId,
    event_type: MergeEventType,
    conflicts: &mut Vec<MergeConflict>,
    label: impl Fn(&T) -> String,
) -> Vec<T> {
    let left_matches = match_events(base, left, tolerance);
    let right_matches = match_events(base, right, tolerance);

    let left_states = side_states(base.len(), &left_matches);
    let right_states = side_states(base.len(), &right_matches);

    let mut merged: Vec<T> = Vec::with_capacity(base.len().max(left.len()).max(right.len()));

    for (event, (ls, rs)) in base
        .iter()
        .zip(left_states.into_iter().zip(right_states.into_iter()))
    {
        match (ls, rs) {
            (SideState::Untouched, SideState::Untouched) => merged.push(event.clone()),
            (SideState::Modified(after), SideState::Untouched) => merged.push(after),
            (SideState::Untouched, SideState::Modified(after)) => merged.push(after),
            (SideState::Removed, SideState::Removed)
            | (SideState::Removed, SideState::Untouched)
            | (SideState::Untouched, SideState::Removed) => {}
            (SideState::Modified(after), SideState::Modified(_)) => match policy {
                MergePolicy::PreferLeft => merged.push(after),
                MergePolicy::Strict => conflicts.push(MergeConflict {
                    region_id: region.clone(),
                    event_type,
                    description: format!("both sides modified {}", label(event)),
                }),
            },
            (SideState::Removed, SideState::Modified(_)) => match policy {
                // Left removed it; left wins by dropping.
                MergePolicy::PreferLeft => {}
                MergePolicy::Strict => conflicts.push(MergeConflict {
                    region_id: region.clone(),
                    event_type,
                    description: format!(
                        "one side removed while the other modified {}",
                        label(event)
                    ),
                }),
            },
            (SideState::Modified(after), SideState::Removed) => match policy {
                MergePolicy::PreferLeft => merged.push(after),
                MergePolicy::Strict => conflicts.push(MergeConflict {
                    region_id: region.clone(),
                    event_type,
                    description: format!(
                        "one side removed while the other modified {}",
                        label(event)
                    ),
                }),
            },
        }
    }

    // Additions: left's in order, then right's that don't collide.
    let left_adds: Vec<&T> = added(&left_matches);
    let right_adds: Vec<&T> = added(&right_matches);

    for add in &left_adds {
        merged.push((*add).clone());
    }
    for add in right_adds {
        match left_adds
            .iter()
            .find(|l| l.same_identity(add, tolerance))
        {
            None => merged.push(add.clone()),
            Some(l) if l.same_content(add, tolerance) => {
                // Both sides added the same event; one copy suffices.
            }
            Some(_) => match policy {
                MergePolicy::PreferLeft => {}
                MergePolicy::Strict => conflicts.push(MergeConflict {
                    region_id: region.clone(),
                    event_type,
                    description: format!("both sides added conflicting event {}", label(add)),
                }),
            },
        }
    }

    merged
}

/// Per-base-index side state from one matcher run.
fn side_states<T: MatchKey>(base_len: usize, matches: &[EventMatch<T>]) -> Vec<SideState<T>> {
    let mut states: Vec<SideState<T>> = (0..base_len).map(|_| SideState::Untouched).collect();
    for m in matches {
        let Some(bi) = m.base_index else { continue };
        match m.class {
            MatchClass::Removed => states[bi] = SideState::Removed,
            MatchClass::Modified => {
                if let Some(after) = &m.proposed {
                    states[bi] = SideState::Modified(after.clone());
                }
            }
            MatchClass::Unchanged | MatchClass::Added => {}
        }
    }
    states
}

/// Proposed-side events classified as additions, in proposed order.
fn added<T>(matches: &[EventMatch<T>]) -> Vec<&T> {
    matches
        .iter()
        .filter(|m| m.class == MatchClass::Added)
        .filter_map(|m| m.proposed.as_ref())
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
