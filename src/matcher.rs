//! Event Matcher — the diff primitive under drift, checkout, and merge.
//!
//! Aligns two ordered collections of musical events ("base" and "proposed")
//! by identity and classifies every event as added, removed, modified, or
//! unchanged. A single greedy pass: each base event claims the first
//! still-unclaimed proposed event with the same identity; leftovers on the
//! base side are removals, leftovers on the proposed side are additions.
//!
//! Identity is per event kind:
//! - **Notes** — exact pitch plus start beat within the configured
//!   tolerance.
//! - **CC** — controller number only; timing does not participate in
//!   identity. A matched pair is modified when its value differs.
//! - **Pitch bend** — beat within tolerance.
//! - **Aftertouch** — beat within tolerance plus equal poly pitch
//!   (a poly event and a channel event are never the same identity).
//!
//! The interface is symmetric but the result is not: swapping base and
//! proposed flips added and removed.

use crate::model::event::{AftertouchEvent, CcEvent, MidiNote, PitchBendEvent, beats_close};

// ---------------------------------------------------------------------------
// MatchClass
// ---------------------------------------------------------------------------

/// Classification of one aligned event pair (or unpaired event).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchClass {
    /// Present only on the proposed side.
    Added,
    /// Present only on the base side.
    Removed,
    /// Present on both sides with differing content.
    Modified,
    /// Present on both sides with equal content.
    Unchanged,
}

impl std::fmt::Display for MatchClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Added => write!(f, "added"),
            Self::Removed => write!(f, "removed"),
            Self::Modified => write!(f, "modified"),
            Self::Unchanged => write!(f, "unchanged"),
        }
    }
}

// ---------------------------------------------------------------------------
// EventMatch
// ---------------------------------------------------------------------------

/// One alignment produced by the matcher.
///
/// `Added` carries only the proposed side, `Removed` only the base side,
/// `Modified`/`Unchanged` carry both. Indices point into the input slices.
#[derive(Clone, Debug, PartialEq)]
pub struct EventMatch<T> {
    /// The base-side event, if any.
    pub base: Option<T>,
    /// The proposed-side event, if any.
    pub proposed: Option<T>,
    /// Index of `base` in the base input.
    pub base_index: Option<usize>,
    /// Index of `proposed` in the proposed input.
    pub proposed_index: Option<usize>,
    /// Classification.
    pub class: MatchClass,
}

impl<T> EventMatch<T> {
    /// `true` for anything other than `Unchanged`.
    #[must_use]
    pub fn is_change(&self) -> bool {
        self.class != MatchClass::Unchanged
    }
}

// ---------------------------------------------------------------------------
// MatchKey — identity and content comparison per event kind
// ---------------------------------------------------------------------------

/// Identity and content rules for one event kind.
///
/// The matcher itself is generic; each event type supplies what "same
/// identity" and "same content" mean for it.
pub trait MatchKey: Clone {
    /// Whether two events are candidates for the same identity.
    fn same_identity(&self, other: &Self, tolerance: f64) -> bool;
    /// Whether two same-identity events are equal in content
    /// (classifies modified vs unchanged).
    fn same_content(&self, other: &Self, tolerance: f64) -> bool;
}

impl MatchKey for MidiNote {
    fn same_identity(&self, other: &Self, tolerance: f64) -> bool {
        self.pitch == other.pitch && beats_close(self.start_beat, other.start_beat, tolerance)
    }

    fn same_content(&self, other: &Self, tolerance: f64) -> bool {
        beats_close(self.duration_beats, other.duration_beats, tolerance)
            && self.velocity == other.velocity
            && self.channel == other.channel
    }
}

impl MatchKey for CcEvent {
    fn same_identity(&self, other: &Self, _tolerance: f64) -> bool {
        self.cc == other.cc
    }

    fn same_content(&self, other: &Self, _tolerance: f64) -> bool {
        self.value == other.value
    }
}

impl MatchKey for PitchBendEvent {
    fn same_identity(&self, other: &Self, tolerance: f64) -> bool {
        beats_close(self.beat, other.beat, tolerance)
    }

    fn same_content(&self, other: &Self, _tolerance: f64) -> bool {
        self.value == other.value
    }
}

impl MatchKey for AftertouchEvent {
    fn same_identity(&self, other: &Self, tolerance: f64) -> bool {
        self.pitch == other.pitch && beats_close(self.beat, other.beat, tolerance)
    }

    fn same_content(&self, other: &Self, _tolerance: f64) -> bool {
        self.value == other.value
    }
}

// ---------------------------------------------------------------------------
// match_events
// ---------------------------------------------------------------------------

/// Align `base` against `proposed` and classify every event.
///
/// Output order: base events in base order (removed/modified/unchanged),
/// then unmatched proposed events in proposed order (added). Deterministic
/// for identical inputs.
pub fn match_events<T: MatchKey>(base: &[T], proposed: &[T], tolerance: f64) -> Vec<EventMatch<T>> {
    let mut claimed = vec![false; proposed.len()];
    let mut out: Vec<EventMatch<T>> = Vec::with_capacity(base.len().max(proposed.len()));

    for (bi, b) in base.iter().enumerate() {
        let candidate = proposed
            .iter()
            .enumerate()
            .find(|(pi, p)| !claimed[*pi] && b.same_identity(p, tolerance));

        match candidate {
            Some((pi, p)) => {
                claimed[pi] = true;
                let class = if b.same_content(p, tolerance) {
                    MatchClass::Unchanged
                } else {
                    MatchClass::Modified
                };
                out.push(EventMatch {
                    base: Some(b.clone()),
                    proposed: Some(p.clone()),
                    base_index: Some(bi),
                    proposed_index: Some(pi),
                    class,
                });
            }
            None => out.push(EventMatch {
                base: Some(b.clone()),
                proposed: None,
                base_index: Some(bi),
                proposed_index: None,
                class: MatchClass::Removed,
            }),
        }
    }

    for (pi, p) in proposed.iter().enumerate() {
        if !claimed[pi] {
            out.push(EventMatch {
                base: None,
                proposed: Some(p.clone()),
                base_index: None,
                proposed_index: Some(pi),
                class: MatchClass::Added,
            });
        }
    }

    out
}

/// Tallied counts over one matcher run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MatchCounts {
    /// Events present only on the proposed side.
    pub added: usize,
    /// Events present only on the base side.
    pub removed: usize,
    /// Matched pairs with differing content.
    pub modified: usize,
    /// Matched pairs with equal content.
    pub unchanged: usize,
}

impl MatchCounts {
    /// Tally a match list.
    #[must_use]
    pub fn tally<T>(matches: &[EventMatch<T>]) -> Self {
        let mut counts = Self::default();
        for m in matches {
            match m.class {
                MatchClass::Added => counts.added += 1,
                MatchClass::Removed => counts.removed += 1,
                MatchClass::Modified => counts.modified += 1,
                MatchClass::Unchanged => counts.unchanged += 1,
            }
        }
        counts
    }

    /// Total added + removed + modified.
    #[must_use]
    pub const fn changes(&self) -> usize {
        self.added + self.removed + self.modified
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
