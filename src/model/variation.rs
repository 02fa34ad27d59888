//! Variation (commit) types.
//!
//! A [`Variation`] is an immutable commit capturing a delta of musical
//! changes. Variations form a DAG through `parent_variation_id` and (for
//! merge commits only) `parent2_variation_id`. Each variation owns an
//! ordered list of [`Phrase`]s; each phrase owns ordered note and
//! controller changes scoped to one region.
//!
//! Change shapes are explicit sum types so illegal states (a removal that
//! carries an `after`, an addition with a `before`) are unrepresentable.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::event::{AftertouchEvent, CcEvent, MidiNote, PitchBendEvent};
use super::ids::{RegionId, TrackId, VariationId};

// ---------------------------------------------------------------------------
// EventChange
// ---------------------------------------------------------------------------

/// One recorded change to a single event.
///
/// Serialized with an `"op"` tag:
/// `{"op":"added","after":{…}}`, `{"op":"removed","before":{…}}`,
/// `{"op":"modified","before":{…},"after":{…}}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EventChange<T> {
    /// Event did not exist before and exists after.
    Added {
        /// The new event.
        after: T,
    },
    /// Event existed before and is gone after.
    Removed {
        /// The event that was removed.
        before: T,
    },
    /// Event existed before and after with different content.
    Modified {
        /// State before the change.
        before: T,
        /// State after the change.
        after: T,
    },
}

impl<T> EventChange<T> {
    /// The pre-change state, if any.
    #[must_use]
    pub const fn before(&self) -> Option<&T> {
        match self {
            Self::Added { .. } => None,
            Self::Removed { before } | Self::Modified { before, .. } => Some(before),
        }
    }

    /// The post-change state, if any.
    #[must_use]
    pub const fn after(&self) -> Option<&T> {
        match self {
            Self::Removed { .. } => None,
            Self::Added { after } | Self::Modified { after, .. } => Some(after),
        }
    }
}

/// A change to one MIDI note.
pub type NoteChange = EventChange<MidiNote>;

// ---------------------------------------------------------------------------
// ControllerChange
// ---------------------------------------------------------------------------

/// A change to one controller event, tagged by layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerChange {
    /// Continuous-controller layer.
    Cc(EventChange<CcEvent>),
    /// Pitch-bend layer.
    PitchBend(EventChange<PitchBendEvent>),
    /// Aftertouch layer.
    Aftertouch(EventChange<AftertouchEvent>),
}

// ---------------------------------------------------------------------------
// Phrase
// ---------------------------------------------------------------------------

/// A labeled time-range of changes within one region of one track.
///
/// Owned exclusively by its [`Variation`]; replay applies a phrase's
/// changes in order into the per-region accumulators.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Phrase {
    /// Free-text label ("verse 1 comp", "fill").
    pub label: String,
    /// The region this phrase edits.
    pub region_id: RegionId,
    /// The track that owns the region.
    pub track_id: TrackId,
    /// Region start position on the track timeline, in beats.
    pub region_start_beat: f64,
    /// Phrase range start, in beats.
    pub start_beat: f64,
    /// Phrase range end, in beats.
    pub end_beat: f64,
    /// Ordered note changes.
    pub note_changes: Vec<NoteChange>,
    /// Ordered controller changes.
    pub controller_changes: Vec<ControllerChange>,
}

// ---------------------------------------------------------------------------
// VariationStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of a variation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariationStatus {
    /// Rendered and ready to be committed.
    #[default]
    Ready,
    /// Committed into history.
    Committed,
    /// Rejected; kept for audit but not part of any lineage tip.
    Discarded,
}

impl fmt::Display for VariationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => write!(f, "ready"),
            Self::Committed => write!(f, "committed"),
            Self::Discarded => write!(f, "discarded"),
        }
    }
}

// ---------------------------------------------------------------------------
// Variation
// ---------------------------------------------------------------------------

/// An immutable commit of musical changes.
///
/// Two parent links make the commit set a DAG rather than a tree:
/// `parent2_variation_id` is present only on merge commits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Variation {
    /// Unique identifier.
    pub variation_id: VariationId,
    /// Free-text label describing the edit intent.
    pub intent: String,
    /// Optional longer explanation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    /// Tracks touched by this variation.
    pub affected_tracks: BTreeSet<TrackId>,
    /// Regions touched by this variation.
    pub affected_regions: BTreeSet<RegionId>,
    /// Beat range `(start, end)` covered by the changes.
    pub beat_range: (f64, f64),
    /// Ordered phrases.
    pub phrases: Vec<Phrase>,
    /// First parent (absent only for root commits).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_variation_id: Option<VariationId>,
    /// Second parent (merge commits only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent2_variation_id: Option<VariationId>,
    /// Lifecycle state.
    pub status: VariationStatus,
    /// Creation time, wall-clock milliseconds since the Unix epoch.
    ///
    /// Informational for display; authoritative only as the topological
    /// tie-break `(created_at_ms, variation_id)`.
    pub created_at_ms: u64,
}

impl Variation {
    /// Whether this is a merge commit (has two parents).
    #[must_use]
    pub const fn is_merge(&self) -> bool {
        self.parent2_variation_id.is_some()
    }

    /// Whether this is a root commit (no parents).
    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.parent_variation_id.is_none()
    }
}

// ---------------------------------------------------------------------------
// VariationSummary
// ---------------------------------------------------------------------------

/// Lightweight projection of a [`Variation`] for bulk graph reads.
///
/// Carries everything the graph builder needs without the phrase payloads.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariationSummary {
    /// Unique identifier.
    pub variation_id: VariationId,
    /// Free-text label.
    pub intent: String,
    /// First parent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_variation_id: Option<VariationId>,
    /// Second parent (merge commits only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent2_variation_id: Option<VariationId>,
    /// Lifecycle state.
    pub status: VariationStatus,
    /// Creation time in wall-clock milliseconds.
    pub created_at_ms: u64,
    /// Regions touched.
    pub affected_regions: BTreeSet<RegionId>,
}

impl From<&Variation> for VariationSummary {
    fn from(v: &Variation) -> Self {
        Self {
            variation_id: v.variation_id.clone(),
            intent: v.intent.clone(),
            parent_variation_id: v.parent_variation_id.clone(),
            parent2_variation_id: v.parent2_variation_id.clone(),
            status: v.status,
            created_at_ms: v.created_at_ms,
            affected_regions: v.affected_regions.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// HeadPointer
// ---------------------------------------------------------------------------

/// The per-project pointer to the currently checked-out variation.
///
/// Absent until the first commit sets it; moved on successful checkout or
/// merge; never deleted within a project's lifetime.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadPointer {
    /// The variation HEAD points at.
    pub variation_id: VariationId,
    /// Opaque editor-side state marker captured at commit time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_state_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn vid(s: &str) -> VariationId {
        VariationId::new(s).unwrap()
    }

    fn note(pitch: u8, beat: f64) -> MidiNote {
        MidiNote::new(pitch, beat, 1.0, 100)
    }

    #[test]
    fn event_change_before_after_shapes() {
        let added = NoteChange::Added {
            after: note(60, 0.0),
        };
        assert!(added.before().is_none());
        assert_eq!(added.after().map(|n| n.pitch), Some(60));

        let removed = NoteChange::Removed {
            before: note(62, 1.0),
        };
        assert_eq!(removed.before().map(|n| n.pitch), Some(62));
        assert!(removed.after().is_none());

        let modified = NoteChange::Modified {
            before: note(64, 2.0),
            after: note(65, 2.0),
        };
        assert_eq!(modified.before().map(|n| n.pitch), Some(64));
        assert_eq!(modified.after().map(|n| n.pitch), Some(65));
    }

    #[test]
    fn note_change_serde_tags_op() {
        let added = NoteChange::Added {
            after: note(60, 0.0),
        };
        let json = serde_json::to_string(&added).unwrap();
        assert!(json.contains("\"op\":\"added\""));
        assert!(json.contains("\"after\""));
        assert!(!json.contains("\"before\""));
    }

    #[test]
    fn note_change_serde_roundtrip() {
        let modified = NoteChange::Modified {
            before: note(64, 2.0),
            after: note(65, 2.0),
        };
        let json = serde_json::to_string(&modified).unwrap();
        let back: NoteChange = serde_json::from_str(&json).unwrap();
        assert_eq!(back, modified);
    }

    #[test]
    fn controller_change_serde_layer_tag() {
        let change = ControllerChange::Cc(EventChange::Added {
            after: CcEvent::new(1, 0.0, 64),
        });
        let json = serde_json::to_string(&change).unwrap();
        assert!(json.starts_with("{\"cc\""));

        let change = ControllerChange::PitchBend(EventChange::Removed {
            before: PitchBendEvent::new(0.5, 1024),
        });
        let json = serde_json::to_string(&change).unwrap();
        assert!(json.starts_with("{\"pitch_bend\""));

        let change = ControllerChange::Aftertouch(EventChange::Added {
            after: AftertouchEvent::poly(0.0, 80, 60),
        });
        let json = serde_json::to_string(&change).unwrap();
        assert!(json.starts_with("{\"aftertouch\""));
    }

    #[test]
    fn variation_merge_and_root_predicates() {
        let mut v = Variation {
            variation_id: vid("v1"),
            intent: "seed".to_owned(),
            explanation: None,
            affected_tracks: BTreeSet::new(),
            affected_regions: BTreeSet::new(),
            beat_range: (0.0, 4.0),
            phrases: Vec::new(),
            parent_variation_id: None,
            parent2_variation_id: None,
            status: VariationStatus::Committed,
            created_at_ms: 1,
        };
        assert!(v.is_root());
        assert!(!v.is_merge());

        v.parent_variation_id = Some(vid("v0"));
        assert!(!v.is_root());

        v.parent2_variation_id = Some(vid("v0b"));
        assert!(v.is_merge());
    }

    #[test]
    fn status_display() {
        assert_eq!(format!("{}", VariationStatus::Ready), "ready");
        assert_eq!(format!("{}", VariationStatus::Committed), "committed");
        assert_eq!(format!("{}", VariationStatus::Discarded), "discarded");
    }

    #[test]
    fn summary_from_variation() {
        let v = Variation {
            variation_id: vid("v1"),
            intent: "add chords".to_owned(),
            explanation: Some("voicing pass".to_owned()),
            affected_tracks: BTreeSet::new(),
            affected_regions: [RegionId::new("r1").unwrap()].into_iter().collect(),
            beat_range: (0.0, 8.0),
            phrases: Vec::new(),
            parent_variation_id: Some(vid("v0")),
            parent2_variation_id: None,
            status: VariationStatus::Committed,
            created_at_ms: 42,
        };
        let s = VariationSummary::from(&v);
        assert_eq!(s.variation_id, v.variation_id);
        assert_eq!(s.parent_variation_id, v.parent_variation_id);
        assert_eq!(s.created_at_ms, 42);
        assert_eq!(s.affected_regions.len(), 1);
    }

    #[test]
    fn head_pointer_serde_omits_missing_state_id() {
        let head = HeadPointer {
            variation_id: vid("v9"),
            commit_state_id: None,
        };
        let json = serde_json::to_string(&head).unwrap();
        assert!(!json.contains("commit_state_id"));
    }
}
