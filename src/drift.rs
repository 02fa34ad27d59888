//! Drift detection — working session vs. reconstructed HEAD.
//!
//! [`compute_drift`] is a pure function over two snapshots. Per region it
//! first compares combined fingerprints; equal fingerprints record
//! zero-change and skip detailed diffing entirely (the fast path that makes
//! frequent drift polling cheap). Unequal fingerprints trigger one
//! [`crate::matcher`] run per event layer and a tallied
//! [`RegionDriftSummary`] with a capped sample of note-level changes.
//!
//! Severity has exactly two levels: `clean` (no changed, added, or deleted
//! region) and `dirty` (anything else).

use std::fmt;

use serde::Serialize;

use crate::config::EngineConfig;
use crate::matcher::{EventMatch, MatchClass, MatchCounts, match_events};
use crate::model::{MidiNote, ProjectId, RegionId, Snapshot, VariationId};

// ---------------------------------------------------------------------------
// DriftSeverity
// ---------------------------------------------------------------------------

/// Two-level drift severity. Any non-zero delta is `dirty`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftSeverity {
    /// Working session matches HEAD exactly.
    Clean,
    /// At least one region changed, appeared, or disappeared.
    Dirty,
}

impl fmt::Display for DriftSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Clean => write!(f, "clean"),
            Self::Dirty => write!(f, "dirty"),
        }
    }
}

// ---------------------------------------------------------------------------
// ChangeCounts
// ---------------------------------------------------------------------------

/// Added/removed/modified tallies for one event layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ChangeCounts {
    /// Events present only in the working session.
    pub added: usize,
    /// Events present only at HEAD.
    pub removed: usize,
    /// Events present on both sides with differing content.
    pub modified: usize,
}

impl ChangeCounts {
    /// Sum of all three tallies.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.added + self.removed + self.modified
    }
}

impl From<MatchCounts> for ChangeCounts {
    fn from(counts: MatchCounts) -> Self {
        Self {
            added: counts.added,
            removed: counts.removed,
            modified: counts.modified,
        }
    }
}

// ---------------------------------------------------------------------------
// NoteDriftSample
// ---------------------------------------------------------------------------

/// One illustrative note-level change for UI display.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NoteDriftSample {
    /// Added, removed, or modified.
    pub change: MatchClass,
    /// HEAD-side note, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<MidiNote>,
    /// Working-side note, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<MidiNote>,
}

// ---------------------------------------------------------------------------
// RegionDriftSummary
// ---------------------------------------------------------------------------

/// Per-region drift detail.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RegionDriftSummary {
    /// The region this summary covers.
    pub region_id: RegionId,
    /// Note tallies.
    pub notes: ChangeCounts,
    /// CC tallies.
    pub cc: ChangeCounts,
    /// Pitch-bend tallies.
    pub pitch_bend: ChangeCounts,
    /// Aftertouch tallies.
    pub aftertouch: ChangeCounts,
    /// Capped note-change samples, newest-relevant first.
    pub samples: Vec<NoteDriftSample>,
    /// Fingerprint of the region at HEAD.
    pub head_fingerprint: String,
    /// Fingerprint of the region in the working session.
    pub working_fingerprint: String,
}

impl RegionDriftSummary {
    /// Total changed events across all layers.
    #[must_use]
    pub const fn total_changes(&self) -> usize {
        self.notes.total() + self.cc.total() + self.pitch_bend.total() + self.aftertouch.total()
    }
}

// ---------------------------------------------------------------------------
// DriftReport
// ---------------------------------------------------------------------------

/// Full drift comparison for one project.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DriftReport {
    /// The project compared.
    pub project_id: ProjectId,
    /// The HEAD variation the working session was compared against.
    pub head_variation_id: VariationId,
    /// `clean` iff no region changed, appeared, or disappeared.
    pub severity: DriftSeverity,
    /// Detail for every drifted region (including added and deleted ones).
    pub regions: Vec<RegionDriftSummary>,
    /// Regions present only in the working session.
    pub added_regions: Vec<RegionId>,
    /// Regions present only at HEAD.
    pub deleted_regions: Vec<RegionId>,
}

impl DriftReport {
    /// Total changed events across all drifted regions.
    #[must_use]
    pub fn total_changes(&self) -> usize {
        self.regions.iter().map(RegionDriftSummary::total_changes).sum()
    }

    /// Strip per-change samples for transmission in a blocking error
    /// response.
    #[must_use]
    pub fn to_conflict_payload(&self) -> CommitConflictPayload {
        CommitConflictPayload {
            severity: self.severity,
            total_changes: self.total_changes(),
            changed_regions: self
                .regions
                .iter()
                .map(|r| r.region_id.clone())
                .filter(|r| {
                    !self.added_regions.contains(r) && !self.deleted_regions.contains(r)
                })
                .collect(),
            added_regions: self.added_regions.clone(),
            deleted_regions: self.deleted_regions.clone(),
            regions: self
                .regions
                .iter()
                .map(|r| RegionConflictSummary {
                    region_id: r.region_id.clone(),
                    notes: r.notes,
                    cc: r.cc,
                    pitch_bend: r.pitch_bend,
                    aftertouch: r.aftertouch,
                    head_fingerprint: r.head_fingerprint.clone(),
                    working_fingerprint: r.working_fingerprint.clone(),
                })
                .collect(),
        }
    }
}

/// [`DriftReport`] minus the bulky samples — region lists, counts, and the
/// fingerprint pair per dirty region.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CommitConflictPayload {
    /// Drift severity.
    pub severity: DriftSeverity,
    /// Total changed events.
    pub total_changes: usize,
    /// Regions changed on both sides.
    pub changed_regions: Vec<RegionId>,
    /// Regions present only in the working session.
    pub added_regions: Vec<RegionId>,
    /// Regions present only at HEAD.
    pub deleted_regions: Vec<RegionId>,
    /// Per-region counts and fingerprints.
    pub regions: Vec<RegionConflictSummary>,
}

/// Sample-free per-region summary inside [`CommitConflictPayload`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RegionConflictSummary {
    /// The region this summary covers.
    pub region_id: RegionId,
    /// Note tallies.
    pub notes: ChangeCounts,
    /// CC tallies.
    pub cc: ChangeCounts,
    /// Pitch-bend tallies.
    pub pitch_bend: ChangeCounts,
    /// Aftertouch tallies.
    pub aftertouch: ChangeCounts,
    /// Fingerprint of the region at HEAD.
    pub head_fingerprint: String,
    /// Fingerprint of the region in the working session.
    pub working_fingerprint: String,
}

// ---------------------------------------------------------------------------
// compute_drift
// ---------------------------------------------------------------------------

/// Compare a reconstructed HEAD snapshot against the live working snapshot.
///
/// Pure function, no I/O. Deterministic: regions are visited in sorted
/// region-id order and the matcher is deterministic for identical inputs.
#[must_use]
pub fn compute_drift(
    project_id: &ProjectId,
    head_variation_id: &VariationId,
    head: &Snapshot,
    working: &Snapshot,
    config: &EngineConfig,
) -> DriftReport {
    let tolerance = config.matching.note_tolerance_beats;
    let sample_cap = config.drift.sample_cap;

    let head_regions = head.regions();
    let working_regions = working.regions();

    let mut regions: Vec<RegionDriftSummary> = Vec::new();
    let mut added_regions: Vec<RegionId> = Vec::new();
    let mut deleted_regions: Vec<RegionId> = Vec::new();

    let mut all_regions: Vec<&RegionId> = head_regions.union(&working_regions).collect();
    all_regions.sort();

    for region in all_regions {
        let head_fingerprint = head.region_fingerprint(region);
        let working_fingerprint = working.region_fingerprint(region);
        if head_fingerprint == working_fingerprint {
            // Fast path: identical content, nothing to diff.
            continue;
        }

        let note_matches = match_events(
            head.region_notes(region),
            working.region_notes(region),
            tolerance,
        );
        let cc_counts =
            MatchCounts::tally(&match_events(head.region_cc(region), working.region_cc(region), tolerance));
        let pb_counts = MatchCounts::tally(&match_events(
            head.region_pitch_bends(region),
            working.region_pitch_bends(region),
            tolerance,
        ));
        let at_counts = MatchCounts::tally(&match_events(
            head.region_aftertouch(region),
            working.region_aftertouch(region),
            tolerance,
        ));

        let summary = RegionDriftSummary {
            region_id: region.clone(),
            notes: MatchCounts::tally(&note_matches).into(),
            cc: cc_counts.into(),
            pitch_bend: pb_counts.into(),
            aftertouch: at_counts.into(),
            samples: sample_changes(&note_matches, sample_cap),
            head_fingerprint,
            working_fingerprint,
        };

        if summary.total_changes() == 0 {
            // Fingerprints differed but the matcher found no change beyond
            // tolerance (e.g. sub-tolerance timing drift). Not drift.
            continue;
        }

        if !head_regions.contains(region) {
            added_regions.push(region.clone());
        } else if !working_regions.contains(region) {
            deleted_regions.push(region.clone());
        }
        regions.push(summary);
    }

    let severity = if regions.is_empty() {
        DriftSeverity::Clean
    } else {
        DriftSeverity::Dirty
    };

    DriftReport {
        project_id: project_id.clone(),
        head_variation_id: head_variation_id.clone(),
        severity,
        regions,
        added_regions,
        deleted_regions,
    }
}

/// Up to `cap` note-level changes, newest-relevant first (additions sit at
/// the tail of the matcher output, so the list is walked backwards).
fn sample_changes(matches: &[EventMatch<MidiNote>], cap: usize) -> Vec<NoteDriftSample> {
    matches
        .iter()
        .rev()
        .filter(|m| m.is_change())
        .take(cap)
        .map(|m| NoteDriftSample {
            change: m.class,
            before: m.base.clone(),
            after: m.proposed.clone(),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn pid() -> ProjectId {
        ProjectId::new("proj").unwrap()
    }

    fn vid() -> VariationId {
        VariationId::new("head").unwrap()
    }

    fn region(s: &str) -> RegionId {
        RegionId::new(s).unwrap()
    }

    fn note(pitch: u8, beat: f64) -> MidiNote {
        MidiNote::new(pitch, beat, 1.0, 100)
    }

    fn config() -> EngineConfig {
        EngineConfig::default()
    }

    fn drift(head: &Snapshot, working: &Snapshot) -> DriftReport {
        compute_drift(&pid(), &vid(), head, working, &config())
    }

    #[test]
    fn identical_snapshots_are_clean() {
        let mut head = Snapshot::new();
        head.notes.insert(region("r1"), vec![note(60, 0.0)]);
        let report = drift(&head, &head.clone());
        assert_eq!(report.severity, DriftSeverity::Clean);
        assert!(report.regions.is_empty());
        assert_eq!(report.total_changes(), 0);
    }

    #[test]
    fn added_note_is_dirty() {
        // HEAD: one note. Working: the same note plus one more.
        let mut head = Snapshot::new();
        head.notes.insert(region("r1"), vec![note(60, 0.0)]);
        let mut working = Snapshot::new();
        working
            .notes
            .insert(region("r1"), vec![note(60, 0.0), note(72, 2.0)]);

        let report = drift(&head, &working);
        assert_eq!(report.severity, DriftSeverity::Dirty);
        assert_eq!(report.regions.len(), 1);
        assert_eq!(report.regions[0].notes.added, 1);
        assert_eq!(report.regions[0].notes.removed, 0);
        assert_eq!(report.total_changes(), 1);
    }

    #[test]
    fn region_only_in_working_is_added_region() {
        let head = Snapshot::new();
        let mut working = Snapshot::new();
        working
            .notes
            .insert(region("r9"), vec![note(60, 0.0), note(64, 1.0)]);

        let report = drift(&head, &working);
        assert_eq!(report.added_regions, vec![region("r9")]);
        assert!(report.deleted_regions.is_empty());
        assert_eq!(report.regions[0].notes.added, 2);
    }

    #[test]
    fn region_only_in_head_is_deleted_region() {
        let mut head = Snapshot::new();
        head.notes.insert(region("r1"), vec![note(60, 0.0)]);
        let working = Snapshot::new();

        let report = drift(&head, &working);
        assert_eq!(report.deleted_regions, vec![region("r1")]);
        assert_eq!(report.regions[0].notes.removed, 1);
    }

    #[test]
    fn controller_drift_counts_per_layer() {
        use crate::model::{CcEvent, PitchBendEvent};

        let mut head = Snapshot::new();
        head.cc
            .insert(region("r1"), vec![CcEvent::new(1, 0.0, 64)]);
        head.pitch_bends
            .insert(region("r1"), vec![PitchBendEvent::new(0.0, 0)]);

        let mut working = Snapshot::new();
        working
            .cc
            .insert(region("r1"), vec![CcEvent::new(1, 0.0, 90)]);
        // Pitch bend removed entirely.

        let report = drift(&head, &working);
        let summary = &report.regions[0];
        assert_eq!(summary.cc.modified, 1);
        assert_eq!(summary.pitch_bend.removed, 1);
        assert_eq!(summary.aftertouch.total(), 0);
    }

    #[test]
    fn samples_are_capped() {
        let mut head = Snapshot::new();
        head.notes.insert(region("r1"), Vec::new());
        let mut working = Snapshot::new();
        working.notes.insert(
            region("r1"),
            (0..10).map(|i| note(60 + i, f64::from(i))).collect(),
        );

        let report = drift(&head, &working);
        assert_eq!(report.regions[0].notes.added, 10);
        assert_eq!(report.regions[0].samples.len(), 5);
    }

    #[test]
    fn samples_are_newest_first() {
        let mut head = Snapshot::new();
        head.notes.insert(region("r1"), vec![note(60, 0.0)]);
        let mut working = Snapshot::new();
        working
            .notes
            .insert(region("r1"), vec![note(60, 0.0), note(72, 2.0)]);

        let report = drift(&head, &working);
        let samples = &report.regions[0].samples;
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].change, MatchClass::Added);
        assert_eq!(samples[0].after.as_ref().unwrap().pitch, 72);
    }

    #[test]
    fn fingerprints_are_recorded_per_dirty_region() {
        let mut head = Snapshot::new();
        head.notes.insert(region("r1"), vec![note(60, 0.0)]);
        let mut working = Snapshot::new();
        working.notes.insert(region("r1"), vec![note(61, 0.0)]);

        let report = drift(&head, &working);
        let summary = &report.regions[0];
        assert_eq!(summary.head_fingerprint.len(), 64);
        assert_eq!(summary.working_fingerprint.len(), 64);
        assert_ne!(summary.head_fingerprint, summary.working_fingerprint);
        assert_eq!(summary.head_fingerprint, head.region_fingerprint(&region("r1")));
    }

    #[test]
    fn conflict_payload_strips_samples() {
        let mut head = Snapshot::new();
        head.notes.insert(region("r1"), Vec::new());
        let mut working = Snapshot::new();
        working
            .notes
            .insert(region("r1"), vec![note(60, 0.0), note(61, 1.0)]);

        let report = drift(&head, &working);
        assert!(!report.regions[0].samples.is_empty());

        let payload = report.to_conflict_payload();
        assert_eq!(payload.severity, DriftSeverity::Dirty);
        assert_eq!(payload.total_changes, 2);
        assert_eq!(payload.regions.len(), 1);
        let json = serde_json::to_string(&payload).unwrap();
        assert!(!json.contains("samples"));
        assert!(json.contains("head_fingerprint"));
    }

    #[test]
    fn drift_is_deterministic() {
        let mut head = Snapshot::new();
        head.notes
            .insert(region("r2"), vec![note(60, 0.0), note(64, 1.0)]);
        head.notes.insert(region("r1"), vec![note(50, 0.0)]);
        let mut working = Snapshot::new();
        working.notes.insert(region("r2"), vec![note(60, 0.0)]);
        working
            .notes
            .insert(region("r1"), vec![note(50, 0.0), note(55, 2.0)]);

        let a = drift(&head, &working);
        let b = drift(&head, &working);
        assert_eq!(a, b);
        // Sorted region order.
        assert_eq!(a.regions[0].region_id, region("r1"));
        assert_eq!(a.regions[1].region_id, region("r2"));
    }
}
