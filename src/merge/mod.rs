//! Three-way merge engine.
//!
//! Pipeline: find the common ancestor ([`base`]) → reconstruct base, left
//! ("ours"), and right ("theirs") snapshots → resolve per region and event
//! layer ([`resolve`]) → if conflict-free, plan the checkout that lands the
//! merged state in the working session.
//!
//! All-or-nothing: a conflict anywhere blocks the whole merge. The result
//! is either a merged snapshot plus its checkout plan or a non-empty
//! conflict list — never both.

pub mod base;
pub mod resolve;

pub use base::find_merge_base;
pub use resolve::{MergeConflict, MergeEventType, MergePolicy};

use crate::checkout::plan::{CheckoutPlan, build_checkout_plan};
use crate::config::EngineConfig;
use crate::error::HistoryError;
use crate::model::{ProjectId, RegionId, Snapshot, VariationId};
use crate::replay::reconstruct;
use crate::store::VariationRepository;

// ---------------------------------------------------------------------------
// MergeResult
// ---------------------------------------------------------------------------

/// Outcome of a three-way merge.
#[derive(Clone, Debug)]
pub enum MergeResult {
    /// Conflict-free merge.
    Merged {
        /// The merged per-region state.
        snapshot: Snapshot,
        /// Plan that transforms the working session into `snapshot`.
        plan: CheckoutPlan,
        /// The common ancestor the merge was computed against.
        base: VariationId,
    },
    /// One or more conflicts; nothing was merged.
    Conflicted {
        /// Every conflict found (non-empty).
        conflicts: Vec<MergeConflict>,
    },
}

impl MergeResult {
    /// `true` when the merge produced a snapshot.
    #[must_use]
    pub const fn is_merged(&self) -> bool {
        matches!(self, Self::Merged { .. })
    }
}

// ---------------------------------------------------------------------------
// merge_variations
// ---------------------------------------------------------------------------

/// Run the full merge pipeline for `left` and `right`.
///
/// `working` is the live working snapshot the resulting checkout plan is
/// computed against; `merged_id` is the id the resulting plan targets (the
/// prospective merge commit). `policy` is [`MergePolicy::Strict`] for
/// normal merges; [`MergePolicy::PreferLeft`] is the orchestration layer's
/// forced-resolution mode and never reports event-level conflicts.
///
/// A missing common ancestor or an unreconstructable side fails with a
/// single wildcard conflict under either policy.
///
/// # Errors
/// Propagates adapter failures.
#[allow(clippy::too_many_arguments)]
pub fn merge_variations(
    repo: &dyn VariationRepository,
    project: &ProjectId,
    left: &VariationId,
    right: &VariationId,
    working: &Snapshot,
    merged_id: &VariationId,
    config: &EngineConfig,
    policy: MergePolicy,
) -> Result<MergeResult, HistoryError> {
    let Some(base_id) = find_merge_base(repo, left, right)? else {
        return Ok(MergeResult::Conflicted {
            conflicts: vec![wildcard_conflict(format!(
                "no common ancestor between {left} and {right}"
            ))],
        });
    };

    let tolerance = config.matching.note_tolerance_beats;
    let Some(base_snapshot) = reconstruct(repo, &base_id, tolerance)? else {
        return Ok(MergeResult::Conflicted {
            conflicts: vec![wildcard_conflict(format!(
                "cannot reconstruct merge base {base_id}"
            ))],
        });
    };
    let Some(left_snapshot) = reconstruct(repo, left, tolerance)? else {
        return Ok(MergeResult::Conflicted {
            conflicts: vec![wildcard_conflict(format!("cannot reconstruct {left}"))],
        });
    };
    let Some(right_snapshot) = reconstruct(repo, right, tolerance)? else {
        return Ok(MergeResult::Conflicted {
            conflicts: vec![wildcard_conflict(format!("cannot reconstruct {right}"))],
        });
    };

    let (merged, conflicts) = resolve_snapshots(
        &base_snapshot,
        &left_snapshot,
        &right_snapshot,
        tolerance,
        policy,
    );
    if !conflicts.is_empty() {
        tracing::debug!(count = conflicts.len(), %left, %right, "merge conflicts");
        return Ok(MergeResult::Conflicted { conflicts });
    }

    let plan = build_checkout_plan(project, merged_id, &merged, working, config);
    Ok(MergeResult::Merged {
        snapshot: merged,
        plan,
        base: base_id,
    })
}

fn wildcard_conflict(description: String) -> MergeConflict {
    MergeConflict {
        region_id: RegionId::wildcard(),
        event_type: MergeEventType::Note,
        description,
    }
}

// ---------------------------------------------------------------------------
// resolve_snapshots
// ---------------------------------------------------------------------------

/// Merge every region and event layer of three snapshots.
///
/// Region tables (track, start beat) take the left side's value first,
/// then the right's, then the base's.
#[must_use]
pub fn resolve_snapshots(
    base: &Snapshot,
    left: &Snapshot,
    right: &Snapshot,
    tolerance: f64,
    policy: MergePolicy,
) -> (Snapshot, Vec<MergeConflict>) {
    let mut merged = Snapshot::new();
    let mut conflicts: Vec<MergeConflict> = Vec::new();

    let mut regions: Vec<RegionId> = base
        .regions()
        .union(&left.regions())
        .cloned()
        .collect::<std::collections::BTreeSet<_>>()
        .union(&right.regions())
        .cloned()
        .collect();
    regions.sort();

    for region in regions {
        let notes = resolve::merge_events(
            base.region_notes(&region),
            left.region_notes(&region),
            right.region_notes(&region),
            tolerance,
            policy,
            &region,
            MergeEventType::Note,
            &mut conflicts,
            std::string::ToString::to_string,
        );
        if !notes.is_empty() {
            merged.notes.insert(region.clone(), notes);
        }

        let cc = resolve::merge_events(
            base.region_cc(&region),
            left.region_cc(&region),
            right.region_cc(&region),
            tolerance,
            policy,
            &region,
            MergeEventType::Cc,
            &mut conflicts,
            |e| format!("cc {} at beat {}", e.cc, e.beat),
        );
        if !cc.is_empty() {
            merged.cc.insert(region.clone(), cc);
        }

        let pb = resolve::merge_events(
            base.region_pitch_bends(&region),
            left.region_pitch_bends(&region),
            right.region_pitch_bends(&region),
            tolerance,
            policy,
            &region,
            MergeEventType::PitchBend,
            &mut conflicts,
            |e| format!("pitch bend at beat {}", e.beat),
        );
        if !pb.is_empty() {
            merged.pitch_bends.insert(region.clone(), pb);
        }

        let at = resolve::merge_events(
            base.region_aftertouch(&region),
            left.region_aftertouch(&region),
            right.region_aftertouch(&region),
            tolerance,
            policy,
            &region,
            MergeEventType::Aftertouch,
            &mut conflicts,
            |e| format!("aftertouch at beat {}", e.beat),
        );
        if !at.is_empty() {
            merged.aftertouch.insert(region.clone(), at);
        }

        let track = left
            .region_tracks
            .get(&region)
            .or_else(|| right.region_tracks.get(&region))
            .or_else(|| base.region_tracks.get(&region));
        if let Some(track) = track {
            merged.region_tracks.insert(region.clone(), track.clone());
        }
        let start = left
            .region_starts
            .get(&region)
            .or_else(|| right.region_starts.get(&region))
            .or_else(|| base.region_starts.get(&region));
        if let Some(start) = start {
            merged.region_starts.insert(region.clone(), *start);
        }
    }

    (merged, conflicts)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{MidiNote, NoteChange, Phrase, TrackId, Variation, VariationStatus};
    use crate::store::VariationRepository as _;
    use crate::store::memory::MemoryRepository;
    use std::collections::BTreeSet;

    fn pid() -> ProjectId {
        ProjectId::new("proj").unwrap()
    }

    fn vid(s: &str) -> VariationId {
        VariationId::new(s).unwrap()
    }

    fn region(s: &str) -> RegionId {
        RegionId::new(s).unwrap()
    }

    fn note(pitch: u8, beat: f64) -> MidiNote {
        MidiNote::new(pitch, beat, 1.0, 100)
    }

    fn phrase(region_id: &str, note_changes: Vec<NoteChange>) -> Phrase {
        Phrase {
            label: "phrase".to_owned(),
            region_id: region(region_id),
            track_id: TrackId::new("t1").unwrap(),
            region_start_beat: 0.0,
            start_beat: 0.0,
            end_beat: 4.0,
            note_changes,
            controller_changes: Vec::new(),
        }
    }

    fn variation(id: &str, parent: Option<&str>, ts: u64, phrases: Vec<Phrase>) -> Variation {
        Variation {
            variation_id: vid(id),
            intent: id.to_owned(),
            explanation: None,
            affected_tracks: BTreeSet::new(),
            affected_regions: phrases.iter().map(|p| p.region_id.clone()).collect(),
            beat_range: (0.0, 4.0),
            phrases,
            parent_variation_id: parent.map(vid),
            parent2_variation_id: None,
            status: VariationStatus::Committed,
            created_at_ms: ts,
        }
    }

    /// base commit adds (60, 0.0); left modifies its velocity; right adds
    /// a new note at beat 2.
    fn diamond_repo() -> MemoryRepository {
        let mut repo = MemoryRepository::new();
        repo.save_variation(
            &pid(),
            variation(
                "base",
                None,
                1,
                vec![phrase("r1", vec![NoteChange::Added { after: note(60, 0.0) }])],
            ),
        )
        .unwrap();
        repo.save_variation(
            &pid(),
            variation(
                "left",
                Some("base"),
                2,
                vec![phrase(
                    "r1",
                    vec![NoteChange::Modified {
                        before: note(60, 0.0),
                        after: MidiNote::new(60, 0.0, 1.0, 70),
                    }],
                )],
            ),
        )
        .unwrap();
        repo.save_variation(
            &pid(),
            variation(
                "right",
                Some("base"),
                3,
                vec![phrase("r1", vec![NoteChange::Added { after: note(72, 2.0) }])],
            ),
        )
        .unwrap();
        repo
    }

    fn run(repo: &MemoryRepository, left: &str, right: &str) -> MergeResult {
        merge_variations(
            repo,
            &pid(),
            &vid(left),
            &vid(right),
            &Snapshot::new(),
            &vid("merged"),
            &EngineConfig::default(),
            MergePolicy::Strict,
        )
        .unwrap()
    }

    #[test]
    fn clean_merge_produces_snapshot_and_plan() {
        let repo = diamond_repo();
        match run(&repo, "left", "right") {
            MergeResult::Merged { snapshot, plan, base } => {
                assert_eq!(base, vid("base"));
                let notes = snapshot.region_notes(&region("r1"));
                assert_eq!(notes.len(), 2);
                assert_eq!(notes[0].velocity, 70);
                assert_eq!(notes[1].pitch, 72);
                assert!(!plan.is_noop);
                assert_eq!(plan.target_variation_id, vid("merged"));
            }
            MergeResult::Conflicted { conflicts } => {
                panic!("expected clean merge, got {conflicts:?}")
            }
        }
    }

    #[test]
    fn both_sides_modifying_same_note_conflicts() {
        let mut repo = diamond_repo();
        // A second right-side commit that also touches the base note.
        repo.save_variation(
            &pid(),
            variation(
                "right2",
                Some("base"),
                4,
                vec![phrase(
                    "r1",
                    vec![NoteChange::Modified {
                        before: note(60, 0.0),
                        after: MidiNote::new(60, 0.0, 2.0, 100),
                    }],
                )],
            ),
        )
        .unwrap();

        match run(&repo, "left", "right2") {
            MergeResult::Conflicted { conflicts } => {
                assert_eq!(conflicts.len(), 1);
                assert_eq!(conflicts[0].region_id, region("r1"));
                assert_eq!(conflicts[0].event_type, MergeEventType::Note);
            }
            MergeResult::Merged { .. } => panic!("expected conflict"),
        }
    }

    #[test]
    fn no_common_ancestor_is_wildcard_conflict() {
        let mut repo = MemoryRepository::new();
        repo.save_variation(&pid(), variation("a", None, 1, Vec::new()))
            .unwrap();
        repo.save_variation(&pid(), variation("b", None, 2, Vec::new()))
            .unwrap();

        match run(&repo, "a", "b") {
            MergeResult::Conflicted { conflicts } => {
                assert_eq!(conflicts.len(), 1);
                assert_eq!(conflicts[0].region_id, RegionId::wildcard());
                assert!(conflicts[0].description.contains("no common ancestor"));
            }
            MergeResult::Merged { .. } => panic!("expected wildcard conflict"),
        }
    }

    #[test]
    fn missing_side_is_wildcard_conflict() {
        let repo = diamond_repo();
        match run(&repo, "left", "ghost") {
            MergeResult::Conflicted { conflicts } => {
                assert_eq!(conflicts[0].region_id, RegionId::wildcard());
            }
            MergeResult::Merged { .. } => panic!("expected conflict"),
        }
    }

    #[test]
    fn merge_with_ancestor_yields_descendant_state() {
        let repo = diamond_repo();
        match run(&repo, "left", "base") {
            MergeResult::Merged { snapshot, .. } => {
                let notes = snapshot.region_notes(&region("r1"));
                assert_eq!(notes.len(), 1);
                assert_eq!(notes[0].velocity, 70);
            }
            MergeResult::Conflicted { conflicts } => {
                panic!("ancestor merge must be clean, got {conflicts:?}")
            }
        }
    }

    #[test]
    fn region_tables_union_across_sides() {
        let repo = diamond_repo();
        match run(&repo, "left", "right") {
            MergeResult::Merged { snapshot, .. } => {
                assert_eq!(
                    snapshot.region_tracks.get(&region("r1")).unwrap().as_str(),
                    "t1"
                );
                assert!(snapshot.region_starts.contains_key(&region("r1")));
            }
            MergeResult::Conflicted { .. } => panic!("expected clean merge"),
        }
    }

    #[test]
    fn prefer_left_suppresses_event_conflicts() {
        let mut repo = diamond_repo();
        repo.save_variation(
            &pid(),
            variation(
                "right2",
                Some("base"),
                4,
                vec![phrase(
                    "r1",
                    vec![NoteChange::Modified {
                        before: note(60, 0.0),
                        after: MidiNote::new(60, 0.0, 2.0, 100),
                    }],
                )],
            ),
        )
        .unwrap();

        let result = merge_variations(
            &repo,
            &pid(),
            &vid("left"),
            &vid("right2"),
            &Snapshot::new(),
            &vid("merged"),
            &EngineConfig::default(),
            MergePolicy::PreferLeft,
        )
        .unwrap();

        match result {
            MergeResult::Merged { snapshot, .. } => {
                let notes = snapshot.region_notes(&region("r1"));
                assert_eq!(notes[0].velocity, 70, "left's modification wins");
            }
            MergeResult::Conflicted { .. } => panic!("prefer-left must not conflict"),
        }
    }
}
