//! History controller — orchestration of checkout and merge.
//!
//! [`HistoryService`] wires the pure components (replay, drift, planning,
//! merge) to the two injected adapters. It owns the user-facing state
//! machines:
//!
//! - **checkout**: read HEAD → reconstruct target → drift-safety gate
//!   (unless forced) → plan → execute → move HEAD only on full success.
//! - **merge**: capture working state → run the merge engine → conflict
//!   gate (unless forced; forcing resolves left-wins) → execute the plan →
//!   persist a two-parent merge commit and move HEAD only on full success.
//!
//! No hidden globals: repository and working-store handles are call
//! parameters.

use std::collections::BTreeSet;

use crate::checkout::execute::execute;
use crate::checkout::plan::build_checkout_plan;
use crate::config::EngineConfig;
use crate::drift::{DriftSeverity, compute_drift};
use crate::error::HistoryError;
use crate::merge::{MergePolicy, MergeResult, merge_variations};
use crate::model::variation::{ControllerChange, EventChange, Phrase, Variation, VariationStatus};
use crate::model::{ProjectId, RegionId, Snapshot, TrackId, VariationId, now_ms};
use crate::replay::reconstruct;
use crate::store::{VariationRepository, WorkingStore};

// ---------------------------------------------------------------------------
// Summaries
// ---------------------------------------------------------------------------

/// Successful checkout report.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct CheckoutSummary {
    /// The project checked out.
    pub project_id: ProjectId,
    /// The variation now at HEAD.
    pub target_variation_id: VariationId,
    /// Deterministic hash of the executed plan.
    pub plan_hash: String,
    /// Operations applied.
    pub executed: usize,
    /// Regions that were reset rather than patched.
    pub regions_reset: BTreeSet<RegionId>,
    /// `true` when the working session already matched the target.
    pub noop: bool,
}

/// Successful merge report.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct MergeSummary {
    /// The project merged.
    pub project_id: ProjectId,
    /// The newly created merge commit, now at HEAD.
    pub merge_variation_id: VariationId,
    /// The common ancestor the merge was computed against.
    pub base_variation_id: VariationId,
    /// First parent ("ours").
    pub left: VariationId,
    /// Second parent ("theirs").
    pub right: VariationId,
    /// Deterministic hash of the executed plan.
    pub plan_hash: String,
    /// Operations applied.
    pub executed: usize,
    /// `true` when conflicts were resolved left-wins under force.
    pub forced: bool,
}

// ---------------------------------------------------------------------------
// HistoryService
// ---------------------------------------------------------------------------

/// Orchestrator for checkout and merge.
#[derive(Clone, Debug, Default)]
pub struct HistoryService {
    config: EngineConfig,
}

impl HistoryService {
    /// Create a service with the given engine configuration.
    #[must_use]
    pub const fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// The engine configuration in use.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // checkout
    // -----------------------------------------------------------------------

    /// Transform the working session to match `target` and move HEAD.
    ///
    /// Unless `force` is set, a dirty working tree (drift against the
    /// reconstructed HEAD) blocks the checkout.
    ///
    /// # Errors
    /// [`HistoryError::VariationNotFound`] when `target` cannot be
    /// reconstructed; [`HistoryError::CheckoutBlocked`] on drift without
    /// `force`; [`HistoryError::ExecutionFailed`] when any plan operation
    /// failed (the store is rolled back and HEAD unmoved); adapter errors
    /// as [`HistoryError::Store`].
    pub fn checkout(
        &self,
        repo: &mut dyn VariationRepository,
        working: &mut dyn WorkingStore,
        project: &ProjectId,
        target: &VariationId,
        force: bool,
    ) -> Result<CheckoutSummary, HistoryError> {
        let tolerance = self.config.matching.note_tolerance_beats;

        let head = repo.get_head(project)?;
        let target_snapshot = reconstruct(repo, target, tolerance)?
            .ok_or_else(|| HistoryError::VariationNotFound { id: target.clone() })?;

        let working_snapshot = working.capture_snapshot()?;

        if !force && let Some(head_ptr) = &head {
            // A HEAD that cannot be reconstructed leaves nothing to compare
            // against, so the gate only runs when replay succeeds.
            if let Some(head_snapshot) = reconstruct(repo, &head_ptr.variation_id, tolerance)? {
                let report = compute_drift(
                    project,
                    &head_ptr.variation_id,
                    &head_snapshot,
                    &working_snapshot,
                    &self.config,
                );
                if report.severity == DriftSeverity::Dirty {
                    return Err(HistoryError::CheckoutBlocked {
                        severity: report.severity,
                        total_changes: report.total_changes(),
                    });
                }
            }
        }

        let plan =
            build_checkout_plan(project, target, &target_snapshot, &working_snapshot, &self.config);
        let plan_hash = plan.plan_hash();
        let result = execute(&plan, working)?;
        if !result.succeeded() {
            return Err(HistoryError::ExecutionFailed {
                executed: result.executed,
                failed: result.failed,
                events: result.events,
            });
        }

        if head.is_some() {
            repo.move_head(project, target)?;
        } else {
            repo.set_head(project, target, None)?;
        }
        tracing::info!(%project, %target, executed = result.executed, "checkout complete");

        Ok(CheckoutSummary {
            project_id: project.clone(),
            target_variation_id: target.clone(),
            plan_hash,
            executed: result.executed,
            regions_reset: plan.regions_reset,
            noop: result.noop,
        })
    }

    // -----------------------------------------------------------------------
    // merge
    // -----------------------------------------------------------------------

    /// Three-way merge `left` and `right`, apply the result to the working
    /// session, persist a two-parent merge commit, and move HEAD to it.
    ///
    /// With `force`, event-level conflicts are resolved by keeping the left
    /// side; whole-merge failures (no common ancestor, unreconstructable
    /// side) cannot be forced.
    ///
    /// # Errors
    /// [`HistoryError::MergeConflicted`] on conflicts without `force`;
    /// [`HistoryError::ExecutionFailed`] when any plan operation failed
    /// (no commit is created); adapter errors as [`HistoryError::Store`].
    pub fn merge(
        &self,
        repo: &mut dyn VariationRepository,
        working: &mut dyn WorkingStore,
        project: &ProjectId,
        left: &VariationId,
        right: &VariationId,
        force: bool,
    ) -> Result<MergeSummary, HistoryError> {
        let working_snapshot = working.capture_snapshot()?;
        let merged_id = VariationId::random();

        let strict = merge_variations(
            repo,
            project,
            left,
            right,
            &working_snapshot,
            &merged_id,
            &self.config,
            MergePolicy::Strict,
        )?;

        let (snapshot, plan, base, forced) = match strict {
            MergeResult::Merged { snapshot, plan, base } => (snapshot, plan, base, false),
            MergeResult::Conflicted { conflicts } if !force => {
                return Err(HistoryError::MergeConflicted { conflicts });
            }
            MergeResult::Conflicted { .. } => {
                // Forced: resolve left-wins. Whole-merge failures conflict
                // again here and stay fatal.
                let forced_result = merge_variations(
                    repo,
                    project,
                    left,
                    right,
                    &working_snapshot,
                    &merged_id,
                    &self.config,
                    MergePolicy::PreferLeft,
                )?;
                match forced_result {
                    MergeResult::Merged { snapshot, plan, base } => (snapshot, plan, base, true),
                    MergeResult::Conflicted { conflicts } => {
                        return Err(HistoryError::MergeConflicted { conflicts });
                    }
                }
            }
        };

        let plan_hash = plan.plan_hash();
        let result = execute(&plan, working)?;
        if !result.succeeded() {
            return Err(HistoryError::ExecutionFailed {
                executed: result.executed,
                failed: result.failed,
                events: result.events,
            });
        }

        // The commit records the delta from its first parent, so replaying
        // [..left lineage, merge] reproduces the merged state exactly.
        let left_snapshot = reconstruct(repo, left, self.config.matching.note_tolerance_beats)?
            .unwrap_or_default();
        let commit = merge_commit(
            &merged_id,
            left,
            right,
            &left_snapshot,
            &snapshot,
            self.config.matching.note_tolerance_beats,
        );
        repo.save_variation(project, commit)?;
        if repo.get_head(project)?.is_some() {
            repo.move_head(project, &merged_id)?;
        } else {
            repo.set_head(project, &merged_id, None)?;
        }
        tracing::info!(%project, %left, %right, merge = %merged_id, forced, "merge complete");

        Ok(MergeSummary {
            project_id: project.clone(),
            merge_variation_id: merged_id,
            base_variation_id: base,
            left: left.clone(),
            right: right.clone(),
            plan_hash,
            executed: result.executed,
            forced,
        })
    }
}

// ---------------------------------------------------------------------------
// Merge-commit synthesis
// ---------------------------------------------------------------------------

/// Build the two-parent merge commit for a merged snapshot.
///
/// Phrases record the delta from the first parent (`left_snapshot`) to the
/// merged state, so replaying the first-parent lineage plus this commit
/// reproduces the merged snapshot exactly. `beat_range` spans the merged
/// content — `(0.0, 0.0)` only when the merged snapshot is empty.
fn merge_commit(
    id: &VariationId,
    left: &VariationId,
    right: &VariationId,
    left_snapshot: &Snapshot,
    merged: &Snapshot,
    tolerance: f64,
) -> Variation {
    use crate::matcher::match_events;

    let mut phrases: Vec<Phrase> = Vec::new();
    let mut affected_regions: BTreeSet<RegionId> = BTreeSet::new();
    let mut affected_tracks: BTreeSet<TrackId> = BTreeSet::new();

    let mut regions: Vec<RegionId> = left_snapshot
        .regions()
        .union(&merged.regions())
        .cloned()
        .collect();
    regions.sort();

    for region in regions {
        let note_changes: Vec<EventChange<crate::model::MidiNote>> = match_events(
            left_snapshot.region_notes(&region),
            merged.region_notes(&region),
            tolerance,
        )
        .into_iter()
        .filter_map(to_change)
        .collect();

        let mut controller_changes: Vec<ControllerChange> = Vec::new();
        controller_changes.extend(
            match_events(
                left_snapshot.region_cc(&region),
                merged.region_cc(&region),
                tolerance,
            )
            .into_iter()
            .filter_map(to_change)
            .map(ControllerChange::Cc),
        );
        controller_changes.extend(
            match_events(
                left_snapshot.region_pitch_bends(&region),
                merged.region_pitch_bends(&region),
                tolerance,
            )
            .into_iter()
            .filter_map(to_change)
            .map(ControllerChange::PitchBend),
        );
        controller_changes.extend(
            match_events(
                left_snapshot.region_aftertouch(&region),
                merged.region_aftertouch(&region),
                tolerance,
            )
            .into_iter()
            .filter_map(to_change)
            .map(ControllerChange::Aftertouch),
        );

        if note_changes.is_empty() && controller_changes.is_empty() {
            continue;
        }

        let track_id = merged
            .region_tracks
            .get(&region)
            .or_else(|| left_snapshot.region_tracks.get(&region))
            .cloned()
            .unwrap_or_else(|| {
                // Region ids satisfy track-id validation, so this cannot fail.
                TrackId::new(region.as_str())
                    .unwrap_or_else(|_| TrackId::new("unknown").expect("valid literal"))
            });
        affected_regions.insert(region.clone());
        affected_tracks.insert(track_id.clone());

        let (start_beat, end_beat) =
            note_extent(merged.region_notes(&region)).unwrap_or((0.0, 0.0));
        phrases.push(Phrase {
            label: "merge".to_owned(),
            region_id: region.clone(),
            track_id,
            region_start_beat: merged
                .region_starts
                .get(&region)
                .or_else(|| left_snapshot.region_starts.get(&region))
                .copied()
                .unwrap_or(0.0),
            start_beat,
            end_beat,
            note_changes,
            controller_changes,
        });
    }

    let beat_range = merged
        .notes
        .values()
        .filter_map(|notes| note_extent(notes))
        .reduce(|(lo, hi), (s, e)| (lo.min(s), hi.max(e)))
        .unwrap_or((0.0, 0.0));

    Variation {
        variation_id: id.clone(),
        intent: format!("merge {} + {}", left.short(), right.short()),
        explanation: None,
        affected_tracks,
        affected_regions,
        beat_range,
        phrases,
        parent_variation_id: Some(left.clone()),
        parent2_variation_id: Some(right.clone()),
        status: VariationStatus::Committed,
        created_at_ms: now_ms(),
    }
}

/// Matcher output → recorded change; unchanged pairs drop out.
fn to_change<T>(m: crate::matcher::EventMatch<T>) -> Option<EventChange<T>> {
    use crate::matcher::MatchClass;
    match (m.class, m.base, m.proposed) {
        (MatchClass::Added, _, Some(after)) => Some(EventChange::Added { after }),
        (MatchClass::Removed, Some(before), _) => Some(EventChange::Removed { before }),
        (MatchClass::Modified, Some(before), Some(after)) => {
            Some(EventChange::Modified { before, after })
        }
        _ => None,
    }
}

/// `(min start, max end)` over a note list, `None` when empty.
fn note_extent(notes: &[crate::model::MidiNote]) -> Option<(f64, f64)> {
    let mut extent: Option<(f64, f64)> = None;
    for n in notes {
        let (lo, hi) = extent.unwrap_or((n.start_beat, n.end_beat()));
        extent = Some((lo.min(n.start_beat), hi.max(n.end_beat())));
    }
    extent
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{MidiNote, NoteChange};

    fn region(s: &str) -> RegionId {
        RegionId::new(s).unwrap()
    }

    fn note(pitch: u8, beat: f64) -> MidiNote {
        MidiNote::new(pitch, beat, 1.0, 100)
    }

    fn vid(s: &str) -> VariationId {
        VariationId::new(s).unwrap()
    }

    #[test]
    fn merge_commit_records_delta_from_first_parent() {
        let mut left_snapshot = Snapshot::new();
        left_snapshot
            .notes
            .insert(region("r1"), vec![note(60, 1.0)]);
        left_snapshot
            .region_tracks
            .insert(region("r1"), TrackId::new("t1").unwrap());
        left_snapshot.region_starts.insert(region("r1"), 8.0);

        let mut merged = left_snapshot.clone();
        merged
            .notes
            .get_mut(&region("r1"))
            .unwrap()
            .push(note(64, 3.0));

        let commit = merge_commit(
            &vid("m"),
            &vid("left"),
            &vid("right"),
            &left_snapshot,
            &merged,
            0.05,
        );
        assert_eq!(commit.parent_variation_id, Some(vid("left")));
        assert_eq!(commit.parent2_variation_id, Some(vid("right")));
        assert!(commit.is_merge());
        assert_eq!(commit.phrases.len(), 1);
        // Only the new note is recorded; the inherited one drops out.
        assert_eq!(commit.phrases[0].note_changes.len(), 1);
        assert!(matches!(
            commit.phrases[0].note_changes[0],
            NoteChange::Added { .. }
        ));
        assert!(commit.affected_regions.contains(&region("r1")));
        assert_eq!(commit.status, VariationStatus::Committed);
    }

    #[test]
    fn merge_commit_beat_range_spans_merged_content() {
        let left_snapshot = Snapshot::new();
        let mut merged = Snapshot::new();
        merged
            .notes
            .insert(region("r1"), vec![note(60, 1.0), note(64, 3.5)]);

        let commit = merge_commit(&vid("m"), &vid("l"), &vid("r"), &left_snapshot, &merged, 0.05);
        assert!((commit.beat_range.0 - 1.0).abs() < f64::EPSILON);
        assert!((commit.beat_range.1 - 4.5).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_merge_commit_beat_range_is_zero() {
        let empty = Snapshot::new();
        let commit = merge_commit(&vid("m"), &vid("l"), &vid("r"), &empty, &empty.clone(), 0.05);
        assert!((commit.beat_range.0 - 0.0).abs() < f64::EPSILON);
        assert!((commit.beat_range.1 - 0.0).abs() < f64::EPSILON);
        assert!(commit.phrases.is_empty());
    }

    #[test]
    fn merge_commit_records_controller_delta() {
        use crate::model::CcEvent;
        let mut left_snapshot = Snapshot::new();
        left_snapshot
            .cc
            .insert(region("r1"), vec![CcEvent::new(1, 0.0, 64)]);
        let mut merged = Snapshot::new();
        merged
            .cc
            .insert(region("r1"), vec![CcEvent::new(1, 0.0, 90)]);

        let commit = merge_commit(&vid("m"), &vid("l"), &vid("r"), &left_snapshot, &merged, 0.05);
        assert_eq!(commit.phrases.len(), 1);
        match &commit.phrases[0].controller_changes[0] {
            ControllerChange::Cc(EventChange::Modified { before, after }) => {
                assert_eq!(before.value, 64);
                assert_eq!(after.value, 90);
            }
            other => panic!("expected modified cc change, got {other:?}"),
        }
    }

    #[test]
    fn replaying_a_merge_commit_reproduces_the_merged_state() {
        use crate::store::VariationRepository as _;
        use crate::store::memory::MemoryRepository;

        let project = ProjectId::new("proj").unwrap();
        let mut repo = MemoryRepository::new();

        let base = Variation {
            variation_id: vid("base"),
            intent: "seed".to_owned(),
            explanation: None,
            affected_tracks: BTreeSet::new(),
            affected_regions: BTreeSet::new(),
            beat_range: (0.0, 4.0),
            phrases: vec![Phrase {
                label: "seed".to_owned(),
                region_id: region("r1"),
                track_id: TrackId::new("t1").unwrap(),
                region_start_beat: 0.0,
                start_beat: 0.0,
                end_beat: 4.0,
                note_changes: vec![NoteChange::Added { after: note(60, 0.0) }],
                controller_changes: Vec::new(),
            }],
            parent_variation_id: None,
            parent2_variation_id: None,
            status: VariationStatus::Committed,
            created_at_ms: 1,
        };
        repo.save_variation(&project, base).unwrap();
        let left_snapshot = crate::replay::reconstruct(&repo, &vid("base"), 0.05)
            .unwrap()
            .unwrap();

        let mut merged = left_snapshot.clone();
        merged
            .notes
            .get_mut(&region("r1"))
            .unwrap()
            .push(note(72, 2.0));

        let commit = merge_commit(
            &vid("m"),
            &vid("base"),
            &vid("base"),
            &left_snapshot,
            &merged,
            0.05,
        );
        repo.save_variation(&project, commit).unwrap();

        let replayed = crate::replay::reconstruct(&repo, &vid("m"), 0.05)
            .unwrap()
            .unwrap();
        assert_eq!(replayed.notes, merged.notes);
    }
}
