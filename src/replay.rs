//! Snapshot reconstruction — replay a variation lineage into state.
//!
//! [`reconstruct`] walks a variation's first-parent chain root-first and
//! replays every phrase's note and controller changes into per-region
//! accumulators: `added` appends, `removed` deletes by identity,
//! `modified` replaces in place by identity (pitch + timing for notes,
//! controller number + timing for CC, timing for pitch bend, timing +
//! poly pitch for aftertouch).
//!
//! Returns `Ok(None)` when the variation does not exist or its lineage
//! cannot be resolved — callers must treat that as "nothing to compare,"
//! not as an empty-but-valid snapshot.

use crate::error::HistoryError;
use crate::model::variation::{ControllerChange, EventChange};
use crate::model::{ProjectId, Snapshot, VariationId, beats_close};
use crate::store::{StoreError, VariationRepository};

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Reconstruct the snapshot at `id` by replaying its lineage.
///
/// `tolerance` is the start-beat tolerance for identity-keyed removal and
/// replacement.
///
/// # Errors
/// Propagates adapter failures other than missing variations (those yield
/// `Ok(None)`).
pub fn reconstruct(
    repo: &dyn VariationRepository,
    id: &VariationId,
    tolerance: f64,
) -> Result<Option<Snapshot>, HistoryError> {
    if repo.load_variation(id)?.is_none() {
        return Ok(None);
    }
    let lineage = match repo.get_lineage(id) {
        Ok(lineage) => lineage,
        // A dangling ancestor link means the lineage cannot be resolved.
        Err(StoreError::NotFound { .. }) => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    if lineage.is_empty() {
        return Ok(None);
    }

    let mut snapshot = Snapshot::new();
    for variation in &lineage {
        for phrase in &variation.phrases {
            let region = &phrase.region_id;
            snapshot
                .region_tracks
                .insert(region.clone(), phrase.track_id.clone());
            snapshot
                .region_starts
                .insert(region.clone(), phrase.region_start_beat);

            let notes = snapshot.notes.entry(region.clone()).or_default();
            for change in &phrase.note_changes {
                apply_change(notes, change, |a, b| {
                    a.pitch == b.pitch && beats_close(a.start_beat, b.start_beat, tolerance)
                });
            }

            for change in &phrase.controller_changes {
                match change {
                    ControllerChange::Cc(c) => {
                        apply_change(snapshot.cc.entry(region.clone()).or_default(), c, |a, b| {
                            a.cc == b.cc && beats_close(a.beat, b.beat, tolerance)
                        });
                    }
                    ControllerChange::PitchBend(c) => {
                        apply_change(
                            snapshot.pitch_bends.entry(region.clone()).or_default(),
                            c,
                            |a, b| beats_close(a.beat, b.beat, tolerance),
                        );
                    }
                    ControllerChange::Aftertouch(c) => {
                        apply_change(
                            snapshot.aftertouch.entry(region.clone()).or_default(),
                            c,
                            |a, b| a.pitch == b.pitch && beats_close(a.beat, b.beat, tolerance),
                        );
                    }
                }
            }
        }
    }

    // A lineage that materializes an out-of-range note is a recording bug,
    // not a user condition; propagate rather than hand out a bad snapshot.
    for (region, notes) in &snapshot.notes {
        for note in notes {
            if let Err(reason) = note.validate() {
                return Err(HistoryError::InvalidChange {
                    detail: format!("replay of {id} produced in region {region}: {reason}"),
                });
            }
        }
    }

    Ok(Some(snapshot))
}

/// Resolve the project's HEAD and reconstruct its snapshot.
///
/// `Ok(None)` when the project has no HEAD yet, or HEAD points at an
/// unresolvable variation.
///
/// # Errors
/// Propagates adapter failures, as [`reconstruct`].
pub fn reconstruct_head(
    repo: &dyn VariationRepository,
    project: &ProjectId,
    tolerance: f64,
) -> Result<Option<Snapshot>, HistoryError> {
    match repo.get_head(project)? {
        Some(head) => reconstruct(repo, &head.variation_id, tolerance),
        None => Ok(None),
    }
}

// ---------------------------------------------------------------------------
// Accumulator
// ---------------------------------------------------------------------------

/// Apply one recorded change to an accumulator.
///
/// Removal of an event that is no longer present is a no-op (the lineage
/// already converged past it); a modification whose `before` is missing
/// still lands its `after` state.
fn apply_change<T: Clone>(
    events: &mut Vec<T>,
    change: &EventChange<T>,
    same_identity: impl Fn(&T, &T) -> bool,
) {
    match change {
        EventChange::Added { after } => events.push(after.clone()),
        EventChange::Removed { before } => {
            if let Some(pos) = events.iter().position(|e| same_identity(before, e)) {
                events.remove(pos);
            } else {
                tracing::debug!("replayed removal matched no event; skipping");
            }
        }
        EventChange::Modified { before, after } => {
            match events.iter().position(|e| same_identity(before, e)) {
                Some(pos) => events[pos] = after.clone(),
                None => events.push(after.clone()),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{
        CcEvent, MidiNote, NoteChange, Phrase, PitchBendEvent, RegionId, TrackId, Variation,
        VariationStatus,
    };
    use crate::store::memory::MemoryRepository;
    use std::collections::BTreeSet;

    const TOL: f64 = 0.05;

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
            intent: format!("intent {id}"),
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

    fn save(repo: &mut MemoryRepository, v: Variation) {
        crate::store::VariationRepository::save_variation(repo, &pid(), v).unwrap();
    }

    #[test]
    fn missing_variation_is_none() {
        let repo = MemoryRepository::new();
        assert!(reconstruct(&repo, &vid("ghost"), TOL).unwrap().is_none());
    }

    #[test]
    fn dangling_lineage_is_none() {
        let mut repo = MemoryRepository::new();
        save(&mut repo, variation("v1", Some("gone"), 1, Vec::new()));
        assert!(reconstruct(&repo, &vid("v1"), TOL).unwrap().is_none());
    }

    #[test]
    fn single_commit_adds_accumulate() {
        let mut repo = MemoryRepository::new();
        save(
            &mut repo,
            variation(
                "v1",
                None,
                1,
                vec![phrase(
                    "r1",
                    vec![
                        NoteChange::Added { after: note(60, 0.0) },
                        NoteChange::Added { after: note(64, 1.0) },
                    ],
                )],
            ),
        );
        let snap = reconstruct(&repo, &vid("v1"), TOL).unwrap().unwrap();
        assert_eq!(snap.region_notes(&region("r1")).len(), 2);
        assert_eq!(snap.region_tracks.get(&region("r1")).unwrap().as_str(), "t1");
    }

    #[test]
    fn child_removal_deletes_by_identity() {
        let mut repo = MemoryRepository::new();
        save(
            &mut repo,
            variation(
                "v1",
                None,
                1,
                vec![phrase(
                    "r1",
                    vec![
                        NoteChange::Added { after: note(60, 0.0) },
                        NoteChange::Added { after: note(64, 1.0) },
                    ],
                )],
            ),
        );
        save(
            &mut repo,
            variation(
                "v2",
                Some("v1"),
                2,
                vec![phrase(
                    "r1",
                    vec![NoteChange::Removed { before: note(64, 1.0) }],
                )],
            ),
        );
        let snap = reconstruct(&repo, &vid("v2"), TOL).unwrap().unwrap();
        let notes = snap.region_notes(&region("r1"));
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].pitch, 60);
    }

    #[test]
    fn child_modification_replaces_in_place() {
        let mut repo = MemoryRepository::new();
        save(
            &mut repo,
            variation(
                "v1",
                None,
                1,
                vec![phrase("r1", vec![NoteChange::Added { after: note(60, 0.0) }])],
            ),
        );
        save(
            &mut repo,
            variation(
                "v2",
                Some("v1"),
                2,
                vec![phrase(
                    "r1",
                    vec![NoteChange::Modified {
                        before: note(60, 0.0),
                        after: MidiNote::new(60, 0.0, 2.0, 90),
                    }],
                )],
            ),
        );
        let snap = reconstruct(&repo, &vid("v2"), TOL).unwrap().unwrap();
        let notes = snap.region_notes(&region("r1"));
        assert_eq!(notes.len(), 1);
        assert!((notes[0].duration_beats - 2.0).abs() < f64::EPSILON);
        assert_eq!(notes[0].velocity, 90);
    }

    #[test]
    fn ancestor_state_visible_at_descendant() {
        // Reconstructing an intermediate commit ignores later commits.
        let mut repo = MemoryRepository::new();
        save(
            &mut repo,
            variation(
                "v1",
                None,
                1,
                vec![phrase("r1", vec![NoteChange::Added { after: note(60, 0.0) }])],
            ),
        );
        save(
            &mut repo,
            variation(
                "v2",
                Some("v1"),
                2,
                vec![phrase("r1", vec![NoteChange::Added { after: note(72, 2.0) }])],
            ),
        );
        let at_v1 = reconstruct(&repo, &vid("v1"), TOL).unwrap().unwrap();
        assert_eq!(at_v1.region_notes(&region("r1")).len(), 1);
        let at_v2 = reconstruct(&repo, &vid("v2"), TOL).unwrap().unwrap();
        assert_eq!(at_v2.region_notes(&region("r1")).len(), 2);
    }

    #[test]
    fn controller_changes_replay_per_layer() {
        let mut repo = MemoryRepository::new();
        let mut p = phrase("r1", Vec::new());
        p.controller_changes = vec![
            ControllerChange::Cc(EventChange::Added {
                after: CcEvent::new(1, 0.0, 64),
            }),
            ControllerChange::Cc(EventChange::Added {
                after: CcEvent::new(1, 2.0, 80),
            }),
            ControllerChange::PitchBend(EventChange::Added {
                after: PitchBendEvent::new(0.5, -1200),
            }),
        ];
        save(&mut repo, variation("v1", None, 1, vec![p]));

        let mut p2 = phrase("r1", Vec::new());
        p2.controller_changes = vec![
            // Same controller, different beat: only the beat-matched event
            // is replaced.
            ControllerChange::Cc(EventChange::Modified {
                before: CcEvent::new(1, 2.0, 80),
                after: CcEvent::new(1, 2.0, 127),
            }),
            ControllerChange::PitchBend(EventChange::Removed {
                before: PitchBendEvent::new(0.5, -1200),
            }),
        ];
        save(&mut repo, variation("v2", Some("v1"), 2, vec![p2]));

        let snap = reconstruct(&repo, &vid("v2"), TOL).unwrap().unwrap();
        let cc = snap.region_cc(&region("r1"));
        assert_eq!(cc.len(), 2);
        assert_eq!(cc[0].value, 64);
        assert_eq!(cc[1].value, 127);
        assert!(snap.region_pitch_bends(&region("r1")).is_empty());
    }

    #[test]
    fn removal_of_absent_note_is_tolerated() {
        let mut repo = MemoryRepository::new();
        save(
            &mut repo,
            variation(
                "v1",
                None,
                1,
                vec![phrase(
                    "r1",
                    vec![NoteChange::Removed { before: note(99, 9.0) }],
                )],
            ),
        );
        let snap = reconstruct(&repo, &vid("v1"), TOL).unwrap().unwrap();
        assert!(snap.region_notes(&region("r1")).is_empty());
    }

    #[test]
    fn invalid_recorded_note_is_propagated() {
        let mut repo = MemoryRepository::new();
        save(
            &mut repo,
            variation(
                "v1",
                None,
                1,
                vec![phrase(
                    "r1",
                    vec![NoteChange::Added {
                        after: MidiNote::new(60, 0.0, 0.0, 100),
                    }],
                )],
            ),
        );
        let err = reconstruct(&repo, &vid("v1"), TOL).unwrap_err();
        assert!(matches!(err, HistoryError::InvalidChange { .. }));
    }

    #[test]
    fn reconstruct_head_resolves_pointer() {
        let mut repo = MemoryRepository::new();
        save(
            &mut repo,
            variation(
                "v1",
                None,
                1,
                vec![phrase("r1", vec![NoteChange::Added { after: note(60, 0.0) }])],
            ),
        );
        assert!(reconstruct_head(&repo, &pid(), TOL).unwrap().is_none());

        crate::store::VariationRepository::set_head(&mut repo, &pid(), &vid("v1"), None).unwrap();
        let snap = reconstruct_head(&repo, &pid(), TOL).unwrap().unwrap();
        assert_eq!(snap.region_notes(&region("r1")).len(), 1);
    }
}
