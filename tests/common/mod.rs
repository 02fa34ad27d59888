//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::BTreeSet;

use cadenza::model::{
    MidiNote, NoteChange, Phrase, ProjectId, RegionId, TrackId, Variation, VariationId,
    VariationStatus,
};
use cadenza::replay::reconstruct;
use cadenza::store::VariationRepository as _;
use cadenza::store::memory::{MemoryRepository, MemoryWorkingStore};

/// Start-beat tolerance used throughout the fixtures.
pub const TOL: f64 = 0.05;

pub fn pid() -> ProjectId {
    ProjectId::new("song-1").unwrap()
}

pub fn vid(s: &str) -> VariationId {
    VariationId::new(s).unwrap()
}

pub fn region(s: &str) -> RegionId {
    RegionId::new(s).unwrap()
}

pub fn track(s: &str) -> TrackId {
    TrackId::new(s).unwrap()
}

pub fn note(pitch: u8, beat: f64) -> MidiNote {
    MidiNote::new(pitch, beat, 1.0, 100)
}

pub fn note_vel(pitch: u8, beat: f64, velocity: u8) -> MidiNote {
    MidiNote::new(pitch, beat, 1.0, velocity)
}

pub fn added(n: MidiNote) -> NoteChange {
    NoteChange::Added { after: n }
}

pub fn removed(n: MidiNote) -> NoteChange {
    NoteChange::Removed { before: n }
}

pub fn modified(before: MidiNote, after: MidiNote) -> NoteChange {
    NoteChange::Modified { before, after }
}

pub fn phrase(region_id: &str, note_changes: Vec<NoteChange>) -> Phrase {
    Phrase {
        label: format!("phrase {region_id}"),
        region_id: region(region_id),
        track_id: track("t1"),
        region_start_beat: 0.0,
        start_beat: 0.0,
        end_beat: 4.0,
        note_changes,
        controller_changes: Vec::new(),
    }
}

pub fn commit(id: &str, parent: Option<&str>, ts: u64, phrases: Vec<Phrase>) -> Variation {
    Variation {
        variation_id: vid(id),
        intent: format!("intent {id}"),
        explanation: None,
        affected_tracks: phrases.iter().map(|p| p.track_id.clone()).collect(),
        affected_regions: phrases.iter().map(|p| p.region_id.clone()).collect(),
        beat_range: (0.0, 4.0),
        phrases,
        parent_variation_id: parent.map(vid),
        parent2_variation_id: None,
        status: VariationStatus::Committed,
        created_at_ms: ts,
    }
}

pub fn save(repo: &mut MemoryRepository, v: Variation) {
    repo.save_variation(&pid(), v).unwrap();
}

/// The canonical three-commit diamond setup:
///
/// - `base` adds `(60, 0.0)` in region `r1`
/// - `left` (child of base) raises that note's velocity to 70
/// - `right` (child of base) adds `(72, 2.0)`
pub fn diamond() -> MemoryRepository {
    let mut repo = MemoryRepository::new();
    save(
        &mut repo,
        commit("base", None, 100, vec![phrase("r1", vec![added(note(60, 0.0))])]),
    );
    save(
        &mut repo,
        commit(
            "left",
            Some("base"),
            200,
            vec![phrase(
                "r1",
                vec![modified(note(60, 0.0), note_vel(60, 0.0, 70))],
            )],
        ),
    );
    save(
        &mut repo,
        commit(
            "right",
            Some("base"),
            300,
            vec![phrase("r1", vec![added(note(72, 2.0))])],
        ),
    );
    repo
}

/// A working store seeded with the reconstructed state of `id`, with region
/// metadata registered for every region the snapshot mentions.
pub fn working_at(repo: &MemoryRepository, id: &str) -> MemoryWorkingStore {
    let snapshot = reconstruct(repo, &vid(id), TOL)
        .unwrap()
        .expect("fixture variation must reconstruct");
    let mut store = MemoryWorkingStore::new();
    for r in snapshot.regions() {
        let t = snapshot
            .region_tracks
            .get(&r)
            .cloned()
            .unwrap_or_else(|| track("t1"));
        let start = snapshot.region_starts.get(&r).copied().unwrap_or(0.0);
        store.add_region(r.clone(), t, start);
    }
    for (r, notes) in &snapshot.notes {
        store.seed_notes(r, notes.clone());
    }
    for (r, events) in &snapshot.cc {
        store.seed_cc(r, events.clone());
    }
    for (r, events) in &snapshot.pitch_bends {
        store.seed_pitch_bends(r, events.clone());
    }
    for (r, events) in &snapshot.aftertouch {
        store.seed_aftertouch(r, events.clone());
    }
    store
}

/// Empty sets helper for hand-built variations.
pub fn no_regions() -> BTreeSet<RegionId> {
    BTreeSet::new()
}
