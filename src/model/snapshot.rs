//! Materialized per-region state and content fingerprints.
//!
//! A [`Snapshot`] is the note/controller state of every region at one point:
//! either derived by replaying a variation lineage
//! ([`crate::replay`]) or captured live from the working session. Snapshots
//! are never persisted — they are always rebuilt from their source.
//!
//! # Fingerprints
//!
//! `region_fingerprint` is a SHA-256 over a canonically sorted, canonically
//! serialized rendering of the region's notes and all three controller
//! layers. Shuffling a region's event lists does not change its fingerprint;
//! changing any field of any event does. The exact digest is stable only
//! within one running system — it is an equality shortcut, not a wire
//! compatibility promise.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use sha2::{Digest, Sha256};

use super::event::{AftertouchEvent, CcEvent, MidiNote, PitchBendEvent};
use super::ids::{RegionId, TrackId};

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Per-region note and controller state at one commit or in the working
/// session.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    /// Notes per region.
    pub notes: BTreeMap<RegionId, Vec<MidiNote>>,
    /// CC events per region (all controller numbers interleaved).
    pub cc: BTreeMap<RegionId, Vec<CcEvent>>,
    /// Pitch-bend events per region.
    pub pitch_bends: BTreeMap<RegionId, Vec<PitchBendEvent>>,
    /// Aftertouch events per region.
    pub aftertouch: BTreeMap<RegionId, Vec<AftertouchEvent>>,
    /// Owning track per region.
    pub region_tracks: BTreeMap<RegionId, TrackId>,
    /// Region start position on the track timeline, in beats.
    pub region_starts: BTreeMap<RegionId, f64>,
}

impl Snapshot {
    /// Create an empty snapshot.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            notes: BTreeMap::new(),
            cc: BTreeMap::new(),
            pitch_bends: BTreeMap::new(),
            aftertouch: BTreeMap::new(),
            region_tracks: BTreeMap::new(),
            region_starts: BTreeMap::new(),
        }
    }

    /// All regions that appear in any event layer or lookup table.
    #[must_use]
    pub fn regions(&self) -> BTreeSet<RegionId> {
        let mut out: BTreeSet<RegionId> = BTreeSet::new();
        out.extend(self.notes.keys().cloned());
        out.extend(self.cc.keys().cloned());
        out.extend(self.pitch_bends.keys().cloned());
        out.extend(self.aftertouch.keys().cloned());
        out.extend(self.region_tracks.keys().cloned());
        out
    }

    /// Notes for a region (empty slice when the region has none).
    #[must_use]
    pub fn region_notes(&self, region: &RegionId) -> &[MidiNote] {
        self.notes.get(region).map_or(&[], Vec::as_slice)
    }

    /// CC events for a region.
    #[must_use]
    pub fn region_cc(&self, region: &RegionId) -> &[CcEvent] {
        self.cc.get(region).map_or(&[], Vec::as_slice)
    }

    /// Pitch-bend events for a region.
    #[must_use]
    pub fn region_pitch_bends(&self, region: &RegionId) -> &[PitchBendEvent] {
        self.pitch_bends.get(region).map_or(&[], Vec::as_slice)
    }

    /// Aftertouch events for a region.
    #[must_use]
    pub fn region_aftertouch(&self, region: &RegionId) -> &[AftertouchEvent] {
        self.aftertouch.get(region).map_or(&[], Vec::as_slice)
    }

    /// `true` when no region carries any event.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.notes.values().all(Vec::is_empty)
            && self.cc.values().all(Vec::is_empty)
            && self.pitch_bends.values().all(Vec::is_empty)
            && self.aftertouch.values().all(Vec::is_empty)
    }

    /// Combined fingerprint of one region's notes plus all controller layers.
    ///
    /// Order-independent: events are canonically sorted before hashing.
    #[must_use]
    pub fn region_fingerprint(&self, region: &RegionId) -> String {
        let mut hasher = Sha256::new();

        let mut notes: Vec<&MidiNote> = self.region_notes(region).iter().collect();
        notes.sort_by(|a, b| {
            a.start_beat
                .total_cmp(&b.start_beat)
                .then_with(|| a.pitch.cmp(&b.pitch))
                .then_with(|| a.duration_beats.total_cmp(&b.duration_beats))
                .then_with(|| a.velocity.cmp(&b.velocity))
                .then_with(|| a.channel.cmp(&b.channel))
        });
        for n in notes {
            hasher.update(canon_note(n).as_bytes());
            hasher.update(b"\n");
        }
        hasher.update(b"--cc--\n");

        let mut cc: Vec<&CcEvent> = self.region_cc(region).iter().collect();
        cc.sort_by(|a, b| {
            a.cc.cmp(&b.cc)
                .then_with(|| a.beat.total_cmp(&b.beat))
                .then_with(|| a.value.cmp(&b.value))
        });
        for e in cc {
            hasher.update(canon_cc(e).as_bytes());
            hasher.update(b"\n");
        }
        hasher.update(b"--pb--\n");

        let mut pb: Vec<&PitchBendEvent> = self.region_pitch_bends(region).iter().collect();
        pb.sort_by(|a, b| a.beat.total_cmp(&b.beat).then_with(|| a.value.cmp(&b.value)));
        for e in pb {
            hasher.update(canon_pitch_bend(e).as_bytes());
            hasher.update(b"\n");
        }
        hasher.update(b"--at--\n");

        let mut at: Vec<&AftertouchEvent> = self.region_aftertouch(region).iter().collect();
        at.sort_by(|a, b| {
            a.beat
                .total_cmp(&b.beat)
                .then_with(|| a.pitch.cmp(&b.pitch))
                .then_with(|| a.value.cmp(&b.value))
        });
        for e in at {
            hasher.update(canon_aftertouch(e).as_bytes());
            hasher.update(b"\n");
        }

        to_hex(&hasher.finalize())
    }
}

// ---------------------------------------------------------------------------
// Canonical encodings
// ---------------------------------------------------------------------------

/// Render a beat position with fixed precision.
///
/// Six fractional digits is far below the matching tolerance, so any two
/// beats that encode identically also compare equal for matching purposes.
/// Adding `0.0` first normalizes negative zero.
#[must_use]
pub fn canon_beat(beat: f64) -> String {
    format!("{:.6}", beat + 0.0)
}

fn canon_note(n: &MidiNote) -> String {
    let mut s = String::new();
    let _ = write!(
        s,
        "n:{}:{}:{}:{}",
        n.pitch,
        canon_beat(n.start_beat),
        canon_beat(n.duration_beats),
        n.velocity
    );
    if let Some(ch) = n.channel {
        let _ = write!(s, ":{ch}");
    }
    s
}

fn canon_cc(e: &CcEvent) -> String {
    format!("c:{}:{}:{}", e.cc, canon_beat(e.beat), e.value)
}

fn canon_pitch_bend(e: &PitchBendEvent) -> String {
    format!("p:{}:{}", canon_beat(e.beat), e.value)
}

fn canon_aftertouch(e: &AftertouchEvent) -> String {
    let mut s = format!("a:{}:{}", canon_beat(e.beat), e.value);
    if let Some(pitch) = e.pitch {
        let _ = write!(s, ":{pitch}");
    }
    s
}

/// Lowercase hex rendering of a digest.
fn to_hex(digest: &[u8]) -> String {
    let mut hex = String::with_capacity(digest.len() * 2);
    for b in digest {
        let _ = write!(hex, "{b:02x}");
    }
    hex
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
