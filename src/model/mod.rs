//! Domain model: identifiers, events, variations, snapshots.

pub mod event;
pub mod ids;
pub mod snapshot;
pub mod variation;

pub use event::{AftertouchEvent, CcEvent, MidiNote, PitchBendEvent, beats_close};
pub use ids::{ProjectId, RegionId, TrackId, ValidationError, VariationId};
pub use snapshot::Snapshot;
pub use variation::{
    ControllerChange, EventChange, HeadPointer, NoteChange, Phrase, Variation, VariationStatus,
    VariationSummary,
};

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in milliseconds since the Unix epoch.
///
/// Used only to stamp merge commits; ordering ties are broken by
/// `(created_at_ms, variation_id)`, so a coarse clock is fine.
#[must_use]
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
