//! Musical event types.
//!
//! Plain-data structs for the events a region carries: MIDI notes and the
//! three controller layers (continuous controller, pitch bend, aftertouch).
//! Beats are fractional `f64` positions measured from the region start.
//!
//! Events carry no identity of their own — identity is a matching concern
//! (pitch + start beat for notes, controller number for CC, timing for
//! pitch bend and aftertouch) and lives in [`crate::matcher`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Highest valid MIDI data-byte value (pitch, velocity, CC value, pressure).
pub const MIDI_DATA_MAX: u8 = 127;

// ---------------------------------------------------------------------------
// MidiNote
// ---------------------------------------------------------------------------

/// A single MIDI note within a region.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MidiNote {
    /// MIDI pitch, 0–127.
    pub pitch: u8,
    /// Start position in beats from the region start (≥ 0, fractional).
    pub start_beat: f64,
    /// Length in beats (> 0).
    pub duration_beats: f64,
    /// MIDI velocity, 0–127.
    pub velocity: u8,
    /// Optional MIDI channel (0–15).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<u8>,
}

impl MidiNote {
    /// Create a note with no channel.
    #[must_use]
    pub const fn new(pitch: u8, start_beat: f64, duration_beats: f64, velocity: u8) -> Self {
        Self {
            pitch,
            start_beat,
            duration_beats,
            velocity,
            channel: None,
        }
    }

    /// Check the note's structural invariants.
    ///
    /// # Errors
    /// Returns a human-readable reason when pitch or velocity exceed 127,
    /// the start beat is negative or non-finite, or the duration is not
    /// strictly positive.
    pub fn validate(&self) -> Result<(), String> {
        if self.pitch > MIDI_DATA_MAX {
            return Err(format!("pitch {} out of range 0-127", self.pitch));
        }
        if self.velocity > MIDI_DATA_MAX {
            return Err(format!("velocity {} out of range 0-127", self.velocity));
        }
        if !self.start_beat.is_finite() || self.start_beat < 0.0 {
            return Err(format!(
                "start beat {} must be finite and >= 0",
                self.start_beat
            ));
        }
        if !self.duration_beats.is_finite() || self.duration_beats <= 0.0 {
            return Err(format!(
                "duration {} must be finite and > 0",
                self.duration_beats
            ));
        }
        if let Some(ch) = self.channel
            && ch > 15
        {
            return Err(format!("channel {ch} out of range 0-15"));
        }
        Ok(())
    }

    /// Beat position where the note ends.
    #[must_use]
    pub fn end_beat(&self) -> f64 {
        self.start_beat + self.duration_beats
    }
}

impl fmt::Display for MidiNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "note(pitch={}, beat={}, dur={}, vel={})",
            self.pitch, self.start_beat, self.duration_beats, self.velocity
        )
    }
}

// ---------------------------------------------------------------------------
// Controller events
// ---------------------------------------------------------------------------

/// A continuous-controller event (CC).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CcEvent {
    /// Controller number, 0–127.
    pub cc: u8,
    /// Position in beats from the region start.
    pub beat: f64,
    /// Controller value, 0–127.
    pub value: u8,
}

impl CcEvent {
    /// Create a CC event.
    #[must_use]
    pub const fn new(cc: u8, beat: f64, value: u8) -> Self {
        Self { cc, beat, value }
    }
}

/// A pitch-bend event. Values span the 14-bit MIDI bend range,
/// centered on zero: −8192 to 8191.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PitchBendEvent {
    /// Position in beats from the region start.
    pub beat: f64,
    /// Bend amount, −8192..=8191.
    pub value: i32,
}

impl PitchBendEvent {
    /// Create a pitch-bend event.
    #[must_use]
    pub const fn new(beat: f64, value: i32) -> Self {
        Self { beat, value }
    }
}

/// An aftertouch (pressure) event.
///
/// `pitch` is set for polyphonic aftertouch, where pressure applies to one
/// held note; `None` means channel pressure. The two are distinct event
/// identities — matching never pairs a poly event with a channel event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AftertouchEvent {
    /// Position in beats from the region start.
    pub beat: f64,
    /// Pressure value, 0–127.
    pub value: u8,
    /// Per-note pitch for polyphonic aftertouch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch: Option<u8>,
}

impl AftertouchEvent {
    /// Create a channel-pressure event.
    #[must_use]
    pub const fn channel(beat: f64, value: u8) -> Self {
        Self {
            beat,
            value,
            pitch: None,
        }
    }

    /// Create a polyphonic (per-note) pressure event.
    #[must_use]
    pub const fn poly(beat: f64, value: u8, pitch: u8) -> Self {
        Self {
            beat,
            value,
            pitch: Some(pitch),
        }
    }
}

// ---------------------------------------------------------------------------
// Beat comparison
// ---------------------------------------------------------------------------

/// Whether two beat positions fall within `tolerance` of each other.
#[must_use]
pub fn beats_close(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() <= tolerance
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
