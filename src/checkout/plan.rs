//! Checkout planning — minimal ordered mutations from working to target.
//!
//! [`build_checkout_plan`] diffs the working snapshot against a target
//! snapshot and synthesizes the smallest deterministic sequence of tool
//! calls that transforms one into the other.
//!
//! Note policy per region: any removed or modified note — or a total
//! change count at the reset threshold — forces a **reset** (clear all
//! notes, then one bulk add of the complete target list), because the
//! execution layer has no per-note removal primitive. Pure additions below
//! the threshold patch incrementally. Controller layers always patch
//! incrementally (add-only; there is no controller clear primitive).
//!
//! Operation order is fixed: within a region clear → add-notes → CC →
//! pitch-bend → aftertouch; across regions, sorted region-id order.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::EngineConfig;
use crate::matcher::{MatchClass, MatchCounts, match_events};
use crate::model::{
    AftertouchEvent, CcEvent, MidiNote, PitchBendEvent, ProjectId, RegionId, Snapshot,
    VariationId,
};

// ---------------------------------------------------------------------------
// ToolCall
// ---------------------------------------------------------------------------

/// One atomic mutation of the working session.
///
/// Serialized in the wire shape `{"tool": <name>, "arguments": {…}}` with
/// the canonical tool names `clear_notes`, `add_notes`, `add_midi_cc`,
/// `add_pitch_bend`, `add_aftertouch`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tool", content = "arguments", rename_all = "snake_case")]
pub enum ToolCall {
    /// Remove every note in a region.
    ClearNotes {
        /// Target region.
        region_id: RegionId,
    },
    /// Append notes to a region.
    AddNotes {
        /// Target region.
        region_id: RegionId,
        /// Notes to append.
        notes: Vec<MidiNote>,
    },
    /// Append CC events for one controller number.
    AddMidiCc {
        /// Target region.
        region_id: RegionId,
        /// Controller number.
        cc: u8,
        /// Events to append.
        events: Vec<CcEvent>,
    },
    /// Append pitch-bend events.
    AddPitchBend {
        /// Target region.
        region_id: RegionId,
        /// Events to append.
        events: Vec<PitchBendEvent>,
    },
    /// Append aftertouch events.
    AddAftertouch {
        /// Target region.
        region_id: RegionId,
        /// Events to append.
        events: Vec<AftertouchEvent>,
    },
}

impl ToolCall {
    /// The canonical wire name of this operation.
    #[must_use]
    pub const fn tool_name(&self) -> &'static str {
        match self {
            Self::ClearNotes { .. } => "clear_notes",
            Self::AddNotes { .. } => "add_notes",
            Self::AddMidiCc { .. } => "add_midi_cc",
            Self::AddPitchBend { .. } => "add_pitch_bend",
            Self::AddAftertouch { .. } => "add_aftertouch",
        }
    }

    /// The region this operation targets.
    #[must_use]
    pub const fn region_id(&self) -> &RegionId {
        match self {
            Self::ClearNotes { region_id }
            | Self::AddNotes { region_id, .. }
            | Self::AddMidiCc { region_id, .. }
            | Self::AddPitchBend { region_id, .. }
            | Self::AddAftertouch { region_id, .. } => region_id,
        }
    }
}

// ---------------------------------------------------------------------------
// CheckoutPlan
// ---------------------------------------------------------------------------

/// Immutable, pure-data result of checkout planning.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CheckoutPlan {
    /// The project being checked out.
    pub project_id: ProjectId,
    /// The variation the plan transforms the working session into.
    pub target_variation_id: VariationId,
    /// Ordered tool calls.
    pub operations: Vec<ToolCall>,
    /// Regions that required a full reset rather than an incremental patch.
    pub regions_reset: BTreeSet<RegionId>,
    /// Expected post-execution fingerprint per region, for verification.
    pub expected_fingerprints: BTreeMap<RegionId, String>,
    /// `true` when the plan carries zero operations.
    pub is_noop: bool,
}

impl CheckoutPlan {
    /// Deterministic SHA-256 over the plan's canonical serialization.
    ///
    /// Identical inputs always produce identical hashes; used for
    /// idempotency and audit, not for security.
    #[must_use]
    pub fn plan_hash(&self) -> String {
        let mut hasher = Sha256::new();
        // Canonical: BTree collections are sorted, operation order is part
        // of the plan's identity.
        let json = serde_json::to_string(self).unwrap_or_default();
        hasher.update(json.as_bytes());
        let digest = hasher.finalize();
        let mut hex = String::with_capacity(64);
        for b in digest {
            let _ = write!(hex, "{b:02x}");
        }
        hex
    }
}

// ---------------------------------------------------------------------------
// build_checkout_plan
// ---------------------------------------------------------------------------

/// Plan the transformation of `working` into `target`.
///
/// Deterministic: identical snapshots produce identical operation order
/// and an identical plan hash.
#[must_use]
pub fn build_checkout_plan(
    project_id: &ProjectId,
    target_variation_id: &VariationId,
    target: &Snapshot,
    working: &Snapshot,
    config: &EngineConfig,
) -> CheckoutPlan {
    let tolerance = config.matching.note_tolerance_beats;
    let threshold = config.checkout.reset_threshold;

    let mut operations: Vec<ToolCall> = Vec::new();
    let mut regions_reset: BTreeSet<RegionId> = BTreeSet::new();
    let mut expected_fingerprints: BTreeMap<RegionId, String> = BTreeMap::new();

    let mut regions: Vec<RegionId> = target
        .regions()
        .union(&working.regions())
        .cloned()
        .collect();
    regions.sort();

    for region in regions {
        expected_fingerprints.insert(region.clone(), target.region_fingerprint(&region));

        // -- notes: reset or incremental patch --
        let matches = match_events(
            working.region_notes(&region),
            target.region_notes(&region),
            tolerance,
        );
        let counts = MatchCounts::tally(&matches);
        let needs_reset =
            counts.removed > 0 || counts.modified > 0 || counts.changes() >= threshold;

        if needs_reset {
            regions_reset.insert(region.clone());
            operations.push(ToolCall::ClearNotes {
                region_id: region.clone(),
            });
            let full = target.region_notes(&region);
            if !full.is_empty() {
                operations.push(ToolCall::AddNotes {
                    region_id: region.clone(),
                    notes: full.to_vec(),
                });
            }
        } else if counts.added > 0 {
            let added: Vec<MidiNote> = matches
                .iter()
                .filter(|m| m.class == MatchClass::Added)
                .filter_map(|m| m.proposed.clone())
                .collect();
            operations.push(ToolCall::AddNotes {
                region_id: region.clone(),
                notes: added,
            });
        }

        // -- CC: one add per distinct controller number --
        let cc_matches = match_events(
            working.region_cc(&region),
            target.region_cc(&region),
            tolerance,
        );
        let mut per_controller: BTreeMap<u8, Vec<CcEvent>> = BTreeMap::new();
        for m in &cc_matches {
            if matches!(m.class, MatchClass::Added | MatchClass::Modified)
                && let Some(event) = &m.proposed
            {
                per_controller.entry(event.cc).or_default().push(event.clone());
            }
        }
        for (cc, events) in per_controller {
            operations.push(ToolCall::AddMidiCc {
                region_id: region.clone(),
                cc,
                events,
            });
        }

        // -- pitch bend --
        let pb: Vec<PitchBendEvent> = match_events(
            working.region_pitch_bends(&region),
            target.region_pitch_bends(&region),
            tolerance,
        )
        .into_iter()
        .filter(|m| matches!(m.class, MatchClass::Added | MatchClass::Modified))
        .filter_map(|m| m.proposed)
        .collect();
        if !pb.is_empty() {
            operations.push(ToolCall::AddPitchBend {
                region_id: region.clone(),
                events: pb,
            });
        }

        // -- aftertouch --
        let at: Vec<AftertouchEvent> = match_events(
            working.region_aftertouch(&region),
            target.region_aftertouch(&region),
            tolerance,
        )
        .into_iter()
        .filter(|m| matches!(m.class, MatchClass::Added | MatchClass::Modified))
        .filter_map(|m| m.proposed)
        .collect();
        if !at.is_empty() {
            operations.push(ToolCall::AddAftertouch {
                region_id: region.clone(),
                events: at,
            });
        }
    }

    let is_noop = operations.is_empty();
    CheckoutPlan {
        project_id: project_id.clone(),
        target_variation_id: target_variation_id.clone(),
        operations,
        regions_reset,
        expected_fingerprints,
        is_noop,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
