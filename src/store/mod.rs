//! Storage adapters consumed by the engine.
//!
//! Two seams separate the pure history core from the outside world:
//!
//! - [`VariationRepository`] — durable commit storage (variations, HEAD
//!   pointers, lineage queries).
//! - [`WorkingStore`] — the live working session (per-region note and
//!   controller state, mutated only inside a [`WorkingTransaction`]).
//!
//! The engine never looks behind these traits. Transactions are
//! all-or-nothing: `commit` only if every operation in a plan succeeded,
//! otherwise `rollback` restores the pre-transaction state. Isolation,
//! cancellation, and timeouts are the implementations' concern.
//!
//! [`memory`] provides the in-process reference implementations used by the
//! test suite and the CLI.

pub mod memory;

use std::fmt;

use crate::model::{
    AftertouchEvent, CcEvent, HeadPointer, MidiNote, PitchBendEvent, ProjectId, RegionId,
    Snapshot, TrackId, Variation, VariationId, VariationSummary,
};

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

/// Error type for both adapter traits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreError {
    /// A referenced entity does not exist.
    NotFound {
        /// What was missing, e.g. `"variation abc123"`.
        what: String,
    },
    /// An entity that must be unique already exists.
    AlreadyExists {
        /// What collided.
        what: String,
    },
    /// The transaction handle was already committed or rolled back.
    TransactionClosed,
    /// Backend-specific failure.
    Backend {
        /// Human-readable description.
        detail: String,
    },
}

impl StoreError {
    /// Convenience constructor for [`StoreError::NotFound`].
    #[must_use]
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Convenience constructor for [`StoreError::Backend`].
    #[must_use]
    pub fn backend(detail: impl Into<String>) -> Self {
        Self::Backend {
            detail: detail.into(),
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { what } => write!(f, "{what} not found"),
            Self::AlreadyExists { what } => write!(f, "{what} already exists"),
            Self::TransactionClosed => {
                write!(f, "transaction already committed or rolled back")
            }
            Self::Backend { detail } => write!(f, "store backend error: {detail}"),
        }
    }
}

impl std::error::Error for StoreError {}

// ---------------------------------------------------------------------------
// VariationRepository
// ---------------------------------------------------------------------------

/// Durable storage for variations and HEAD pointers.
pub trait VariationRepository {
    /// Persist a new variation under a project.
    ///
    /// Variations are immutable: saving an id that already exists is an
    /// error, never an overwrite.
    ///
    /// # Errors
    /// [`StoreError::AlreadyExists`] on duplicate id, or a backend error.
    fn save_variation(
        &mut self,
        project: &ProjectId,
        variation: Variation,
    ) -> Result<(), StoreError>;

    /// Load a variation by id. `Ok(None)` when it does not exist.
    ///
    /// # Errors
    /// Backend errors only; absence is not an error.
    fn load_variation(&self, id: &VariationId) -> Result<Option<Variation>, StoreError>;

    /// The project's HEAD pointer. `Ok(None)` before the first `set_head`.
    ///
    /// # Errors
    /// Backend errors only.
    fn get_head(&self, project: &ProjectId) -> Result<Option<HeadPointer>, StoreError>;

    /// Create or replace the project's HEAD pointer.
    ///
    /// # Errors
    /// Backend errors only.
    fn set_head(
        &mut self,
        project: &ProjectId,
        variation: &VariationId,
        commit_state_id: Option<String>,
    ) -> Result<(), StoreError>;

    /// Move an existing HEAD pointer to another variation.
    ///
    /// # Errors
    /// [`StoreError::NotFound`] when the project has no HEAD yet.
    fn move_head(&mut self, project: &ProjectId, variation: &VariationId)
    -> Result<(), StoreError>;

    /// All variations whose first or second parent is `id`.
    ///
    /// # Errors
    /// Backend errors only; a childless id yields an empty list.
    fn get_children(&self, id: &VariationId) -> Result<Vec<Variation>, StoreError>;

    /// The first-parent ancestor chain of `id`, root first, ending with
    /// `id` itself.
    ///
    /// # Errors
    /// [`StoreError::NotFound`] when `id` or any ancestor link is missing.
    fn get_lineage(&self, id: &VariationId) -> Result<Vec<Variation>, StoreError>;

    /// Summaries of every variation in a project, in insertion order.
    ///
    /// # Errors
    /// Backend errors only; an unknown project yields an empty list.
    fn variations_for_project(
        &self,
        project: &ProjectId,
    ) -> Result<Vec<VariationSummary>, StoreError>;

    /// Mark a variation committed.
    ///
    /// # Errors
    /// [`StoreError::NotFound`] when the variation does not exist.
    fn mark_committed(&mut self, id: &VariationId) -> Result<(), StoreError>;

    /// Mark a variation discarded.
    ///
    /// # Errors
    /// [`StoreError::NotFound`] when the variation does not exist.
    fn mark_discarded(&mut self, id: &VariationId) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// WorkingStore
// ---------------------------------------------------------------------------

/// The live working-session state, read directly and mutated only within a
/// transaction.
pub trait WorkingStore {
    /// All regions currently present in the session.
    fn regions(&self) -> Vec<RegionId>;

    /// Notes in a region (empty when the region is absent).
    ///
    /// # Errors
    /// Backend errors only.
    fn region_notes(&self, region: &RegionId) -> Result<Vec<MidiNote>, StoreError>;

    /// CC events in a region.
    ///
    /// # Errors
    /// Backend errors only.
    fn region_cc(&self, region: &RegionId) -> Result<Vec<CcEvent>, StoreError>;

    /// Pitch-bend events in a region.
    ///
    /// # Errors
    /// Backend errors only.
    fn region_pitch_bends(&self, region: &RegionId) -> Result<Vec<PitchBendEvent>, StoreError>;

    /// Aftertouch events in a region.
    ///
    /// # Errors
    /// Backend errors only.
    fn region_aftertouch(&self, region: &RegionId) -> Result<Vec<AftertouchEvent>, StoreError>;

    /// The track owning a region, if known.
    ///
    /// # Errors
    /// Backend errors only.
    fn region_track(&self, region: &RegionId) -> Result<Option<TrackId>, StoreError>;

    /// A region's start position on the track timeline, if known.
    ///
    /// # Errors
    /// Backend errors only.
    fn region_start_beat(&self, region: &RegionId) -> Result<Option<f64>, StoreError>;

    /// Open a transaction. All mutation goes through the returned handle;
    /// dropping it without `commit` restores the pre-transaction state.
    ///
    /// # Errors
    /// Backend errors (e.g. a transaction is already open).
    fn begin_transaction<'a>(
        &'a mut self,
        label: &str,
    ) -> Result<Box<dyn WorkingTransaction + 'a>, StoreError>;

    /// Capture the entire session as a [`Snapshot`].
    ///
    /// # Errors
    /// Propagates the first region read error.
    fn capture_snapshot(&self) -> Result<Snapshot, StoreError> {
        let mut snapshot = Snapshot::new();
        for region in self.regions() {
            let notes = self.region_notes(&region)?;
            if !notes.is_empty() {
                snapshot.notes.insert(region.clone(), notes);
            }
            let cc = self.region_cc(&region)?;
            if !cc.is_empty() {
                snapshot.cc.insert(region.clone(), cc);
            }
            let pb = self.region_pitch_bends(&region)?;
            if !pb.is_empty() {
                snapshot.pitch_bends.insert(region.clone(), pb);
            }
            let at = self.region_aftertouch(&region)?;
            if !at.is_empty() {
                snapshot.aftertouch.insert(region.clone(), at);
            }
            if let Some(track) = self.region_track(&region)? {
                snapshot.region_tracks.insert(region.clone(), track);
            }
            if let Some(start) = self.region_start_beat(&region)? {
                snapshot.region_starts.insert(region.clone(), start);
            }
        }
        Ok(snapshot)
    }
}

// ---------------------------------------------------------------------------
// WorkingTransaction
// ---------------------------------------------------------------------------

/// Mutation handle for one working-store transaction.
pub trait WorkingTransaction {
    /// Notes currently in a region, as seen inside this transaction.
    ///
    /// # Errors
    /// Backend errors only.
    fn region_notes(&self, region: &RegionId) -> Result<Vec<MidiNote>, StoreError>;

    /// Append notes to a region.
    ///
    /// # Errors
    /// Backend errors, or [`StoreError::TransactionClosed`].
    fn add_notes(&mut self, region: &RegionId, notes: &[MidiNote]) -> Result<(), StoreError>;

    /// Remove notes from a region by value.
    ///
    /// # Errors
    /// Backend errors, or [`StoreError::TransactionClosed`].
    fn remove_notes(&mut self, region: &RegionId, notes: &[MidiNote]) -> Result<(), StoreError>;

    /// Append CC events to a region.
    ///
    /// # Errors
    /// Backend errors, or [`StoreError::TransactionClosed`].
    fn add_cc(&mut self, region: &RegionId, events: &[CcEvent]) -> Result<(), StoreError>;

    /// Append pitch-bend events to a region.
    ///
    /// # Errors
    /// Backend errors, or [`StoreError::TransactionClosed`].
    fn add_pitch_bends(
        &mut self,
        region: &RegionId,
        events: &[PitchBendEvent],
    ) -> Result<(), StoreError>;

    /// Append aftertouch events to a region.
    ///
    /// # Errors
    /// Backend errors, or [`StoreError::TransactionClosed`].
    fn add_aftertouch(
        &mut self,
        region: &RegionId,
        events: &[AftertouchEvent],
    ) -> Result<(), StoreError>;

    /// Make every mutation in this transaction durable.
    ///
    /// # Errors
    /// Backend errors; on error the state is rolled back.
    fn commit(self: Box<Self>) -> Result<(), StoreError>;

    /// Discard every mutation in this transaction.
    ///
    /// # Errors
    /// Backend errors only.
    fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
