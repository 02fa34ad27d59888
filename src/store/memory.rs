//! In-memory reference adapters.
//!
//! [`MemoryRepository`] and [`MemoryWorkingStore`] back the test suite and
//! the CLI. The working store implements all-or-nothing transactions by
//! cloning its event state at `begin_transaction` and restoring the clone
//! on rollback (or on drop without commit).

use std::collections::BTreeMap;

use crate::model::{
    AftertouchEvent, CcEvent, HeadPointer, MidiNote, PitchBendEvent, ProjectId, RegionId,
    TrackId, Variation, VariationId, VariationStatus, VariationSummary,
};

use super::{StoreError, VariationRepository, WorkingStore, WorkingTransaction};

// ---------------------------------------------------------------------------
// MemoryRepository
// ---------------------------------------------------------------------------

/// In-memory [`VariationRepository`].
#[derive(Clone, Debug, Default)]
pub struct MemoryRepository {
    variations: BTreeMap<VariationId, Variation>,
    heads: BTreeMap<ProjectId, HeadPointer>,
    /// Insertion order per project; `variations_for_project` preserves it.
    project_order: BTreeMap<ProjectId, Vec<VariationId>>,
}

impl MemoryRepository {
    /// Create an empty repository.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            variations: BTreeMap::new(),
            heads: BTreeMap::new(),
            project_order: BTreeMap::new(),
        }
    }

    /// Number of stored variations across all projects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.variations.len()
    }

    /// Full variations of a project, in insertion order.
    ///
    /// Used by the archive layer to round-trip repository contents;
    /// the trait surface only exposes summaries in bulk.
    #[must_use]
    pub fn export_variations(&self, project: &ProjectId) -> Vec<Variation> {
        self.project_order
            .get(project)
            .map_or(&[][..], Vec::as_slice)
            .iter()
            .filter_map(|id| self.variations.get(id))
            .cloned()
            .collect()
    }

    /// `true` when no variation is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.variations.is_empty()
    }
}

impl VariationRepository for MemoryRepository {
    fn save_variation(
        &mut self,
        project: &ProjectId,
        variation: Variation,
    ) -> Result<(), StoreError> {
        let id = variation.variation_id.clone();
        if self.variations.contains_key(&id) {
            return Err(StoreError::AlreadyExists {
                what: format!("variation {id}"),
            });
        }
        self.variations.insert(id.clone(), variation);
        self.project_order.entry(project.clone()).or_default().push(id);
        Ok(())
    }

    fn load_variation(&self, id: &VariationId) -> Result<Option<Variation>, StoreError> {
        Ok(self.variations.get(id).cloned())
    }

    fn get_head(&self, project: &ProjectId) -> Result<Option<HeadPointer>, StoreError> {
        Ok(self.heads.get(project).cloned())
    }

    fn set_head(
        &mut self,
        project: &ProjectId,
        variation: &VariationId,
        commit_state_id: Option<String>,
    ) -> Result<(), StoreError> {
        self.heads.insert(
            project.clone(),
            HeadPointer {
                variation_id: variation.clone(),
                commit_state_id,
            },
        );
        Ok(())
    }

    fn move_head(
        &mut self,
        project: &ProjectId,
        variation: &VariationId,
    ) -> Result<(), StoreError> {
        let head = self
            .heads
            .get_mut(project)
            .ok_or_else(|| StoreError::not_found(format!("head pointer for {project}")))?;
        head.variation_id = variation.clone();
        Ok(())
    }

    fn get_children(&self, id: &VariationId) -> Result<Vec<Variation>, StoreError> {
        Ok(self
            .variations
            .values()
            .filter(|v| {
                v.parent_variation_id.as_ref() == Some(id)
                    || v.parent2_variation_id.as_ref() == Some(id)
            })
            .cloned()
            .collect())
    }

    fn get_lineage(&self, id: &VariationId) -> Result<Vec<Variation>, StoreError> {
        let mut chain: Vec<Variation> = Vec::new();
        let mut cursor = Some(id.clone());
        while let Some(current) = cursor {
            // A first-parent chain longer than the store holds variations
            // can only mean a cycle.
            if chain.len() > self.variations.len() {
                return Err(StoreError::backend(format!(
                    "parent cycle detected walking lineage of {id}"
                )));
            }
            let variation = self
                .variations
                .get(&current)
                .ok_or_else(|| StoreError::not_found(format!("variation {current}")))?;
            cursor = variation.parent_variation_id.clone();
            chain.push(variation.clone());
        }
        chain.reverse();
        Ok(chain)
    }

    fn variations_for_project(
        &self,
        project: &ProjectId,
    ) -> Result<Vec<VariationSummary>, StoreError> {
        let order = self.project_order.get(project).map_or(&[][..], Vec::as_slice);
        Ok(order
            .iter()
            .filter_map(|id| self.variations.get(id))
            .map(VariationSummary::from)
            .collect())
    }

    fn mark_committed(&mut self, id: &VariationId) -> Result<(), StoreError> {
        let v = self
            .variations
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found(format!("variation {id}")))?;
        v.status = VariationStatus::Committed;
        Ok(())
    }

    fn mark_discarded(&mut self, id: &VariationId) -> Result<(), StoreError> {
        let v = self
            .variations
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found(format!("variation {id}")))?;
        v.status = VariationStatus::Discarded;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryWorkingStore
// ---------------------------------------------------------------------------

/// Event state of the in-memory working session.
#[derive(Clone, Debug, Default, PartialEq)]
struct WorkingState {
    notes: BTreeMap<RegionId, Vec<MidiNote>>,
    cc: BTreeMap<RegionId, Vec<CcEvent>>,
    pitch_bends: BTreeMap<RegionId, Vec<PitchBendEvent>>,
    aftertouch: BTreeMap<RegionId, Vec<AftertouchEvent>>,
}

/// In-memory [`WorkingStore`].
#[derive(Clone, Debug, Default)]
pub struct MemoryWorkingStore {
    state: WorkingState,
    region_tracks: BTreeMap<RegionId, TrackId>,
    region_starts: BTreeMap<RegionId, f64>,
    /// Test hook: every mutation targeting this region fails.
    fail_region: Option<RegionId>,
}

impl MemoryWorkingStore {
    /// Create an empty working store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a region with its owning track and timeline start.
    pub fn add_region(&mut self, region: RegionId, track: TrackId, start_beat: f64) {
        self.region_tracks.insert(region.clone(), track);
        self.region_starts.insert(region.clone(), start_beat);
        self.state.notes.entry(region).or_default();
    }

    /// Seed notes directly, outside any transaction.
    pub fn seed_notes(&mut self, region: &RegionId, notes: Vec<MidiNote>) {
        self.state.notes.insert(region.clone(), notes);
    }

    /// Seed CC events directly, outside any transaction.
    pub fn seed_cc(&mut self, region: &RegionId, events: Vec<CcEvent>) {
        self.state.cc.insert(region.clone(), events);
    }

    /// Seed pitch-bend events directly, outside any transaction.
    pub fn seed_pitch_bends(&mut self, region: &RegionId, events: Vec<PitchBendEvent>) {
        self.state.pitch_bends.insert(region.clone(), events);
    }

    /// Seed aftertouch events directly, outside any transaction.
    pub fn seed_aftertouch(&mut self, region: &RegionId, events: Vec<AftertouchEvent>) {
        self.state.aftertouch.insert(region.clone(), events);
    }

    /// Make every transactional mutation against `region` fail.
    ///
    /// Fault-injection hook for exercising rollback paths.
    pub fn fail_mutations_for(&mut self, region: RegionId) {
        self.fail_region = Some(region);
    }

    fn check_fail(&self, region: &RegionId) -> Result<(), StoreError> {
        if self.fail_region.as_ref() == Some(region) {
            return Err(StoreError::backend(format!(
                "injected failure for region {region}"
            )));
        }
        Ok(())
    }
}

impl WorkingStore for MemoryWorkingStore {
    fn regions(&self) -> Vec<RegionId> {
        let mut out: Vec<RegionId> = self.region_tracks.keys().cloned().collect();
        for region in self
            .state
            .notes
            .keys()
            .chain(self.state.cc.keys())
            .chain(self.state.pitch_bends.keys())
            .chain(self.state.aftertouch.keys())
        {
            if !out.contains(region) {
                out.push(region.clone());
            }
        }
        out.sort();
        out
    }

    fn region_notes(&self, region: &RegionId) -> Result<Vec<MidiNote>, StoreError> {
        Ok(self.state.notes.get(region).cloned().unwrap_or_default())
    }

    fn region_cc(&self, region: &RegionId) -> Result<Vec<CcEvent>, StoreError> {
        Ok(self.state.cc.get(region).cloned().unwrap_or_default())
    }

    fn region_pitch_bends(&self, region: &RegionId) -> Result<Vec<PitchBendEvent>, StoreError> {
        Ok(self.state.pitch_bends.get(region).cloned().unwrap_or_default())
    }

    fn region_aftertouch(&self, region: &RegionId) -> Result<Vec<AftertouchEvent>, StoreError> {
        Ok(self.state.aftertouch.get(region).cloned().unwrap_or_default())
    }

    fn region_track(&self, region: &RegionId) -> Result<Option<TrackId>, StoreError> {
        Ok(self.region_tracks.get(region).cloned())
    }

    fn region_start_beat(&self, region: &RegionId) -> Result<Option<f64>, StoreError> {
        Ok(self.region_starts.get(region).copied())
    }

    fn begin_transaction<'a>(
        &'a mut self,
        _label: &str,
    ) -> Result<Box<dyn WorkingTransaction + 'a>, StoreError> {
        let undo = self.state.clone();
        Ok(Box::new(MemoryTransaction {
            store: self,
            undo: Some(undo),
        }))
    }
}

// ---------------------------------------------------------------------------
// MemoryTransaction
// ---------------------------------------------------------------------------

/// Transaction over a [`MemoryWorkingStore`].
///
/// Mutations apply directly to the store; `undo` holds the pre-transaction
/// state and is restored on rollback or on drop without commit.
struct MemoryTransaction<'a> {
    store: &'a mut MemoryWorkingStore,
    undo: Option<WorkingState>,
}

impl MemoryTransaction<'_> {
    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.undo.is_none() {
            return Err(StoreError::TransactionClosed);
        }
        Ok(())
    }
}

impl WorkingTransaction for MemoryTransaction<'_> {
    fn region_notes(&self, region: &RegionId) -> Result<Vec<MidiNote>, StoreError> {
        self.store.region_notes(region)
    }

    fn add_notes(&mut self, region: &RegionId, notes: &[MidiNote]) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.store.check_fail(region)?;
        self.store
            .state
            .notes
            .entry(region.clone())
            .or_default()
            .extend_from_slice(notes);
        Ok(())
    }

    fn remove_notes(&mut self, region: &RegionId, notes: &[MidiNote]) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.store.check_fail(region)?;
        let current = self.store.state.notes.entry(region.clone()).or_default();
        for gone in notes {
            if let Some(pos) = current.iter().position(|n| n == gone) {
                current.remove(pos);
            }
        }
        Ok(())
    }

    fn add_cc(&mut self, region: &RegionId, events: &[CcEvent]) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.store.check_fail(region)?;
        self.store
            .state
            .cc
            .entry(region.clone())
            .or_default()
            .extend_from_slice(events);
        Ok(())
    }

    fn add_pitch_bends(
        &mut self,
        region: &RegionId,
        events: &[PitchBendEvent],
    ) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.store.check_fail(region)?;
        self.store
            .state
            .pitch_bends
            .entry(region.clone())
            .or_default()
            .extend_from_slice(events);
        Ok(())
    }

    fn add_aftertouch(
        &mut self,
        region: &RegionId,
        events: &[AftertouchEvent],
    ) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.store.check_fail(region)?;
        self.store
            .state
            .aftertouch
            .entry(region.clone())
            .or_default()
            .extend_from_slice(events);
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.undo = None;
        Ok(())
    }

    fn rollback(mut self: Box<Self>) -> Result<(), StoreError> {
        let undo = self.undo.take().ok_or(StoreError::TransactionClosed)?;
        self.store.state = undo;
        Ok(())
    }
}

impl Drop for MemoryTransaction<'_> {
    fn drop(&mut self) {
        // Dropping an open transaction rolls back.
        if let Some(undo) = self.undo.take() {
            self.store.state = undo;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
