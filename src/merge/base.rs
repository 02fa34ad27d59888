//! Merge-base discovery — nearest common ancestor in the commit DAG.
//!
//! Walks ancestors over both parent edges (merge commits contribute two).
//! The left side's full ancestor set is collected first; the right side is
//! then searched breadth-first, so the first hit is a nearest common
//! ancestor by generation distance from the right side. Traversal order is
//! deterministic: first parent before second parent, queue order preserved.

use std::collections::{BTreeSet, VecDeque};

use crate::error::HistoryError;
use crate::model::VariationId;
use crate::store::VariationRepository;

/// Find the nearest common ancestor of two variations.
///
/// A variation is its own ancestor: `find_merge_base(x, x)` is `Some(x)`,
/// and merging a commit with its own ancestor yields that ancestor.
/// Returns `None` when the two ids share no history (or either does not
/// exist).
///
/// # Errors
/// Propagates repository failures.
pub fn find_merge_base(
    repo: &dyn VariationRepository,
    left: &VariationId,
    right: &VariationId,
) -> Result<Option<VariationId>, HistoryError> {
    let left_ancestors = ancestor_set(repo, left)?;
    if left_ancestors.is_empty() {
        return Ok(None);
    }

    let mut queue: VecDeque<VariationId> = VecDeque::new();
    let mut seen: BTreeSet<VariationId> = BTreeSet::new();
    queue.push_back(right.clone());
    seen.insert(right.clone());

    while let Some(current) = queue.pop_front() {
        let Some(variation) = repo.load_variation(&current)? else {
            continue;
        };
        if left_ancestors.contains(&current) {
            return Ok(Some(current));
        }
        for parent in [
            &variation.parent_variation_id,
            &variation.parent2_variation_id,
        ]
        .into_iter()
        .flatten()
        {
            if seen.insert(parent.clone()) {
                queue.push_back(parent.clone());
            }
        }
    }

    Ok(None)
}

/// Every ancestor of `id` (including `id` itself), over both parent edges.
fn ancestor_set(
    repo: &dyn VariationRepository,
    id: &VariationId,
) -> Result<BTreeSet<VariationId>, HistoryError> {
    let mut seen: BTreeSet<VariationId> = BTreeSet::new();
    let mut queue: VecDeque<VariationId> = VecDeque::new();
    queue.push_back(id.clone());

    while let Some(current) = queue.pop_front() {
        let Some(variation) = repo.load_variation(&current)? else {
            continue;
        };
        if !seen.insert(current) {
            continue;
        }
        for parent in [
            &variation.parent_variation_id,
            &variation.parent2_variation_id,
        ]
        .into_iter()
        .flatten()
        {
            if !seen.contains(parent) {
                queue.push_back(parent.clone());
            }
        }
    }

    Ok(seen)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
