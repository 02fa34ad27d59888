//! Commit-graph construction and topological ordering.
//!
//! [`build`] performs one bulk read of a project's variations, derives the
//! DAG from `parent`/`parent2` back-references, and emits a stable
//! topological order via Kahn's algorithm: repeatedly emit the
//! smallest-keyed zero-in-degree node, keyed by `(created_at_ms,
//! variation_id)` ascending, then decrement the in-degree of its children —
//! including across second-parent edges of merge commits.
//!
//! Guarantees: every parent appears strictly before every child; ties are
//! fully deterministic. Complexity O(N + E) node visits with an O(log N)
//! ready-set per step.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::HistoryError;
use crate::model::{ProjectId, RegionId, VariationId, VariationSummary};
use crate::store::VariationRepository;

// ---------------------------------------------------------------------------
// CommitGraphNode
// ---------------------------------------------------------------------------

/// Read-only projection of one variation for graph display.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct CommitGraphNode {
    /// Variation id.
    pub id: VariationId,
    /// First parent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<VariationId>,
    /// Second parent (merge commits only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent2: Option<VariationId>,
    /// Whether HEAD currently points at this node.
    pub is_head: bool,
    /// Creation time in wall-clock milliseconds.
    #[serde(rename = "timestamp")]
    pub timestamp_ms: u64,
    /// Free-text commit label.
    pub intent: String,
    /// Regions this variation touches.
    pub regions: Vec<RegionId>,
}

/// A project's commit DAG in topological order, plus HEAD location.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct CommitGraph {
    /// The project this graph describes.
    pub project_id: ProjectId,
    /// Current HEAD, when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head: Option<VariationId>,
    /// Nodes with every parent strictly before every child.
    pub nodes: Vec<CommitGraphNode>,
}

impl CommitGraph {
    /// Position of a node in the topological order.
    #[must_use]
    pub fn index_of(&self, id: &VariationId) -> Option<usize> {
        self.nodes.iter().position(|n| &n.id == id)
    }
}

// ---------------------------------------------------------------------------
// build
// ---------------------------------------------------------------------------

/// Build the commit graph for a project.
///
/// # Errors
/// Propagates repository errors. An unknown project yields an empty graph.
pub fn build(
    repo: &dyn VariationRepository,
    project: &ProjectId,
) -> Result<CommitGraph, HistoryError> {
    let summaries = repo.variations_for_project(project)?;
    let head = repo.get_head(project)?.map(|h| h.variation_id);
    let ordered = topo_sort(&summaries);

    let nodes = ordered
        .into_iter()
        .map(|s| CommitGraphNode {
            is_head: head.as_ref() == Some(&s.variation_id),
            id: s.variation_id,
            parent: s.parent_variation_id,
            parent2: s.parent2_variation_id,
            timestamp_ms: s.created_at_ms,
            intent: s.intent,
            regions: s.affected_regions.into_iter().collect(),
        })
        .collect();

    Ok(CommitGraph {
        project_id: project.clone(),
        head,
        nodes,
    })
}

/// Kahn's algorithm with a `(created_at_ms, variation_id)` ready set.
fn topo_sort(summaries: &[VariationSummary]) -> Vec<VariationSummary> {
    let by_id: BTreeMap<&VariationId, &VariationSummary> = summaries
        .iter()
        .map(|s| (&s.variation_id, s))
        .collect();

    // In-degree counts only parent links that resolve within this project;
    // a dangling parent reference makes the child a root of the view.
    let mut in_degree: BTreeMap<&VariationId, usize> = BTreeMap::new();
    let mut children: BTreeMap<&VariationId, Vec<&VariationId>> = BTreeMap::new();
    for s in summaries {
        let mut degree = 0;
        for parent in [&s.parent_variation_id, &s.parent2_variation_id]
            .into_iter()
            .flatten()
        {
            if by_id.contains_key(parent) {
                degree += 1;
                children.entry(parent).or_default().push(&s.variation_id);
            }
        }
        in_degree.insert(&s.variation_id, degree);
    }

    let mut ready: BTreeSet<(u64, &VariationId)> = in_degree
        .iter()
        .filter(|&(_, degree)| *degree == 0)
        .map(|(&id, _)| (by_id[id].created_at_ms, id))
        .collect();

    let mut ordered: Vec<VariationSummary> = Vec::with_capacity(summaries.len());
    let mut emitted: BTreeSet<&VariationId> = BTreeSet::new();

    while let Some(&(ts, id)) = ready.iter().next() {
        ready.remove(&(ts, id));
        emitted.insert(id);
        ordered.push(by_id[id].clone());

        for &child in children.get(id).map_or(&[][..], Vec::as_slice) {
            let degree = in_degree
                .get_mut(child)
                .expect("child collected from the same summary set");
            *degree -= 1;
            if *degree == 0 {
                ready.insert((by_id[child].created_at_ms, child));
            }
        }
    }

    // A cycle cannot arise from an append-only commit store; if one ever
    // does, emit the leftovers deterministically rather than dropping them.
    if ordered.len() < summaries.len() {
        tracing::warn!(
            missing = summaries.len() - ordered.len(),
            "commit graph contains a parent cycle; appending leftover nodes"
        );
        let mut leftovers: Vec<&VariationSummary> = summaries
            .iter()
            .filter(|s| !emitted.contains(&s.variation_id))
            .collect();
        leftovers.sort_by(|a, b| {
            a.created_at_ms
                .cmp(&b.created_at_ms)
                .then_with(|| a.variation_id.cmp(&b.variation_id))
        });
        ordered.extend(leftovers.into_iter().cloned());
    }

    ordered
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
