//! Commit-graph rendering: ASCII graph log and pretty JSON.
//!
//! Pure presentation over [`CommitGraph`] — nothing here affects the
//! ordering contract of [`super::build`].
//!
//! The ASCII log prints newest-first, one column per open lineage:
//!
//! ```text
//! *   4fe21c88 merge bridge comp (HEAD)
//! |\
//! | * 9ad01b2e brighten bridge
//! * | 66fa03c1 thin verse chords
//! |/
//! * 1c90aa72 initial sketch
//! ```
//!
//! A merge commit opens a new column for its second parent, or draws a
//! convergence mark when that parent's column already exists; columns
//! close once their lineage is fully consumed and duplicates compact with
//! a `/` row.

use super::build::CommitGraph;
use crate::model::VariationId;

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

/// Render the graph as pretty JSON, nodes in topological order.
///
/// # Errors
/// Serialization cannot realistically fail for these types; any
/// `serde_json` error is propagated verbatim.
pub fn render_json(graph: &CommitGraph) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(graph)
}

// ---------------------------------------------------------------------------
// ASCII graph log
// ---------------------------------------------------------------------------

/// Render the graph as an ASCII log, newest commit first.
#[must_use]
pub fn render_ascii(graph: &CommitGraph) -> String {
    let mut columns: Vec<VariationId> = Vec::new();
    let mut out = String::new();

    for node in graph.nodes.iter().rev() {
        let col = match columns.iter().position(|c| c == &node.id) {
            Some(col) => col,
            None => {
                // A tip (or the newest node of a side branch) opens its own
                // column.
                columns.push(node.id.clone());
                columns.len() - 1
            }
        };

        // Marker row: '*' in this node's column, bars elsewhere.
        let mut row = String::new();
        for i in 0..columns.len() {
            row.push(if i == col { '*' } else { '|' });
            row.push(' ');
        }
        let mut line = format!("{row}  {}", node.id.short());
        if !node.intent.is_empty() {
            line.push(' ');
            line.push_str(&node.intent);
        }
        if node.is_head {
            line.push_str(" (HEAD)");
        }
        out.push_str(line.trim_end());
        out.push('\n');

        // Substitute this column with the first parent; a root closes it.
        match &node.parent {
            Some(parent) => columns[col] = parent.clone(),
            None => {
                columns.remove(col);
            }
        }

        // Second parent: open a new column, or mark convergence if some
        // open lineage already expects it.
        if let Some(p2) = &node.parent2 {
            if columns.iter().any(|c| c == p2) {
                out.push_str(&connector_row(columns.len(), col.min(columns.len()), '/'));
            } else {
                let insert_at = (col + 1).min(columns.len());
                columns.insert(insert_at, p2.clone());
                out.push_str(&connector_row(columns.len(), insert_at, '\\'));
            }
        }

        // Compact lineages that converged on the same expected commit.
        loop {
            let dup = duplicate_column(&columns);
            match dup {
                Some(idx) => {
                    columns.remove(idx);
                    out.push_str(&connector_row(columns.len() + 1, idx, '/'));
                }
                None => break,
            }
        }
    }

    out
}

/// A row of bars with one connector mark at `mark_at`.
fn connector_row(width: usize, mark_at: usize, mark: char) -> String {
    let mut row = String::new();
    for i in 0..width {
        row.push(if i == mark_at { mark } else { '|' });
        row.push(' ');
    }
    let mut line = row.trim_end().to_owned();
    line.push('\n');
    line
}

/// Index of the rightmost column duplicating an earlier one, if any.
fn duplicate_column(columns: &[VariationId]) -> Option<usize> {
    for j in (1..columns.len()).rev() {
        if columns[..j].contains(&columns[j]) {
            return Some(j);
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
