//! Merge resources that are identical apart from their id.

use std::collections::BTreeSet;

use terrane_model::{EdgeKind, EdgeOrigin, ResourceGraph, ResourceNode};
use tracing::debug;

use super::OptimizationPass;
use crate::change::{OptimizationChange, PassKind};
use crate::error::OptimizeResult;

/// Nodes with the same type, properties, metadata, containment parent and
/// outgoing edges collapse into the one with the smallest id. Edges and tokens move to the
/// survivor and the removed id is recorded as an alias.
///
/// Nodes on an ordering chain keep their position in the sequence, so they
/// are never merged.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeDuplicates;

impl MergeDuplicates {
    fn sequenced(graph: &ResourceGraph, id: &str) -> bool {
        graph
            .edges()
            .iter()
            .any(|e| e.kind == EdgeKind::DependsOn && e.has_origin(EdgeOrigin::Ordering) && (e.source == id || e.target == id))
    }

    fn outgoing(graph: &ResourceGraph, id: &str) -> BTreeSet<(String, EdgeKind, Vec<EdgeOrigin>)> {
        graph
            .edges()
            .iter()
            .filter(|e| e.source == id)
            .map(|e| (e.target.clone(), e.kind, e.origins.iter().copied().collect()))
            .collect()
    }

    fn duplicates(graph: &ResourceGraph, survivor: &ResourceNode, other: &ResourceNode) -> bool {
        survivor.same_content(other)
            && graph.parent_of(&survivor.id) == graph.parent_of(&other.id)
            && Self::outgoing(graph, &survivor.id) == Self::outgoing(graph, &other.id)
    }

    /// One `(survivor, removed)` pair, smallest ids first.
    fn next_pair(graph: &ResourceGraph) -> Option<(String, String)> {
        let mut ids = graph.node_ids();
        ids.sort();
        ids.retain(|id| !Self::sequenced(graph, id));

        for (i, survivor_id) in ids.iter().enumerate() {
            let survivor = graph.node(survivor_id)?;
            for other_id in &ids[i + 1..] {
                let other = graph.node(other_id)?;
                if Self::duplicates(graph, survivor, other) {
                    return Some((survivor_id.clone(), other_id.clone()));
                }
            }
        }
        None
    }
}

impl OptimizationPass for MergeDuplicates {
    fn kind(&self) -> PassKind {
        PassKind::MergeDuplicates
    }

    fn run(&self, graph: &mut ResourceGraph) -> OptimizeResult<Vec<OptimizationChange>> {
        let mut changes = Vec::new();
        // a merge can make two dependents identical, so repeat to a fixpoint
        while let Some((survivor, removed)) = Self::next_pair(graph) {
            graph.redirect_node(&removed, &survivor)?;
            debug!("Merged duplicate {} into {}", removed, survivor);
            changes.push(
                OptimizationChange::applied(
                    self.kind(),
                    format!("merged {} into identical {}", removed, survivor),
                )
                .with_nodes(vec![survivor, removed]),
            );
        }
        Ok(changes)
    }
}
