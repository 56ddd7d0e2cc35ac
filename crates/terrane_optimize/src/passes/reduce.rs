//! Drop redundant dependency information.

use terrane_model::{EdgeKind, EdgeOrigin, ResourceGraph};
use tracing::debug;

use super::OptimizationPass;
use crate::change::{OptimizationChange, PassKind};
use crate::error::OptimizeResult;

/// Two rewrites over depends-on edges:
///
/// - an `explicit` origin is dropped when the same edge is also carried by a
///   reference, since the reference already orders the two nodes;
/// - an edge whose only origin is `ordering` is removed when its target is
///   still reachable through other edges.
///
/// An edge whose only origin is `explicit` is never touched.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReduceDependencies;

impl ReduceDependencies {
    fn redundant_explicit(graph: &ResourceGraph) -> Vec<(String, String)> {
        graph
            .edges()
            .iter()
            .filter(|e| {
                e.kind == EdgeKind::DependsOn
                    && e.has_origin(EdgeOrigin::Explicit)
                    && e.has_origin(EdgeOrigin::Reference)
                    && graph.contains(&e.target)
            })
            .map(|e| (e.source.clone(), e.target.clone()))
            .collect()
    }

    fn ordering_only(graph: &ResourceGraph) -> Vec<(String, String)> {
        let mut edges: Vec<(String, String)> = graph
            .edges()
            .iter()
            .filter(|e| e.kind == EdgeKind::DependsOn && e.is_only(EdgeOrigin::Ordering))
            .map(|e| (e.source.clone(), e.target.clone()))
            .collect();
        edges.sort();
        edges
    }
}

impl OptimizationPass for ReduceDependencies {
    fn kind(&self) -> PassKind {
        PassKind::ReduceDependencies
    }

    fn run(&self, graph: &mut ResourceGraph) -> OptimizeResult<Vec<OptimizationChange>> {
        let mut changes = Vec::new();

        for (source, target) in Self::redundant_explicit(graph) {
            if let Some(edge) = graph.edge_mut(&source, &target, EdgeKind::DependsOn) {
                edge.origins.remove(&EdgeOrigin::Explicit);
                debug!("Dropped explicit origin of {} -> {}", source, target);
                changes.push(
                    OptimizationChange::applied(
                        self.kind(),
                        format!("explicit dependency {} -> {} is implied by a reference", source, target),
                    )
                    .with_nodes(vec![source, target]),
                );
            }
        }

        // one edge at a time, so two edges never justify each other's removal
        for (source, target) in Self::ordering_only(graph) {
            if graph.reachable(&source, &target, EdgeKind::DependsOn, Some((&source, &target))) {
                graph.remove_edge(&source, &target, EdgeKind::DependsOn);
                debug!("Removed transitive ordering edge {} -> {}", source, target);
                changes.push(
                    OptimizationChange::applied(
                        self.kind(),
                        format!("ordering edge {} -> {} is implied transitively", source, target),
                    )
                    .with_nodes(vec![source, target]),
                );
            }
        }

        Ok(changes)
    }
}
