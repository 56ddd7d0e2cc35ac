//! Hoist repeated literals into shared definitions.

use std::collections::BTreeMap;

use terrane_model::{PropertyValue, ResourceGraph, PLAY_TYPE};
use tracing::debug;

use super::OptimizationPass;
use crate::change::{OptimizationChange, PassKind};
use crate::error::OptimizeResult;

/// Top-level string literals used by at least `min_nodes` nodes become one
/// shared definition each, named after the first property using them.
///
/// Only runs for dialects that can express shared definitions. Opaque
/// nodes and plays keep their literals.
#[derive(Debug, Clone, Copy)]
pub struct HoistLiterals {
    pub min_nodes: usize,
}

impl Default for HoistLiterals {
    fn default() -> Self {
        Self { min_nodes: 2 }
    }
}

/// A literal and where it appears.
struct Candidate {
    /// First property name using the literal, in graph order
    name: String,
    uses: Vec<(String, String)>,
}

impl HoistLiterals {
    pub fn new(min_nodes: usize) -> Self {
        Self {
            min_nodes: min_nodes.max(2),
        }
    }

    fn candidates(&self, graph: &ResourceGraph) -> Vec<(String, Candidate)> {
        let mut by_value: BTreeMap<String, Candidate> = BTreeMap::new();
        let mut order = Vec::new();
        for node in graph.nodes() {
            if node.is_opaque() || node.resource_type == PLAY_TYPE {
                continue;
            }
            for (name, value) in &node.properties {
                let PropertyValue::String(literal) = value else {
                    continue;
                };
                if literal.trim().is_empty() || literal.contains("{{") {
                    continue;
                }
                let candidate = by_value.entry(literal.clone()).or_insert_with(|| {
                    order.push(literal.clone());
                    Candidate {
                        name: name.clone(),
                        uses: Vec::new(),
                    }
                });
                candidate.uses.push((node.id.clone(), name.clone()));
            }
        }

        order
            .into_iter()
            .filter_map(|literal| by_value.remove(&literal).map(|c| (literal, c)))
            .filter(|(_, candidate)| {
                let mut nodes: Vec<&str> = candidate.uses.iter().map(|(id, _)| id.as_str()).collect();
                nodes.dedup();
                nodes.len() >= self.min_nodes
            })
            .collect()
    }
}

/// Definition name for `literal`: an existing definition with the same
/// value, else `base`, else `base_2`, `base_3`, ...
fn definition_name(graph: &ResourceGraph, base: &str, literal: &str) -> String {
    let value = PropertyValue::String(literal.to_string());
    if let Some((name, _)) = graph.definitions.iter().find(|(_, v)| **v == value) {
        return name.clone();
    }
    let base = base.replace(['-', '.'], "_");
    let mut name = base.clone();
    let mut n = 2;
    while graph.definitions.contains_key(&name) {
        name = format!("{}_{}", base, n);
        n += 1;
    }
    name
}

impl OptimizationPass for HoistLiterals {
    fn kind(&self) -> PassKind {
        PassKind::HoistLiterals
    }

    fn run(&self, graph: &mut ResourceGraph) -> OptimizeResult<Vec<OptimizationChange>> {
        if !graph.dialect().supports_shared_definitions() {
            debug!("{} cannot express shared definitions; nothing hoisted", graph.dialect());
            return Ok(Vec::new());
        }

        let mut changes = Vec::new();
        for (literal, candidate) in self.candidates(graph) {
            let name = definition_name(graph, &candidate.name, &literal);
            graph
                .definitions
                .insert(name.clone(), PropertyValue::String(literal.clone()));

            let mut nodes = Vec::new();
            for (id, property) in &candidate.uses {
                if let Some(node) = graph.node_mut(id) {
                    node.properties.insert(property.clone(), PropertyValue::Shared(name.clone()));
                }
                if !nodes.contains(id) {
                    nodes.push(id.clone());
                }
            }
            debug!("Hoisted {:?} into shared definition {}", literal, name);
            changes.push(
                OptimizationChange::applied(
                    self.kind(),
                    format!("hoisted \"{}\" used by {} nodes into {}", literal, nodes.len(), name),
                )
                .with_nodes(nodes),
            );
        }
        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use terrane_model::{Dialect, ResourceNode};

    fn graph(dialect: Dialect) -> ResourceGraph {
        let mut graph = ResourceGraph::new(dialect);
        let subnets = [
            ("aws_subnet.a", "eu-west-1a", "10.0.1.0/24"),
            ("aws_subnet.b", "eu-west-1a", "10.0.2.0/24"),
            ("aws_subnet.c", "eu-west-1b", "10.0.3.0/24"),
        ];
        for (id, zone, cidr) in subnets {
            graph
                .add_node(
                    ResourceNode::new(id, "network.subnet")
                        .with_property("availability_zone", zone.into())
                        .with_property("cidr_block", cidr.into()),
                )
                .unwrap();
        }
        graph
    }

    #[test]
    fn test_repeated_literals_become_definitions() {
        let mut graph = graph(Dialect::Terraform);
        let changes = HoistLiterals::default().run(&mut graph).unwrap();

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].nodes, vec!["aws_subnet.a", "aws_subnet.b"]);
        assert_eq!(
            graph.definitions.get("availability_zone"),
            Some(&PropertyValue::from("eu-west-1a"))
        );
        let a = graph.node("aws_subnet.a").unwrap();
        assert_eq!(
            a.property("availability_zone"),
            Some(&PropertyValue::Shared("availability_zone".into()))
        );
        let c = graph.node("aws_subnet.c").unwrap();
        assert_eq!(c.property_str("availability_zone"), Some("eu-west-1b"));
        assert!(graph.check_invariants().is_empty());

        assert!(HoistLiterals::default().run(&mut graph).unwrap().is_empty());
    }

    #[test]
    fn test_names_do_not_collide() {
        let mut graph = graph(Dialect::CloudFormation);
        graph
            .definitions
            .insert("availability_zone".into(), PropertyValue::from("us-east-1a"));
        HoistLiterals::default().run(&mut graph).unwrap();
        assert_eq!(
            graph.definitions.get("availability_zone_2"),
            Some(&PropertyValue::from("eu-west-1a"))
        );
    }

    #[test]
    fn test_existing_definition_is_reused() {
        let mut graph = graph(Dialect::Ansible);
        graph.definitions.insert("zone".into(), PropertyValue::from("eu-west-1a"));
        HoistLiterals::default().run(&mut graph).unwrap();
        let b = graph.node("aws_subnet.b").unwrap();
        assert_eq!(b.property("availability_zone"), Some(&PropertyValue::Shared("zone".into())));
    }

    #[test]
    fn test_kubernetes_is_left_alone() {
        let mut graph = graph(Dialect::Kubernetes);
        assert!(HoistLiterals::default().run(&mut graph).unwrap().is_empty());
        assert!(graph.definitions.is_empty());
    }

    #[test]
    fn test_threshold() {
        let mut graph = graph(Dialect::Terraform);
        assert!(HoistLiterals::new(4).run(&mut graph).unwrap().is_empty());
    }
}
