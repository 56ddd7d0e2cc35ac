//! Graph shape rules: closure, containment forest, cycles and schema.

use std::collections::BTreeMap;

use terrane_model::{EdgeKind, FindingTarget, PropertyValue, ResourceGraph, TypeSchema, ValidationFinding, PLAY_TYPE};

use crate::error::PolicyResult;
use crate::rule::ValidationRule;

/// A depends-on or contains edge whose target node does not exist.
pub struct DanglingReference;

impl ValidationRule for DanglingReference {
    rule_identity!(
        "structural.dangling-reference",
        Structural,
        Error,
        "Every referenced resource must be declared"
    );

    fn evaluate(&self, graph: &ResourceGraph) -> PolicyResult<Vec<ValidationFinding>> {
        Ok(graph
            .dangling_edges()
            .into_iter()
            .map(|edge| {
                self.finding(
                    FindingTarget::edge(&edge.source, &edge.target, edge.kind),
                    format!("{} {} {}, which is not declared", edge.source, edge.kind, edge.target),
                )
            })
            .collect())
    }
}

pub struct ContainsCycle;

impl ValidationRule for ContainsCycle {
    rule_identity!(
        "structural.contains-cycle",
        Structural,
        Error,
        "Containment must form a forest"
    );

    fn evaluate(&self, graph: &ResourceGraph) -> PolicyResult<Vec<ValidationFinding>> {
        Ok(graph
            .cycles(EdgeKind::Contains)
            .into_iter()
            .map(|cycle| {
                self.finding(
                    FindingTarget::node(&cycle[0]),
                    format!("containment cycle through {}", cycle.join(", ")),
                )
            })
            .collect())
    }
}

pub struct MultipleParents;

impl ValidationRule for MultipleParents {
    rule_identity!(
        "structural.multiple-parents",
        Structural,
        Error,
        "A resource has at most one containing parent"
    );

    fn evaluate(&self, graph: &ResourceGraph) -> PolicyResult<Vec<ValidationFinding>> {
        let mut parents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for edge in graph.edges().iter().filter(|e| e.kind == EdgeKind::Contains) {
            parents.entry(edge.target.as_str()).or_default().push(edge.source.as_str());
        }

        Ok(parents
            .into_iter()
            .filter(|(_, sources)| sources.len() > 1)
            .map(|(node, mut sources)| {
                sources.sort();
                self.finding(
                    FindingTarget::node(node),
                    format!("contained by {} parents: {}", sources.len(), sources.join(", ")),
                )
            })
            .collect())
    }
}

pub struct DependencyCycle;

impl ValidationRule for DependencyCycle {
    rule_identity!(
        "structural.dependency-cycle",
        Structural,
        Error,
        "Depends-on edges must not form a cycle"
    );

    fn evaluate(&self, graph: &ResourceGraph) -> PolicyResult<Vec<ValidationFinding>> {
        Ok(graph
            .cycles(EdgeKind::DependsOn)
            .into_iter()
            .map(|cycle| {
                self.finding(
                    FindingTarget::node(&cycle[0]),
                    format!("dependency cycle through {}", cycle.join(", ")),
                )
            })
            .collect())
    }
}

/// Required schema properties. Opaque nodes have no schema and plays are
/// grouping nodes, so both are skipped.
pub struct MissingRequiredProperty;

impl ValidationRule for MissingRequiredProperty {
    rule_identity!(
        "structural.missing-required-property",
        Structural,
        Warning,
        "Resources declare every property their type requires"
    );

    fn evaluate(&self, graph: &ResourceGraph) -> PolicyResult<Vec<ValidationFinding>> {
        let mut findings = Vec::new();
        for node in graph.nodes() {
            if node.is_opaque() || node.resource_type == PLAY_TYPE {
                continue;
            }
            let Some(schema) = TypeSchema::get(&node.resource_type) else {
                continue;
            };
            for name in schema.required() {
                if matches!(node.property(name), None | Some(PropertyValue::Null)) {
                    findings.push(self.finding(
                        FindingTarget::node(&node.id),
                        format!("{} requires property {}", node.resource_type, name),
                    ));
                }
            }
        }
        Ok(findings)
    }
}

pub struct OpaqueResource;

impl ValidationRule for OpaqueResource {
    rule_identity!(
        "structural.opaque-resource",
        Structural,
        Info,
        "Resources of unmapped types are carried verbatim"
    );

    fn evaluate(&self, graph: &ResourceGraph) -> PolicyResult<Vec<ValidationFinding>> {
        Ok(graph
            .nodes()
            .filter(|node| node.is_opaque())
            .map(|node| {
                let native = node.metadata.native_type().unwrap_or(node.resource_type.as_str());
                self.finding(
                    FindingTarget::node(&node.id),
                    format!("type {} has no canonical mapping and is kept verbatim", native),
                )
            })
            .collect())
    }
}
