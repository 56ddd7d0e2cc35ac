//! Merging per-file fragments into one graph.

use std::collections::BTreeSet;

use terrane_dialects::metadata::{CFN_SHARED_KEY, CFN_SHARED_MAPPING};
use terrane_model::{
    Dialect, EdgeKind, EdgeOrigin, NativeExpression, NormalizationWarning, ParseError, PropertyValue, ResourceGraph, WarningKind,
};
use tracing::{debug, warn};

use crate::fragment::{Fragment, PendingEdge};
use crate::{ansible, kubernetes};

/// Result of merging fragments.
#[derive(Debug, Clone)]
pub struct Merged {
    pub graph: ResourceGraph,
    pub warnings: Vec<NormalizationWarning>,
    pub errors: Vec<ParseError>,
}

/// Outgoing pending edges of `id`.
fn edges_from<'a>(edges: impl IntoIterator<Item = &'a PendingEdge>, id: &str) -> BTreeSet<(String, EdgeKind, EdgeOrigin)> {
    edges
        .into_iter()
        .filter(|e| e.source == id)
        .map(|e| (e.target.clone(), e.kind, e.origin))
        .collect()
}

/// Merge fragments in path order. Identical redeclarations merge
/// silently; conflicting ones warn and the later file wins, edges
/// included.
pub fn merge(dialect: Dialect, mut fragments: Vec<Fragment>) -> Merged {
    fragments.sort_by(|a, b| a.file.cmp(&b.file));

    let mut graph = ResourceGraph::new(dialect);
    let mut warnings = Vec::new();
    let mut errors = Vec::new();
    let mut pending: Vec<PendingEdge> = Vec::new();

    for fragment in fragments {
        for node in fragment.nodes {
            let same_edges = || edges_from(&pending, &node.id) == edges_from(&fragment.edges, &node.id);
            match graph.node(&node.id) {
                Some(existing) if existing.same_content(&node) && same_edges() => {
                    debug!("Duplicate declaration of {} in {} merged", node.id, fragment.file);
                }
                Some(_) => {
                    warnings.push(
                        NormalizationWarning::new(
                            WarningKind::ConflictingDeclaration,
                            format!("{} is declared again with different content; the later declaration wins", node.id),
                        )
                        .for_node(node.id.clone())
                        .in_file(fragment.file.clone()),
                    );
                    pending.retain(|e| e.source != node.id);
                    graph.upsert_node(node);
                }
                None => {
                    graph.upsert_node(node);
                }
            }
        }

        for (name, value) in fragment.definitions {
            match graph.definitions.get(&name) {
                Some(existing) if *existing == value => {}
                Some(_) => {
                    warnings.push(
                        NormalizationWarning::new(
                            WarningKind::ConflictingDeclaration,
                            format!("shared value {} is defined again with a different value", name),
                        )
                        .in_file(fragment.file.clone()),
                    );
                    graph.definitions.insert(name, value);
                }
                None => {
                    graph.definitions.insert(name, value);
                }
            }
        }

        graph.aliases.extend(fragment.aliases);
        graph.passthrough.extend(fragment.passthrough);
        warnings.extend(fragment.warnings);
        errors.extend(fragment.errors);
        pending.extend(fragment.edges);
    }

    match dialect {
        Dialect::Kubernetes => kubernetes::resolve(&mut graph),
        Dialect::Ansible => ansible::resolve(&mut graph),
        Dialect::Terraform | Dialect::CloudFormation => {}
    }

    undefined_shared(&mut graph, &mut warnings);
    prune_expression_tokens(&mut graph);
    connect_pending(&mut graph, pending, &mut warnings);

    for (source, target) in graph.derive_reference_edges() {
        warn!("Dangling reference from {} to {}", source, target);
        warnings.push(
            NormalizationWarning::new(
                WarningKind::DanglingReference,
                format!("{} references {} which is not declared", source, target),
            )
            .for_node(source),
        );
    }

    Merged {
        graph,
        warnings,
        errors,
    }
}

/// Native spelling of a shared value use that has no definition.
fn shared_expression(dialect: Dialect, name: &str) -> String {
    match dialect {
        Dialect::Terraform => format!("local.{}", name),
        Dialect::CloudFormation => serde_json::json!({
            "Fn::FindInMap": [CFN_SHARED_MAPPING, CFN_SHARED_KEY, name]
        })
        .to_string(),
        Dialect::Ansible => format!("{{{{ {} }}}}", name),
        Dialect::Kubernetes => name.to_string(),
    }
}

fn undefined_shared(graph: &mut ResourceGraph, warnings: &mut Vec<NormalizationWarning>) {
    let dialect = graph.dialect();
    let defined: Vec<String> = graph.definitions.keys().cloned().collect();
    for node in graph.nodes_mut() {
        let mut missing = Vec::new();
        for value in node.properties.values_mut() {
            demote_shared(value, dialect, &defined, &mut missing);
        }
        for name in missing {
            warnings.push(
                NormalizationWarning::new(
                    WarningKind::DanglingReference,
                    format!("shared value {} is not defined; kept as a native expression", name),
                )
                .for_node(node.id.clone()),
            );
        }
    }
}

fn demote_shared(value: &mut PropertyValue, dialect: Dialect, defined: &[String], missing: &mut Vec<String>) {
    match value {
        PropertyValue::Shared(name) if !defined.contains(name) => {
            missing.push(name.clone());
            *value = PropertyValue::Expression(NativeExpression::new(dialect, shared_expression(dialect, name)));
        }
        PropertyValue::List(items) => {
            for item in items {
                demote_shared(item, dialect, defined, missing);
            }
        }
        PropertyValue::Map(map) => {
            for item in map.values_mut() {
                demote_shared(item, dialect, defined, missing);
            }
        }
        _ => {}
    }
}

/// Tokens scanned out of expression text only count when they name a
/// declared node.
fn prune_expression_tokens(graph: &mut ResourceGraph) {
    let ids = graph.node_ids();
    for node in graph.nodes_mut() {
        for value in node.properties.values_mut() {
            prune(value, &ids);
        }
    }
}

fn prune(value: &mut PropertyValue, ids: &[String]) {
    match value {
        PropertyValue::Expression(expr) => expr.references.retain(|token| ids.contains(&token.target)),
        PropertyValue::List(items) => {
            for item in items {
                prune(item, ids);
            }
        }
        PropertyValue::Map(map) => {
            for item in map.values_mut() {
                prune(item, ids);
            }
        }
        _ => {}
    }
}

fn connect_pending(graph: &mut ResourceGraph, pending: Vec<PendingEdge>, warnings: &mut Vec<NormalizationWarning>) {
    for edge in pending {
        if edge.source == edge.target || !graph.contains(&edge.source) {
            continue;
        }
        if !graph.contains(&edge.target) {
            if edge.optional {
                continue;
            }
            warnings.push(
                NormalizationWarning::new(
                    WarningKind::DanglingReference,
                    format!(
                        "{} {} {} which is not declared",
                        edge.source,
                        edge.kind.as_str(),
                        edge.target
                    ),
                )
                .for_node(edge.source.clone()),
            );
        }
        graph.connect(&edge.source, &edge.target, edge.kind, edge.origin);
    }
}
