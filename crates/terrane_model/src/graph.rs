//! The canonical resource graph.

use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexMap;
use petgraph::algo::{has_path_connecting, tarjan_scc};
use petgraph::graphmap::DiGraphMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dialect::Dialect;
use crate::edge::{DependencyEdge, EdgeKind, EdgeOrigin};
use crate::error::{ModelError, ModelResult};
use crate::inventory;
use crate::node::{AdvisoryHint, ResourceNode};
use crate::value::PropertyValue;

/// A dialect construct with no node equivalent, re-emitted verbatim
/// into the same dialect (Terraform `variable` blocks, CloudFormation
/// `Parameters`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassthroughBlock {
    pub dialect: Dialect,
    /// Construct name (`variable`, `Outputs`, ...)
    pub kind: String,
    pub text: String,
    /// Source file, relative to the tree root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl PassthroughBlock {
    pub fn new(dialect: Dialect, kind: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            dialect,
            kind: kind.into(),
            text: text.into(),
            file: None,
        }
    }

    pub fn in_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }
}

/// A broken structural invariant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "violation", rename_all = "kebab-case")]
pub enum InvariantViolation {
    /// An edge endpoint is not a node (a dangling marker when only the
    /// target is missing).
    DanglingEdge { edge: String, missing: String },
    /// A reference token without the matching depends-on edge.
    UnresolvedToken { node: String, target: String },
    /// A shared-definition use without a definition.
    UndefinedShared { node: String, name: String },
    MultipleParents { node: String, parents: Vec<String> },
    ContainsCycle { nodes: Vec<String> },
}

impl std::fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvariantViolation::DanglingEdge { edge, missing } => {
                write!(f, "edge {} points at missing node {}", edge, missing)
            }
            InvariantViolation::UnresolvedToken { node, target } => {
                write!(f, "reference in {} to {} has no depends-on edge", node, target)
            }
            InvariantViolation::UndefinedShared { node, name } => {
                write!(f, "{} uses undefined shared value {}", node, name)
            }
            InvariantViolation::MultipleParents { node, parents } => {
                write!(f, "{} is contained by {}", node, parents.join(", "))
            }
            InvariantViolation::ContainsCycle { nodes } => {
                write!(f, "contains cycle through {}", nodes.join(", "))
            }
        }
    }
}

/// Counts reported by `analyze`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSummary {
    pub dialect: Dialect,
    pub node_count: usize,
    pub edge_count: usize,
    pub types: BTreeMap<String, usize>,
    pub dangling_references: usize,
    pub definitions: usize,
    pub aliases: usize,
    pub passthrough_blocks: usize,
    /// Nodes per provider (`aws`, `google`, `kubernetes`, ...)
    #[serde(default)]
    pub providers: BTreeMap<String, usize>,
    /// Deployment environments named in the sources
    #[serde(default)]
    pub environments: Vec<String>,
}

/// Nodes, edges and graph-level data normalized from one source tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceGraph {
    dialect: Dialect,
    nodes: IndexMap<String, ResourceNode>,
    edges: Vec<DependencyEdge>,

    /// Shared reusable values, by name
    #[serde(default)]
    pub definitions: IndexMap<String, PropertyValue>,

    /// Removed id -> surviving id
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,

    #[serde(default)]
    pub passthrough: Vec<PassthroughBlock>,
}

impl ResourceGraph {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            nodes: IndexMap::new(),
            edges: Vec::new(),
            definitions: IndexMap::new(),
            aliases: BTreeMap::new(),
            passthrough: Vec::new(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn set_dialect(&mut self, dialect: Dialect) {
        self.dialect = dialect;
    }

    // ---- nodes ----

    pub fn add_node(&mut self, node: ResourceNode) -> ModelResult<()> {
        if self.nodes.contains_key(&node.id) {
            return Err(ModelError::DuplicateNode(node.id));
        }
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    /// Insert or replace, keeping the original position on replace.
    pub fn upsert_node(&mut self, node: ResourceNode) -> Option<ResourceNode> {
        self.nodes.insert(node.id.clone(), node)
    }

    pub fn node(&self, id: &str) -> Option<&ResourceNode> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut ResourceNode> {
        self.nodes.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ResourceNode> {
        self.nodes.values()
    }

    pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut ResourceNode> {
        self.nodes.values_mut()
    }

    pub fn node_ids(&self) -> Vec<String> {
        self.nodes.keys().cloned().collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Remove a node and every edge touching it.
    pub fn remove_node(&mut self, id: &str) -> Option<ResourceNode> {
        let removed = self.nodes.shift_remove(id)?;
        self.edges.retain(|e| e.source != id && e.target != id);
        Some(removed)
    }

    // ---- edges ----

    /// Add an edge, merging origins into an existing `(source, target, kind)`.
    /// Returns true when the edge is new.
    pub fn add_edge(&mut self, edge: DependencyEdge) -> bool {
        if let Some(existing) = self.edge_mut(&edge.source, &edge.target, edge.kind) {
            existing.origins.extend(edge.origins);
            return false;
        }
        self.edges.push(edge);
        true
    }

    pub fn connect(&mut self, source: &str, target: &str, kind: EdgeKind, origin: EdgeOrigin) -> bool {
        self.add_edge(DependencyEdge::new(source, target, kind, origin))
    }

    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn edge(&self, source: &str, target: &str, kind: EdgeKind) -> Option<&DependencyEdge> {
        self.edges
            .iter()
            .find(|e| e.source == source && e.target == target && e.kind == kind)
    }

    pub fn edge_mut(&mut self, source: &str, target: &str, kind: EdgeKind) -> Option<&mut DependencyEdge> {
        self.edges
            .iter_mut()
            .find(|e| e.source == source && e.target == target && e.kind == kind)
    }

    pub fn edges_from<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a DependencyEdge> + 'a {
        self.edges.iter().filter(move |e| e.source == id)
    }

    pub fn edges_to<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a DependencyEdge> + 'a {
        self.edges.iter().filter(move |e| e.target == id)
    }

    pub fn remove_edge(&mut self, source: &str, target: &str, kind: EdgeKind) -> Option<DependencyEdge> {
        let index = self
            .edges
            .iter()
            .position(|e| e.source == source && e.target == target && e.kind == kind)?;
        Some(self.edges.remove(index))
    }

    /// Containment parent, if any.
    pub fn parent_of(&self, id: &str) -> Option<&str> {
        self.edges
            .iter()
            .find(|e| e.kind == EdgeKind::Contains && e.target == id)
            .map(|e| e.source.as_str())
    }

    pub fn children_of(&self, id: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.kind == EdgeKind::Contains && e.source == id)
            .map(|e| e.target.as_str())
            .collect()
    }

    /// Depends-on targets of `id`, in edge order.
    pub fn dependencies_of(&self, id: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.kind == EdgeKind::DependsOn && e.source == id)
            .map(|e| e.target.as_str())
            .collect()
    }

    /// Edges whose target is not a node (dangling markers).
    pub fn dangling_edges(&self) -> Vec<&DependencyEdge> {
        self.edges
            .iter()
            .filter(|e| !self.nodes.contains_key(&e.target))
            .collect()
    }

    /// Materialize a reference-origin depends-on edge for every token.
    ///
    /// Returns `(node, target)` pairs whose target does not exist.
    pub fn derive_reference_edges(&mut self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        for node in self.nodes.values() {
            let mut seen = BTreeSet::new();
            for token in node.properties.values().flat_map(|v| v.references()) {
                if token.target != node.id && seen.insert(token.target.clone()) {
                    pairs.push((node.id.clone(), token.target.clone()));
                }
            }
        }

        let mut dangling = Vec::new();
        for (source, target) in pairs {
            if !self.nodes.contains_key(&target) {
                dangling.push((source.clone(), target.clone()));
            }
            self.connect(&source, &target, EdgeKind::DependsOn, EdgeOrigin::Reference);
        }
        dangling
    }

    // ---- rewrites ----

    /// Rename a node, rewriting edges, reference tokens, definitions and
    /// alias targets in one step. Nothing changes on error.
    pub fn rename_node(&mut self, old: &str, new: &str) -> ModelResult<()> {
        if !self.nodes.contains_key(old) {
            return Err(ModelError::NodeNotFound(old.to_string()));
        }
        if old == new {
            return Ok(());
        }
        if self.nodes.contains_key(new) {
            return Err(ModelError::DuplicateNode(new.to_string()));
        }

        let nodes = std::mem::take(&mut self.nodes);
        self.nodes = nodes
            .into_iter()
            .map(|(id, mut node)| {
                if id == old {
                    node.id = new.to_string();
                    (new.to_string(), node)
                } else {
                    (id, node)
                }
            })
            .collect();

        self.retarget_everything(old, new);
        debug!("Renamed node {} -> {}", old, new);
        Ok(())
    }

    /// Remove `removed` and point everything that referred to it at
    /// `survivor`, recording the alias.
    pub fn redirect_node(&mut self, removed: &str, survivor: &str) -> ModelResult<()> {
        if !self.nodes.contains_key(survivor) {
            return Err(ModelError::NodeNotFound(survivor.to_string()));
        }
        let node = self
            .nodes
            .shift_remove(removed)
            .ok_or_else(|| ModelError::NodeNotFound(removed.to_string()))?;

        if let Some(target) = self.nodes.get_mut(survivor) {
            for hint in node.hints {
                if !target.hints.contains(&hint) {
                    target.hints.push(hint);
                }
            }
        }

        self.retarget_everything(removed, survivor);
        self.aliases.insert(removed.to_string(), survivor.to_string());
        debug!("Redirected node {} -> {}", removed, survivor);
        Ok(())
    }

    fn retarget_everything(&mut self, old: &str, new: &str) {
        let edges = std::mem::take(&mut self.edges);
        for mut edge in edges {
            if edge.source == old {
                edge.source = new.to_string();
            }
            if edge.target == old {
                edge.target = new.to_string();
            }
            if edge.source == edge.target {
                continue;
            }
            self.add_edge(edge);
        }

        for node in self.nodes.values_mut() {
            for value in node.properties.values_mut() {
                value.retarget(old, new);
            }
        }
        for value in self.definitions.values_mut() {
            value.retarget(old, new);
        }
        for target in self.aliases.values_mut() {
            if target == old {
                *target = new.to_string();
            }
        }
    }

    /// Follow the alias chain to the current id.
    pub fn resolve_alias<'a>(&'a self, id: &'a str) -> &'a str {
        let mut current = id;
        let mut hops = 0;
        while let Some(next) = self.aliases.get(current) {
            current = next;
            hops += 1;
            if hops > self.aliases.len() {
                break;
            }
        }
        current
    }

    /// Attach advisory hints. Unknown node ids are skipped.
    pub fn merge_hints(&mut self, hints: Vec<(String, String)>, source: Option<&str>) -> usize {
        let mut merged = 0;
        for (node_id, text) in hints {
            let id = self.resolve_alias(&node_id).to_string();
            if let Some(node) = self.nodes.get_mut(&id) {
                let hint = AdvisoryHint {
                    text,
                    source: source.map(str::to_string),
                };
                if !node.hints.contains(&hint) {
                    node.hints.push(hint);
                    merged += 1;
                }
            }
        }
        merged
    }

    // ---- checks ----

    /// Structural invariants. Depends-on cycles are allowed here; the
    /// validator reports them.
    pub fn check_invariants(&self) -> Vec<InvariantViolation> {
        let mut violations = Vec::new();

        for edge in &self.edges {
            for endpoint in [&edge.source, &edge.target] {
                if !self.nodes.contains_key(endpoint) {
                    violations.push(InvariantViolation::DanglingEdge {
                        edge: edge.id(),
                        missing: endpoint.clone(),
                    });
                }
            }
        }

        for node in self.nodes.values() {
            for value in node.properties.values() {
                for token in value.references() {
                    if token.target != node.id
                        && self.edge(&node.id, &token.target, EdgeKind::DependsOn).is_none()
                    {
                        violations.push(InvariantViolation::UnresolvedToken {
                            node: node.id.clone(),
                            target: token.target.clone(),
                        });
                    }
                }
                collect_shared(value, &mut |name| {
                    if !self.definitions.contains_key(name) {
                        violations.push(InvariantViolation::UndefinedShared {
                            node: node.id.clone(),
                            name: name.to_string(),
                        });
                    }
                });
            }
        }

        let mut parents: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for edge in self.edges.iter().filter(|e| e.kind == EdgeKind::Contains) {
            parents.entry(edge.target.as_str()).or_default().push(edge.source.clone());
        }
        for (node, mut sources) in parents {
            if sources.len() > 1 {
                sources.sort();
                violations.push(InvariantViolation::MultipleParents {
                    node: node.to_string(),
                    parents: sources,
                });
            }
        }

        for nodes in self.cycles(EdgeKind::Contains) {
            violations.push(InvariantViolation::ContainsCycle { nodes });
        }

        violations.sort();
        violations.dedup();
        violations
    }

    /// Strongly connected components forming cycles over `kind` edges,
    /// each sorted, the list sorted.
    pub fn cycles(&self, kind: EdgeKind) -> Vec<Vec<String>> {
        let graph = self.edge_graph(kind);
        let mut cycles: Vec<Vec<String>> = tarjan_scc(&graph)
            .into_iter()
            .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
            .map(|scc| {
                let mut ids: Vec<String> = scc.into_iter().map(str::to_string).collect();
                ids.sort();
                ids
            })
            .collect();
        cycles.sort();
        cycles
    }

    /// Whether `target` is reachable from `source` over `kind` edges,
    /// ignoring the direct edge `(skip_source, skip_target)` when given.
    pub fn reachable(&self, source: &str, target: &str, kind: EdgeKind, skip: Option<(&str, &str)>) -> bool {
        let mut graph = self.edge_graph(kind);
        if let Some((a, b)) = skip {
            graph.remove_edge(a, b);
        }
        if !graph.contains_node(source) || !graph.contains_node(target) {
            return false;
        }
        has_path_connecting(&graph, source, target, None)
    }

    fn edge_graph(&self, kind: EdgeKind) -> DiGraphMap<&str, ()> {
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for id in self.nodes.keys() {
            graph.add_node(id.as_str());
        }
        for edge in self.edges.iter().filter(|e| e.kind == kind) {
            graph.add_edge(edge.source.as_str(), edge.target.as_str(), ());
        }
        graph
    }

    pub fn summary(&self) -> GraphSummary {
        let mut types = BTreeMap::new();
        for node in self.nodes.values() {
            *types.entry(node.resource_type.clone()).or_insert(0) += 1;
        }
        GraphSummary {
            dialect: self.dialect,
            node_count: self.nodes.len(),
            edge_count: self.edges.len(),
            types,
            dangling_references: self.dangling_edges().len(),
            definitions: self.definitions.len(),
            aliases: self.aliases.len(),
            passthrough_blocks: self.passthrough.len(),
            providers: inventory::providers(self),
            environments: inventory::environments(self),
        }
    }

    /// Order-insensitive equality of nodes (type, properties, metadata),
    /// edges and definitions. Ignores origins, hints and the dialect tag.
    pub fn structurally_equal(&self, other: &ResourceGraph) -> bool {
        self.structural_diff(other).is_empty()
    }

    /// Human-readable differences, empty when structurally equal.
    pub fn structural_diff(&self, other: &ResourceGraph) -> Vec<String> {
        let mut diffs = Vec::new();

        for node in self.nodes.values() {
            match other.nodes.get(&node.id) {
                None => diffs.push(format!("node {} missing on right", node.id)),
                Some(o) if !node.same_content(o) => {
                    if node.resource_type != o.resource_type {
                        diffs.push(format!(
                            "node {} type {} != {}",
                            node.id, node.resource_type, o.resource_type
                        ));
                    }
                    if node.properties != o.properties {
                        diffs.push(format!("node {} properties differ", node.id));
                    }
                    if node.metadata != o.metadata {
                        diffs.push(format!("node {} metadata differ", node.id));
                    }
                }
                Some(_) => {}
            }
        }
        for id in other.nodes.keys() {
            if !self.nodes.contains_key(id) {
                diffs.push(format!("node {} missing on left", id));
            }
        }

        let left: BTreeMap<_, _> = self.edges.iter().map(|e| (e.key(), &e.origins)).collect();
        let right: BTreeMap<_, _> = other.edges.iter().map(|e| (e.key(), &e.origins)).collect();
        if left != right {
            for (key, origins) in &left {
                if right.get(key) != Some(origins) {
                    diffs.push(format!("edge {} -> {} ({}) differs", key.0, key.1, key.2));
                }
            }
            for key in right.keys() {
                if !left.contains_key(key) {
                    diffs.push(format!("edge {} -> {} ({}) missing on left", key.0, key.1, key.2));
                }
            }
        }

        let left_defs: BTreeMap<_, _> = self.definitions.iter().collect();
        let right_defs: BTreeMap<_, _> = other.definitions.iter().collect();
        if left_defs != right_defs {
            diffs.push("definitions differ".to_string());
        }

        diffs
    }
}

fn collect_shared(value: &PropertyValue, f: &mut dyn FnMut(&str)) {
    match value {
        PropertyValue::Shared(name) => f(name),
        PropertyValue::List(items) => items.iter().for_each(|v| collect_shared(v, f)),
        PropertyValue::Map(map) => map.values().for_each(|v| collect_shared(v, f)),
        _ => {}
    }
}
