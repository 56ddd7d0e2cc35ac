//! Per-file normalization output, merged into one graph afterwards.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use terrane_model::{
    EdgeKind, EdgeOrigin, NormalizationWarning, ParseError, PassthroughBlock, PropertyValue, ResourceNode,
    WarningKind,
};

/// An edge recorded before every node is known.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingEdge {
    pub source: String,
    pub target: String,
    pub kind: EdgeKind,
    pub origin: EdgeOrigin,
    /// Dropped silently when the target does not exist
    pub optional: bool,
}

/// Everything one file contributes to the graph.
#[derive(Debug, Clone, Default)]
pub struct Fragment {
    pub file: String,
    pub nodes: Vec<ResourceNode>,
    pub edges: Vec<PendingEdge>,
    pub definitions: IndexMap<String, PropertyValue>,
    pub aliases: BTreeMap<String, String>,
    pub passthrough: Vec<PassthroughBlock>,
    pub warnings: Vec<NormalizationWarning>,
    /// Resources excluded because they could not be normalized
    pub errors: Vec<ParseError>,
}

impl Fragment {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            ..Default::default()
        }
    }

    pub fn edge(&mut self, source: &str, target: &str, kind: EdgeKind, origin: EdgeOrigin) {
        self.edges.push(PendingEdge {
            source: source.to_string(),
            target: target.to_string(),
            kind,
            origin,
            optional: false,
        });
    }

    /// A reference edge that only exists if its target does, e.g. one
    /// scanned out of expression text.
    pub fn optional_edge(&mut self, source: &str, target: &str) {
        self.edges.push(PendingEdge {
            source: source.to_string(),
            target: target.to_string(),
            kind: EdgeKind::DependsOn,
            origin: EdgeOrigin::Reference,
            optional: true,
        });
    }

    pub fn warn(&mut self, kind: WarningKind, node: Option<&str>, message: impl Into<String>) {
        let mut warning = NormalizationWarning::new(kind, message).in_file(self.file.clone());
        if let Some(node) = node {
            warning = warning.for_node(node);
        }
        self.warnings.push(warning);
    }

    pub fn passthrough(&mut self, block: PassthroughBlock) {
        self.passthrough.push(block.in_file(self.file.clone()));
    }

    /// Append `node`, suffixing its id with `-2`, `-3`, ... when the file
    /// already declares it. Returns the id used.
    pub fn push_unique(&mut self, mut node: ResourceNode) -> String {
        let base = node.id.clone();
        let mut n = 2;
        while self.nodes.iter().any(|existing| existing.id == node.id) {
            node.id = format!("{}-{}", base, n);
            n += 1;
        }
        let id = node.id.clone();
        self.nodes.push(node);
        id
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
            && self.edges.is_empty()
            && self.definitions.is_empty()
            && self.aliases.is_empty()
            && self.passthrough.is_empty()
    }
}
