//! Dependency and containment edges.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Kind of relation between two nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeKind {
    /// `source` depends on `target`
    DependsOn,
    /// `source` contains `target`
    Contains,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::DependsOn => "depends-on",
            EdgeKind::Contains => "contains",
        }
    }
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How an edge was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeOrigin {
    /// User-authored depends-on
    Explicit,
    /// Attribute reference / typed token
    Reference,
    /// Implicit ordering from dialect structure
    Ordering,
    /// Containment derived from structure
    Ownership,
}

impl EdgeOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeOrigin::Explicit => "explicit",
            EdgeOrigin::Reference => "reference",
            EdgeOrigin::Ordering => "ordering",
            EdgeOrigin::Ownership => "ownership",
        }
    }
}

/// A directed relation, unique per `(source, target, kind)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub source: String,
    pub target: String,
    pub kind: EdgeKind,
    pub origins: BTreeSet<EdgeOrigin>,
}

impl DependencyEdge {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        kind: EdgeKind,
        origin: EdgeOrigin,
    ) -> Self {
        let mut origins = BTreeSet::new();
        origins.insert(origin);
        Self {
            source: source.into(),
            target: target.into(),
            kind,
            origins,
        }
    }

    /// Display identifier, `a -> b` or `a contains b`.
    pub fn id(&self) -> String {
        edge_id(&self.source, &self.target, self.kind)
    }

    pub fn key(&self) -> (String, String, EdgeKind) {
        (self.source.clone(), self.target.clone(), self.kind)
    }

    pub fn has_origin(&self, origin: EdgeOrigin) -> bool {
        self.origins.contains(&origin)
    }

    pub fn is_only(&self, origin: EdgeOrigin) -> bool {
        self.origins.len() == 1 && self.has_origin(origin)
    }
}

pub fn edge_id(source: &str, target: &str, kind: EdgeKind) -> String {
    match kind {
        EdgeKind::DependsOn => format!("{} -> {}", source, target),
        EdgeKind::Contains => format!("{} contains {}", source, target),
    }
}
