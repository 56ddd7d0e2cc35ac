//! Non-fatal diagnostics accumulated by each stage.

use serde::{Deserialize, Serialize};

use crate::edge::{edge_id, EdgeKind};

/// Severity of a validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warning" | "warn" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            other => Err(format!("unknown severity '{}'", other)),
        }
    }
}

/// A localized syntax failure. Processing continues after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseError {
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    pub message: String,
}

impl ParseError {
    pub fn new(file: impl Into<String>, line: Option<usize>, message: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line,
            resource: None,
            message: message.into(),
        }
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.file)?;
        if let Some(line) = self.line {
            write!(f, ":{}", line)?;
        }
        if let Some(resource) = &self.resource {
            write!(f, " [{}]", resource)?;
        }
        write!(f, ": {}", self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WarningKind {
    DanglingReference,
    ConflictingDeclaration,
    OpaqueProperty,
    UnknownType,
    UnsupportedConstruct,
    SkippedFile,
}

impl WarningKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningKind::DanglingReference => "dangling-reference",
            WarningKind::ConflictingDeclaration => "conflicting-declaration",
            WarningKind::OpaqueProperty => "opaque-property",
            WarningKind::UnknownType => "unknown-type",
            WarningKind::UnsupportedConstruct => "unsupported-construct",
            WarningKind::SkippedFile => "skipped-file",
        }
    }
}

/// Data retained as opaque metadata or otherwise degraded during normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizationWarning {
    pub kind: WarningKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    pub message: String,
}

impl NormalizationWarning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            node: None,
            file: None,
            message: message.into(),
        }
    }

    pub fn for_node(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }

    pub fn in_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmissionWarningKind {
    UntranslatableResource,
    OpaqueProperty,
    UntranslatableExpression,
    DanglingReference,
    PassthroughDropped,
}

impl EmissionWarningKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmissionWarningKind::UntranslatableResource => "untranslatable resource",
            EmissionWarningKind::OpaqueProperty => "opaque property",
            EmissionWarningKind::UntranslatableExpression => "untranslatable expression",
            EmissionWarningKind::DanglingReference => "dangling reference",
            EmissionWarningKind::PassthroughDropped => "passthrough dropped",
        }
    }
}

/// A lossy or untranslatable construct. Output is still produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmissionWarning {
    pub kind: EmissionWarningKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    pub message: String,
}

impl EmissionWarning {
    pub fn new(kind: EmissionWarningKind, node: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            kind,
            node: node.map(str::to_string),
            message: message.into(),
        }
    }
}

/// What a finding points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "lowercase")]
pub enum FindingTarget {
    Node { id: String },
    Edge { source: String, target: String, kind: EdgeKind },
    Graph,
}

impl FindingTarget {
    pub fn node(id: impl Into<String>) -> Self {
        FindingTarget::Node { id: id.into() }
    }

    pub fn edge(source: impl Into<String>, target: impl Into<String>, kind: EdgeKind) -> Self {
        FindingTarget::Edge {
            source: source.into(),
            target: target.into(),
            kind,
        }
    }

    /// Identifier used for ordering and display.
    pub fn id(&self) -> String {
        match self {
            FindingTarget::Node { id } => id.clone(),
            FindingTarget::Edge { source, target, kind } => edge_id(source, target, *kind),
            FindingTarget::Graph => "<graph>".to_string(),
        }
    }
}

/// Result of one validation rule against one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFinding {
    pub severity: Severity,
    pub rule_id: String,
    pub target: FindingTarget,
    pub message: String,
}

impl ValidationFinding {
    pub fn new(
        severity: Severity,
        rule_id: impl Into<String>,
        target: FindingTarget,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            rule_id: rule_id.into(),
            target,
            message: message.into(),
        }
    }

    /// Deterministic ordering: severity descending, target, rule, message.
    pub fn sort_key(&self) -> (std::cmp::Reverse<Severity>, String, String, String) {
        (
            std::cmp::Reverse(self.severity),
            self.target.id(),
            self.rule_id.clone(),
            self.message.clone(),
        )
    }
}

impl std::fmt::Display for ValidationFinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {} ({}): {}",
            self.severity,
            self.target.id(),
            self.rule_id,
            self.message
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_order() {
        assert!(Severity::Error > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
        assert_eq!("warn".parse::<Severity>().unwrap(), Severity::Warning);
    }

    #[test]
    fn test_finding_sort_key() {
        let mut findings = vec![
            ValidationFinding::new(Severity::Info, "z", FindingTarget::node("a"), "m"),
            ValidationFinding::new(Severity::Error, "b", FindingTarget::node("b"), "m"),
            ValidationFinding::new(Severity::Error, "a", FindingTarget::node("b"), "m"),
        ];
        findings.sort_by_key(|f| f.sort_key());
        let order: Vec<_> = findings.iter().map(|f| f.rule_id.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "z"]);
    }

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::new("main.tf", Some(12), "unexpected token").with_resource("aws_vpc.main");
        assert_eq!(err.to_string(), "main.tf:12 [aws_vpc.main]: unexpected token");
    }
}
