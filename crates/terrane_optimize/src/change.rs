//! Pass identifiers and the change log.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::OptimizeError;

/// Optimization passes, in the order they always run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PassKind {
    MergeDuplicates,
    HoistLiterals,
    ReduceDependencies,
}

impl PassKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PassKind::MergeDuplicates => "merge-duplicates",
            PassKind::HoistLiterals => "hoist-literals",
            PassKind::ReduceDependencies => "reduce-dependencies",
        }
    }

    /// All passes in execution order.
    pub fn all() -> Vec<PassKind> {
        vec![
            PassKind::MergeDuplicates,
            PassKind::HoistLiterals,
            PassKind::ReduceDependencies,
        ]
    }
}

impl std::fmt::Display for PassKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PassKind {
    type Err = OptimizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PassKind::all()
            .into_iter()
            .find(|pass| pass.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| OptimizeError::UnknownPass(s.to_string()))
    }
}

/// Outcome of a change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum ChangeStatus {
    Applied,
    /// The pass was rolled back
    Skipped(String),
}

impl std::fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeStatus::Applied => write!(f, "applied"),
            ChangeStatus::Skipped(reason) => write!(f, "skipped: {}", reason),
        }
    }
}

/// One entry of the optimization log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizationChange {
    pub pass: PassKind,
    pub status: ChangeStatus,
    pub description: String,
    /// Node ids the change touched
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<String>,
}

impl OptimizationChange {
    pub fn applied(pass: PassKind, description: impl Into<String>) -> Self {
        Self {
            pass,
            status: ChangeStatus::Applied,
            description: description.into(),
            nodes: Vec::new(),
        }
    }

    pub fn skipped(pass: PassKind, reason: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            pass,
            status: ChangeStatus::Skipped(reason.into()),
            description: description.into(),
            nodes: Vec::new(),
        }
    }

    pub fn with_nodes(mut self, nodes: Vec<String>) -> Self {
        self.nodes = nodes;
        self
    }

    pub fn is_applied(&self) -> bool {
        self.status == ChangeStatus::Applied
    }
}

impl std::fmt::Display for OptimizationChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.pass, self.status, self.description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_names() {
        for pass in PassKind::all() {
            assert_eq!(pass.as_str().parse::<PassKind>().unwrap(), pass);
        }
        assert!(matches!(
            "inline-modules".parse::<PassKind>(),
            Err(OptimizeError::UnknownPass(_))
        ));
    }

    #[test]
    fn test_skipped_display() {
        let change = OptimizationChange::skipped(
            PassKind::HoistLiterals,
            "invariant violation",
            "rolled back",
        );
        assert_eq!(change.to_string(), "[hoist-literals] skipped: invariant violation: rolled back");
        assert!(!change.is_applied());
    }
}
