//! # terrane_policy
//!
//! Validation of canonical resource graphs.
//!
//! This crate provides:
//! - **Rule trait**: [`ValidationRule`] checks a read-only [`ResourceGraph`]
//! - **Registry**: [`RuleRegistry`] holds rule implementations by id
//! - **Built-in rules**: structural, security and best-practice families
//! - **Engine**: [`Validator`] runs enabled rules concurrently and orders
//!   the findings deterministically
//!
//! ## Example
//!
//! ```rust
//! use terrane_model::{Dialect, ResourceGraph, ResourceNode, Severity};
//! use terrane_policy::{Validator, ValidatorConfig};
//!
//! let mut graph = ResourceGraph::new(Dialect::Terraform);
//! graph.add_node(ResourceNode::new("aws_s3_bucket.logs", "storage.bucket")).unwrap();
//!
//! let validator = Validator::new(ValidatorConfig::default());
//! let findings = validator.validate(&graph);
//! assert!(findings.iter().any(|f| f.rule_id == "security.unencrypted-storage"));
//! assert!(findings.iter().all(|f| f.severity != Severity::Error));
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod rule;
pub mod rules;

pub use config::ValidatorConfig;
pub use engine::{FindingSummary, Validator, RULE_FAILED};
pub use error::{PolicyError, PolicyResult};
pub use rule::{RuleCategory, RuleRegistry, ValidationRule};

use terrane_model::{ResourceGraph, ValidationFinding};

/// Validate with the built-in rules and default configuration.
pub fn validate(graph: &ResourceGraph) -> Vec<ValidationFinding> {
    Validator::default().validate(graph)
}
