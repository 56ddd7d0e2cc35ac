//! Rule evaluation engine.
//!
//! Rules run on scoped threads over the same read-only graph. A rule that
//! returns an error or panics does not abort validation: it becomes one
//! `engine.rule-failed` finding naming the rule.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use terrane_model::{FindingTarget, ResourceGraph, Severity, ValidationFinding};
use tracing::{debug, info, warn};

use crate::config::ValidatorConfig;
use crate::error::PolicyError;
use crate::rule::{RuleRegistry, ValidationRule};

/// Rule id of findings produced when a rule itself fails.
pub const RULE_FAILED: &str = "engine.rule-failed";

/// Counts over a set of findings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingSummary {
    pub total: usize,
    pub errors: usize,
    pub warnings: usize,
    pub infos: usize,
}

impl FindingSummary {
    pub fn of(findings: &[ValidationFinding]) -> Self {
        let mut summary = Self {
            total: findings.len(),
            ..Self::default()
        };
        for finding in findings {
            match finding.severity {
                Severity::Error => summary.errors += 1,
                Severity::Warning => summary.warnings += 1,
                Severity::Info => summary.infos += 1,
            }
        }
        summary
    }

    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }
}

impl std::fmt::Display for FindingSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} findings ({} errors, {} warnings, {} info)",
            self.total, self.errors, self.warnings, self.infos
        )
    }
}

/// Runs the enabled rules of a registry against graphs.
#[derive(Debug, Clone)]
pub struct Validator {
    registry: Arc<RuleRegistry>,
    config: ValidatorConfig,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(ValidatorConfig::default())
    }
}

impl Validator {
    /// Validator over the built-in rules.
    pub fn new(config: ValidatorConfig) -> Self {
        Self::with_registry(Arc::new(RuleRegistry::with_defaults()), config)
    }

    pub fn with_registry(registry: Arc<RuleRegistry>, config: ValidatorConfig) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    /// Rules that are not disabled, in id order.
    pub fn enabled_rules(&self) -> Vec<Arc<dyn ValidationRule>> {
        self.registry
            .rules()
            .into_iter()
            .filter(|rule| !self.config.is_disabled(rule.id()))
            .collect()
    }

    /// Evaluate every enabled rule and return the findings sorted by
    /// severity (descending), target id, rule id and message.
    pub fn validate(&self, graph: &ResourceGraph) -> Vec<ValidationFinding> {
        let rules = self.enabled_rules();
        let workers = self.config.workers(rules.len());
        info!("Validating {} nodes with {} rules on {} workers", graph.node_count(), rules.len(), workers);

        let chunk_size = rules.len().div_ceil(workers).max(1);
        let mut findings: Vec<ValidationFinding> = std::thread::scope(|scope| {
            let handles: Vec<_> = rules
                .chunks(chunk_size)
                .map(|chunk| {
                    scope.spawn(move || {
                        chunk
                            .iter()
                            .flat_map(|rule| run_rule(rule.as_ref(), graph))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|handle| handle.join().unwrap_or_default())
                .collect()
        });

        for finding in &mut findings {
            if let Some(severity) = self.config.severity_for(&finding.rule_id) {
                finding.severity = severity;
            }
        }
        findings.sort_by_key(ValidationFinding::sort_key);
        findings.dedup();

        debug!("Validation: {}", FindingSummary::of(&findings));
        findings
    }
}

fn run_rule(rule: &dyn ValidationRule, graph: &ResourceGraph) -> Vec<ValidationFinding> {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| rule.evaluate(graph)));
    let message = match outcome {
        Ok(Ok(findings)) => {
            debug!("Rule {} reported {} findings", rule.id(), findings.len());
            return findings;
        }
        Ok(Err(PolicyError::RuleEvaluationFailed { message, .. })) => message,
        Ok(Err(e)) => e.to_string(),
        Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
    };
    warn!("Rule {} failed: {}", rule.id(), message);
    vec![ValidationFinding::new(
        Severity::Error,
        RULE_FAILED,
        FindingTarget::Graph,
        format!("rule {} failed: {}", rule.id(), message),
    )]
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PolicyResult;
    use crate::rule::RuleCategory;
    use terrane_model::{Dialect, ResourceNode};

    struct Failing;

    impl ValidationRule for Failing {
        fn id(&self) -> &'static str {
            "structural.failing"
        }
        fn category(&self) -> RuleCategory {
            RuleCategory::Structural
        }
        fn description(&self) -> &'static str {
            "always errors"
        }
        fn default_severity(&self) -> Severity {
            Severity::Warning
        }
        fn evaluate(&self, _graph: &ResourceGraph) -> PolicyResult<Vec<ValidationFinding>> {
            Err(PolicyError::rule(self.id(), "cannot read graph"))
        }
    }

    struct Panicking;

    impl ValidationRule for Panicking {
        fn id(&self) -> &'static str {
            "security.panicking"
        }
        fn category(&self) -> RuleCategory {
            RuleCategory::Security
        }
        fn description(&self) -> &'static str {
            "always panics"
        }
        fn default_severity(&self) -> Severity {
            Severity::Warning
        }
        fn evaluate(&self, _graph: &ResourceGraph) -> PolicyResult<Vec<ValidationFinding>> {
            panic!("boom")
        }
    }

    struct PerNode;

    impl ValidationRule for PerNode {
        fn id(&self) -> &'static str {
            "best-practice.per-node"
        }
        fn category(&self) -> RuleCategory {
            RuleCategory::BestPractice
        }
        fn description(&self) -> &'static str {
            "one finding per node"
        }
        fn default_severity(&self) -> Severity {
            Severity::Info
        }
        fn evaluate(&self, graph: &ResourceGraph) -> PolicyResult<Vec<ValidationFinding>> {
            Ok(graph
                .nodes()
                .map(|n| self.finding(FindingTarget::node(&n.id), "seen".to_string()))
                .collect())
        }
    }

    fn registry() -> Arc<RuleRegistry> {
        let mut registry = RuleRegistry::new();
        registry.register(Arc::new(Failing));
        registry.register(Arc::new(Panicking));
        registry.register(Arc::new(PerNode));
        Arc::new(registry)
    }

    fn graph() -> ResourceGraph {
        let mut graph = ResourceGraph::new(Dialect::Terraform);
        graph.add_node(ResourceNode::new("b", "network.vpc")).unwrap();
        graph.add_node(ResourceNode::new("a", "network.vpc")).unwrap();
        graph
    }

    #[test]
    fn test_failing_rules_become_findings() {
        let validator = Validator::with_registry(registry(), ValidatorConfig::default());
        let findings = validator.validate(&graph());

        let failed: Vec<_> = findings.iter().filter(|f| f.rule_id == RULE_FAILED).collect();
        assert_eq!(failed.len(), 2);
        assert!(failed.iter().all(|f| f.severity == Severity::Error));
        assert!(failed.iter().any(|f| f.message.contains("structural.failing")));
        assert!(failed
            .iter()
            .any(|f| f.message.contains("security.panicking") && f.message.contains("boom")));

        // errors first, then per-node infos in id order
        assert_eq!(findings.len(), 4);
        assert_eq!(findings[2].target, FindingTarget::node("a"));
        assert_eq!(findings[3].target, FindingTarget::node("b"));
    }

    #[test]
    fn test_disabled_rules_and_overrides() {
        let config = ValidatorConfig::new()
            .with_disabled("structural.*")
            .with_disabled("security.panicking")
            .with_severity("best-practice.per-node", Severity::Error);
        let validator = Validator::with_registry(registry(), config);
        let findings = validator.validate(&graph());

        assert_eq!(findings.len(), 2);
        assert!(findings.iter().all(|f| f.severity == Severity::Error));
        assert!(findings.iter().all(|f| f.rule_id == "best-practice.per-node"));
    }

    #[test]
    fn test_results_do_not_depend_on_parallelism() {
        let serial = Validator::with_registry(registry(), ValidatorConfig::new().with_parallelism(1));
        let parallel = Validator::with_registry(registry(), ValidatorConfig::new().with_parallelism(8));
        assert_eq!(serial.validate(&graph()), parallel.validate(&graph()));
    }

    #[test]
    fn test_summary_counts() {
        let validator = Validator::with_registry(registry(), ValidatorConfig::default());
        let summary = FindingSummary::of(&validator.validate(&graph()));
        assert_eq!(summary.total, 4);
        assert_eq!(summary.errors, 2);
        assert_eq!(summary.infos, 2);
        assert!(summary.has_errors());
    }
}
