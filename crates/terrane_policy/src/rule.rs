//! The rule capability trait and the registry holding rule implementations.

use std::collections::BTreeMap;
use std::sync::Arc;

use terrane_model::{FindingTarget, ResourceGraph, Severity, ValidationFinding};
use tracing::debug;

use crate::error::{PolicyError, PolicyResult};

/// Rule family, the prefix of every rule id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RuleCategory {
    Structural,
    Security,
    BestPractice,
}

impl RuleCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleCategory::Structural => "structural",
            RuleCategory::Security => "security",
            RuleCategory::BestPractice => "best-practice",
        }
    }

    pub fn all() -> Vec<RuleCategory> {
        vec![
            RuleCategory::Structural,
            RuleCategory::Security,
            RuleCategory::BestPractice,
        ]
    }
}

impl std::fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A check over a read-only graph.
///
/// Rules run concurrently, so they must not rely on shared mutable state.
pub trait ValidationRule: Send + Sync {
    /// Stable id, `<category>.<name>`.
    fn id(&self) -> &'static str;

    fn category(&self) -> RuleCategory;

    fn description(&self) -> &'static str;

    /// Severity of the findings this rule reports unless overridden.
    fn default_severity(&self) -> Severity;

    fn evaluate(&self, graph: &ResourceGraph) -> PolicyResult<Vec<ValidationFinding>>;

    /// Finding at this rule's default severity.
    fn finding(&self, target: FindingTarget, message: String) -> ValidationFinding {
        ValidationFinding::new(self.default_severity(), self.id(), target, message)
    }
}

/// Registry of rule implementations, ordered by rule id.
#[derive(Default)]
pub struct RuleRegistry {
    rules: BTreeMap<String, Arc<dyn ValidationRule>>,
}

impl RuleRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            rules: BTreeMap::new(),
        }
    }

    /// Registry holding every built-in rule.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for rule in crate::rules::builtin() {
            registry.register(rule);
        }
        registry
    }

    /// Register a rule under its id, replacing any rule with the same id.
    pub fn register(&mut self, rule: Arc<dyn ValidationRule>) {
        let id = rule.id().to_string();
        debug!("Registering rule: {}", id);
        self.rules.insert(id, rule);
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn ValidationRule>> {
        self.rules.get(id).cloned()
    }

    /// Get a rule by id, returning an error if not found.
    pub fn get_required(&self, id: &str) -> PolicyResult<Arc<dyn ValidationRule>> {
        self.get(id).ok_or_else(|| PolicyError::RuleNotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.rules.contains_key(id)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.rules.keys().map(|s| s.as_str()).collect()
    }

    /// Rules in id order.
    pub fn rules(&self) -> Vec<Arc<dyn ValidationRule>> {
        self.rules.values().cloned().collect()
    }

    pub fn in_category(&self, category: RuleCategory) -> Vec<Arc<dyn ValidationRule>> {
        self.rules
            .values()
            .filter(|r| r.category() == category)
            .cloned()
            .collect()
    }

    pub fn unregister(&mut self, id: &str) -> Option<Arc<dyn ValidationRule>> {
        debug!("Unregistering rule: {}", id);
        self.rules.remove(id)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl std::fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleRegistry")
            .field("rules", &self.rules.keys().collect::<Vec<_>>())
            .finish()
    }
}
