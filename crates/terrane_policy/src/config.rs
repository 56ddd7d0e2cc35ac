//! Validator configuration.

use std::collections::BTreeMap;
use std::path::Path;

use glob::Pattern;
use serde::{Deserialize, Serialize};
use terrane_model::Severity;

use crate::error::{PolicyError, PolicyResult};

/// Which rules run and how their findings are graded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Rule ids or glob patterns (`security.*`) that are skipped
    pub disabled_rules: Vec<String>,

    /// Rule id -> severity replacing the rule's own
    pub severity_overrides: BTreeMap<String, Severity>,

    /// Maximum rules evaluated at once; 0 uses the available parallelism
    pub parallelism: usize,
}

impl ValidatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a YAML file.
    pub fn from_file(path: &Path) -> PolicyResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_disabled(mut self, rule: impl Into<String>) -> Self {
        self.disabled_rules.push(rule.into());
        self
    }

    pub fn with_severity(mut self, rule: impl Into<String>, severity: Severity) -> Self {
        self.severity_overrides.insert(rule.into(), severity);
        self
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Check that every disabled-rule pattern compiles.
    pub fn validate(&self) -> PolicyResult<()> {
        for pattern in &self.disabled_rules {
            Pattern::new(pattern).map_err(|e| {
                PolicyError::InvalidConfiguration(format!("disabled rule pattern '{}': {}", pattern, e))
            })?;
        }
        Ok(())
    }

    pub fn is_disabled(&self, rule_id: &str) -> bool {
        self.disabled_rules.iter().any(|pattern| {
            pattern == rule_id
                || Pattern::new(pattern)
                    .map(|p| p.matches(rule_id))
                    .unwrap_or(false)
        })
    }

    pub fn severity_for(&self, rule_id: &str) -> Option<Severity> {
        self.severity_overrides.get(rule_id).copied()
    }

    /// Worker count for `rule_count` rules.
    pub fn workers(&self, rule_count: usize) -> usize {
        let limit = if self.parallelism == 0 {
            std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
        } else {
            self.parallelism
        };
        limit.min(rule_count).max(1)
    }
}
