//! Error types for the validator.

use thiserror::Error;

/// Result type alias for validator operations.
pub type PolicyResult<T> = Result<T, PolicyError>;

/// Errors that can occur while validating a graph.
#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("Rule evaluation failed: {rule} - {message}")]
    RuleEvaluationFailed { rule: String, message: String },

    #[error("Rule not found: {0}")]
    RuleNotFound(String),

    #[error("Invalid validator configuration: {0}")]
    InvalidConfiguration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl PolicyError {
    /// Failure raised from inside a rule.
    pub fn rule(rule: impl Into<String>, message: impl Into<String>) -> Self {
        PolicyError::RuleEvaluationFailed {
            rule: rule.into(),
            message: message.into(),
        }
    }
}
