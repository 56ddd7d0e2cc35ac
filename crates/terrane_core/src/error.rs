//! Error types for the orchestrator.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Fatal errors. Each one ends the current invocation in the `failed`
/// stage; everything else is accumulated in the report.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Unknown dialect: {0}")]
    UnknownDialect(String),

    #[error("No resources discovered under {0}")]
    NoResources(PathBuf),

    #[error("Invalid stage transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Task failed: {0}")]
    TaskFailed(String),

    #[error("Dialect error: {0}")]
    Dialect(#[from] terrane_dialects::DialectError),

    #[error("Normalization error: {0}")]
    Normalize(#[from] terrane_normalize::NormalizeError),

    #[error("Policy error: {0}")]
    Policy(#[from] terrane_policy::PolicyError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}
