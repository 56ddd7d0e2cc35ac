//! Error types for the graph model.

use thiserror::Error;

/// Result type alias for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors that can occur while building or rewriting a resource graph.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Duplicate node identifier: {0}")]
    DuplicateNode(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Unknown dialect: {0}")]
    UnknownDialect(String),

    #[error("Graph invariant violated: {0}")]
    InvariantViolation(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
