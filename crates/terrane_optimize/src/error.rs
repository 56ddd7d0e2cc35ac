//! Error types for the optimizer.

use terrane_model::ModelError;
use thiserror::Error;

/// Result type alias for optimizer operations.
pub type OptimizeResult<T> = Result<T, OptimizeError>;

#[derive(Error, Debug)]
pub enum OptimizeError {
    #[error("Unknown optimization pass: {0}")]
    UnknownPass(String),

    #[error("Pass {pass} failed: {message}")]
    PassFailed { pass: String, message: String },

    #[error("Model error: {0}")]
    Model(#[from] ModelError),
}
