//! Error types for normalization.

use thiserror::Error;

/// Normalization errors. Malformed input is never an error here; it
/// surfaces as parse errors and warnings in the output.
#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("Normalization task failed: {0}")]
    TaskFailed(String),

    #[error("Dialect error: {0}")]
    Dialect(#[from] terrane_dialects::DialectError),
}

/// Result type for normalization operations.
pub type NormalizeResult<T> = Result<T, NormalizeError>;
