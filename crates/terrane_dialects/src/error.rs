//! Error types for dialect parsing and emission.

use std::path::PathBuf;

use terrane_model::Dialect;
use thiserror::Error;

/// Result type alias for dialect operations.
pub type DialectResult<T> = Result<T, DialectError>;

/// Fatal dialect errors. Malformed input is reported as `ParseError`
/// values instead and never surfaces here.
#[derive(Error, Debug)]
pub enum DialectError {
    #[error("Source path not readable: {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Source path does not exist: {0}")]
    NotFound(PathBuf),

    #[error("Ambiguous dialect inference, found {}; pass an explicit dialect", list(.0))]
    Ambiguous(Vec<Dialect>),

    #[error("No recognizable infrastructure files under {0}")]
    NoSources(PathBuf),

    #[error("No emitter registered for dialect: {0}")]
    EmitterNotFound(String),

    #[error("Model error: {0}")]
    Model(#[from] terrane_model::ModelError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn list(dialects: &[Dialect]) -> String {
    dialects
        .iter()
        .map(|d| d.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
