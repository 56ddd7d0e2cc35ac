//! # terrane_core
//!
//! Conversion orchestrator for Terrane.
//!
//! Wires discovery, parsing, normalization, validation, optimization and
//! emission into the five operations (`analyze`, `generate`, `validate`,
//! `optimize`, `convert`), tracks each invocation through its stages and
//! returns a structured [`InvocationReport`] even when a fatal error stops
//! the chain.
//!
//! # Architecture
//!
//! - **Engine**: runs one [`Request`] at a time against an [`EngineConfig`]
//! - **Stages**: `parsing -> normalizing -> validating -> (optimizing) -> emitting -> done`, or `failed`
//! - **Report**: diagnostics of every stage, artifacts and an exit status
//! - **Hints**: optional advisory collaborator, never waited on
//!
//! # Example
//!
//! ```rust,ignore
//! use terrane_core::{Engine, EngineConfig};
//!
//! let engine = Engine::new(EngineConfig::discover(&workspace)?);
//! let report = engine.convert(&source, "terraform", "kubernetes", &out).await;
//! for warning in &report.emission_warnings {
//!     println!("{}", warning.message);
//! }
//! std::process::exit(report.exit_status().code() as i32);
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod hints;
pub mod report;
pub mod stage;

pub use config::{EmissionConfig, EngineConfig, CONFIG_FILE};
pub use engine::{Engine, Request};
pub use error::{CoreError, CoreResult};
pub use hints::{HintOutcome, HintProvider, NodeHint, PendingHints, StaticHints};
pub use report::{ExitStatus, InvocationReport, StageRecord};
pub use stage::{Operation, Stage};
