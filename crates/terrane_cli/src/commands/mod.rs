//! CLI command definitions.
//!
//! Each subcommand maps to one engine operation and prints the resulting
//! report as text or JSON.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::debug;

use terrane_core::{Engine, EngineConfig, StaticHints};

pub mod analyze;
pub mod convert;
pub mod generate;
pub mod optimize;
pub mod output;
pub mod validate;

/// Terrane - infrastructure resource graph engine
#[derive(Parser)]
#[command(name = "terrane")]
#[command(version, about = "Terrane - infrastructure resource graph engine")]
#[command(long_about = r#"
Terrane normalizes Terraform, CloudFormation, Kubernetes and Ansible sources
into one resource graph that can be validated, optimized and emitted into any
of those dialects.

OPERATIONS:
  analyze   → Graph summary plus validation findings
  validate  → Validation findings only
  optimize  → Optimize and emit back into the source dialect
  generate  → Emit into another dialect, inferring the source dialect
  convert   → Emit into another dialect from an explicit source dialect

EXIT CODES:
  0 - Success
  1 - Fatal failure
  2 - Invalid arguments or configuration
  3 - Success with findings
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Configuration file (defaults to ./terrane.yaml when present)
    #[arg(short, long, global = true, env = "TERRANE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// YAML file of advisory hints keyed by resource id
    #[arg(long, global = true)]
    pub hints: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Summarize a source tree and report findings
    Analyze(analyze::AnalyzeArgs),

    /// Emit a source tree into another dialect
    Generate(generate::GenerateArgs),

    /// Report findings for a source tree
    Validate(validate::ValidateArgs),

    /// Optimize a source tree in place of its own dialect
    Optimize(optimize::OptimizeArgs),

    /// Convert between two explicit dialects
    Convert(convert::ConvertArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Settings shared by every command.
pub struct Context {
    pub config: EngineConfig,
    pub format: OutputFormat,
    pub hints: Option<PathBuf>,
}

impl Context {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let config = match &cli.config {
            Some(path) => EngineConfig::from_file(path)
                .with_context(|| format!("Failed to load configuration {}", path.display()))?,
            None => EngineConfig::discover(&std::env::current_dir()?)?,
        };
        debug!("Configuration: {:?}", config);

        Ok(Self {
            config,
            format: cli.format,
            hints: cli.hints.clone(),
        })
    }

    /// Engine for this invocation, with the hint file attached if given.
    pub fn engine(&self) -> Result<Engine> {
        let mut engine = Engine::new(self.config.clone());
        if let Some(path) = &self.hints {
            let hints = StaticHints::from_file(path)
                .with_context(|| format!("Failed to load hints {}", path.display()))?;
            engine = engine.with_hint_provider(Arc::new(hints));
        }
        Ok(engine)
    }
}
