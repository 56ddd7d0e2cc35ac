//! Engine configuration, loaded from `terrane.yaml` or `terrane.toml`.

use std::path::Path;

use serde::{Deserialize, Serialize};
use terrane_dialects::{DiscoveryOptions, EmitOptions};
use terrane_optimize::OptimizerConfig;
use terrane_policy::ValidatorConfig;
use tracing::debug;

use crate::error::{CoreError, CoreResult};

/// Default configuration file name looked up by the CLI.
pub const CONFIG_FILE: &str = "terrane.yaml";

/// Emission settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmissionConfig {
    /// Extra header text placed at the top of every artifact
    pub header: Option<String>,

    /// Render advisory hints as comments
    pub include_hints: bool,
}

impl Default for EmissionConfig {
    fn default() -> Self {
        Self {
            header: None,
            include_hints: true,
        }
    }
}

impl EmissionConfig {
    /// Emit options for a graph with `errors` unresolved error-level
    /// findings.
    pub fn options(&self, errors: usize) -> EmitOptions {
        let mut lines = Vec::new();
        if let Some(header) = &self.header {
            lines.push(header.trim_end().to_string());
        }
        if errors > 0 {
            lines.push(format!(
                "WARNING: generated from a graph with {} unresolved error-level finding{}",
                errors,
                if errors == 1 { "" } else { "s" }
            ));
            lines.push("Review the validation report before applying this output.".to_string());
        }

        let mut options = EmitOptions::default();
        if !lines.is_empty() {
            options = options.with_banner(lines.join("\n"));
        }
        if !self.include_hints {
            options = options.without_hints();
        }
        options
    }
}

/// Everything an invocation can be tuned with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Source discovery limits
    pub discovery: DiscoveryOptions,

    /// Disabled rules, severity overrides and rule parallelism
    pub validation: ValidatorConfig,

    /// Enabled passes and pass settings
    pub optimization: OptimizerConfig,

    /// Banner and hint rendering
    pub emission: EmissionConfig,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from YAML, or TOML when the file ends in `.toml`.
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let is_toml = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("toml"))
            .unwrap_or(false);

        let config: Self = if is_toml {
            toml::from_str(&content).map_err(|e| CoreError::InvalidConfiguration(format!("{}: {}", path.display(), e)))?
        } else {
            serde_yaml::from_str(&content)
                .map_err(|e| CoreError::InvalidConfiguration(format!("{}: {}", path.display(), e)))?
        };
        config.validate()?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load `terrane.yaml` from `dir` if present, else defaults.
    pub fn discover(dir: &Path) -> CoreResult<Self> {
        let path = dir.join(CONFIG_FILE);
        if path.is_file() {
            Self::from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn with_validation(mut self, validation: ValidatorConfig) -> Self {
        self.validation = validation;
        self
    }

    pub fn with_optimization(mut self, optimization: OptimizerConfig) -> Self {
        self.optimization = optimization;
        self
    }

    pub fn with_emission(mut self, emission: EmissionConfig) -> Self {
        self.emission = emission;
        self
    }

    pub fn validate(&self) -> CoreResult<()> {
        self.validation.validate()?;
        if self.discovery.max_file_size == 0 {
            return Err(CoreError::InvalidConfiguration(
                "discovery.max_file_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
