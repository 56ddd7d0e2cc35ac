//! The conversion orchestrator.
//!
//! Each invocation walks `parsing -> normalizing -> validating ->
//! (optimizing) -> emitting -> done`, owning its graph throughout. Fatal
//! errors move the report to `failed`; the report is returned either way.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use terrane_dialects::{emit, SourceTree};
use terrane_model::{Dialect, ResourceGraph};
use terrane_normalize::normalize_tree;
use terrane_optimize::Optimizer;
use terrane_policy::Validator;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::{CoreError, CoreResult};
use crate::hints::{HintProvider, PendingHints};
use crate::report::InvocationReport;
use crate::stage::{Operation, Stage};

/// What to run and on which input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub operation: Operation,
    /// Source file or directory
    pub source: PathBuf,
    /// Dialect of the source; inferred when absent
    pub source_dialect: Option<String>,
    /// Dialect to emit; the source dialect when absent
    pub target_dialect: Option<String>,
    /// Directory to write artifacts to
    pub output: Option<PathBuf>,
}

impl Request {
    pub fn new(operation: Operation, source: impl Into<PathBuf>) -> Self {
        Self {
            operation,
            source: source.into(),
            source_dialect: None,
            target_dialect: None,
            output: None,
        }
    }

    pub fn with_source_dialect(mut self, dialect: impl Into<String>) -> Self {
        self.source_dialect = Some(dialect.into());
        self
    }

    pub fn with_target_dialect(mut self, dialect: impl Into<String>) -> Self {
        self.target_dialect = Some(dialect.into());
        self
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }
}

fn parse_dialect(name: Option<&str>) -> CoreResult<Option<Dialect>> {
    name.map(|n| n.parse::<Dialect>().map_err(|_| CoreError::UnknownDialect(n.to_string())))
        .transpose()
}

/// Runs operations against a fixed configuration.
pub struct Engine {
    config: EngineConfig,
    validator: Validator,
    hints: Option<Arc<dyn HintProvider>>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let validator = Validator::new(config.validation.clone());
        Self {
            config,
            validator,
            hints: None,
        }
    }

    /// Use a validator with a custom rule registry.
    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_hint_provider(mut self, provider: Arc<dyn HintProvider>) -> Self {
        self.hints = Some(provider);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Graph summary plus findings.
    pub async fn analyze(&self, source: &Path) -> InvocationReport {
        self.run(Request::new(Operation::Analyze, source)).await
    }

    /// Findings only. Without a dialect hint the dialect is inferred.
    pub async fn validate(&self, source: &Path, dialect: Option<&str>) -> InvocationReport {
        let mut request = Request::new(Operation::Validate, source);
        request.source_dialect = dialect.map(str::to_string);
        self.run(request).await
    }

    /// Optimize and emit back into the source dialect. Artifacts are
    /// written only when `output` is given.
    pub async fn optimize(&self, source: &Path, dialect: Option<&str>, output: Option<&Path>) -> InvocationReport {
        let mut request = Request::new(Operation::Optimize, source);
        request.source_dialect = dialect.map(str::to_string);
        request.output = output.map(Path::to_path_buf);
        self.run(request).await
    }

    /// Emit into `target`, inferring the source dialect.
    pub async fn generate(&self, source: &Path, target: &str, output: &Path) -> InvocationReport {
        let request = Request::new(Operation::Generate, source)
            .with_target_dialect(target)
            .with_output(output);
        self.run(request).await
    }

    /// Emit into `target` from an explicit source dialect.
    pub async fn convert(&self, source: &Path, source_dialect: &str, target: &str, output: &Path) -> InvocationReport {
        let request = Request::new(Operation::Convert, source)
            .with_source_dialect(source_dialect)
            .with_target_dialect(target)
            .with_output(output);
        self.run(request).await
    }

    /// Run `request` to completion. Always returns a report; a fatal
    /// error leaves it in `failed`.
    pub async fn run(&self, request: Request) -> InvocationReport {
        info!("Starting {} of {}", request.operation, request.source.display());
        let mut report = InvocationReport::new(request.operation, &request.source);
        report.output = request.output.clone();

        match self.execute(&request, &mut report).await {
            Ok(()) => info!(
                "{} finished: {}, {} changes, {} artifacts",
                request.operation,
                report.finding_summary(),
                report.changes.len(),
                report.artifacts.len()
            ),
            Err(e) => report.fail(&e),
        }
        report
    }

    async fn execute(&self, request: &Request, report: &mut InvocationReport) -> CoreResult<()> {
        let operation = request.operation;

        // parsing
        let hint = parse_dialect(request.source_dialect.as_deref())?;
        let target = parse_dialect(request.target_dialect.as_deref())?;
        if operation == Operation::Convert && hint.is_none() {
            return Err(CoreError::UnknownDialect("convert needs an explicit source dialect".to_string()));
        }
        if matches!(operation, Operation::Generate | Operation::Convert) && target.is_none() {
            return Err(CoreError::UnknownDialect(format!("{} needs a target dialect", operation)));
        }

        let mut tree = SourceTree::discover(&request.source, &self.config.discovery)?;
        let dialect = tree.select_dialect(hint)?;
        let target = target.unwrap_or(dialect);
        report.source_dialect = Some(dialect);
        if operation.emits() {
            report.target_dialect = Some(target);
        }

        // normalizing
        report.transition(Stage::Normalizing)?;
        let normalized = normalize_tree(tree, dialect).await?;
        report.parse_errors = normalized.parse_errors;
        report.normalization_warnings = normalized.warnings;
        let graph = normalized.graph;
        report.summary = Some(graph.summary());
        if graph.node_count() == 0 {
            return Err(CoreError::NoResources(request.source.clone()));
        }

        let pending = match &self.hints {
            Some(provider) if operation.emits() => Some(PendingHints::spawn(provider.clone(), graph.clone())),
            _ => None,
        };

        // validating
        report.transition(Stage::Validating)?;
        let (mut graph, findings) = self.run_validation(graph).await?;
        report.findings = findings;
        info!("Validation: {}", report.finding_summary());

        if !operation.emits() {
            report.graph = Some(graph);
            return report.transition(Stage::Done);
        }

        // optimizing
        let passes_enabled = !self.config.optimization.passes.is_empty();
        if operation.stages(passes_enabled).contains(&Stage::Optimizing) {
            report.transition(Stage::Optimizing)?;
            let (optimized, changes) = Optimizer::new(&self.config.optimization).optimize(graph);
            graph = optimized;
            report.changes = changes;
        }

        // emitting
        report.transition(Stage::Emitting)?;
        if let Some(pending) = pending {
            let provider = pending.provider().to_string();
            let outcome = pending.take_ready();
            report.hints_merged = graph.merge_hints(outcome.into_pairs(), Some(&provider));
            debug!("Merged {} hints from {}", report.hints_merged, provider);
        }

        let options = self.config.emission.options(report.finding_summary().errors);
        let emitted = emit(&graph, target, &options)?;
        if let Some(output) = &request.output {
            report.written = emitted.write_to(output)?;
            info!("Wrote {} artifacts to {}", report.written.len(), output.display());
        }
        report.emission_warnings = emitted.warnings;
        report.artifacts = emitted.artifacts;
        report.graph = Some(graph);
        report.transition(Stage::Done)
    }

    /// Rules run on scoped threads; keep them off the async workers.
    async fn run_validation(
        &self,
        graph: ResourceGraph,
    ) -> CoreResult<(ResourceGraph, Vec<terrane_model::ValidationFinding>)> {
        let validator = self.validator.clone();
        tokio::task::spawn_blocking(move || {
            let findings = validator.validate(&graph);
            (graph, findings)
        })
        .await
        .map_err(|e| CoreError::TaskFailed(e.to_string()))
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("hints", &self.hints.as_ref().map(|p| p.name().to_string()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_parse_dialect() {
        assert_eq!(parse_dialect(Some("k8s")).unwrap(), Some(Dialect::Kubernetes));
        assert_eq!(parse_dialect(None).unwrap(), None);
        assert!(matches!(parse_dialect(Some("pulumi")), Err(CoreError::UnknownDialect(_))));
    }

    #[tokio::test]
    async fn test_unknown_target_fails_before_parsing() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("main.tf"), "resource \"aws_vpc\" \"main\" {\n  cidr_block = \"10.0.0.0/16\"\n}\n").unwrap();

        let out = tempdir().unwrap();
        let report = Engine::default().generate(dir.path(), "pulumi", out.path()).await;
        assert!(report.is_failed());
        assert_eq!(report.stages(), vec![Stage::Parsing, Stage::Failed]);
        assert!(report.error.as_deref().unwrap().contains("pulumi"));
        assert!(report.summary.is_none());
    }

    #[tokio::test]
    async fn test_missing_source_is_fatal() {
        let dir = tempdir().unwrap();
        let report = Engine::default().analyze(&dir.path().join("nope")).await;
        assert!(report.is_failed());
        assert!(report.error.is_some());
    }

    #[tokio::test]
    async fn test_convert_requires_source_dialect() {
        let dir = tempdir().unwrap();
        let request = Request::new(Operation::Convert, dir.path()).with_target_dialect("terraform");
        let report = Engine::default().run(request).await;
        assert!(report.is_failed());
    }
}
