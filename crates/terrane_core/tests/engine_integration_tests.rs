//! Whole-chain runs of every operation against on-disk sources.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::tempdir;
use terrane_core::{
    Engine, EngineConfig, ExitStatus, HintOutcome, HintProvider, NodeHint, Stage, StaticHints,
};
use terrane_model::{Dialect, EmissionWarningKind, ResourceGraph, Severity, WarningKind};
use terrane_optimize::{OptimizerConfig, PassKind};

const NETWORK: &str = r#"
resource "aws_vpc" "main" {
  cidr_block = "10.0.0.0/16"
  tags = {
    Team = "platform"
  }
}

resource "aws_subnet" "a" {
  vpc_id     = aws_vpc.main.id
  cidr_block = "10.0.1.0/24"
  tags = {
    Team = "platform"
  }
}
"#;

const DANGLING: &str = r#"
resource "aws_subnet" "a" {
  cidr_block = "10.0.1.0/24"
  depends_on = [aws_vpc.missing]
}
"#;

fn write(dir: &Path, name: &str, content: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

#[tokio::test]
async fn test_analyze_stops_after_validation() {
    let dir = tempdir().unwrap();
    write(dir.path(), "main.tf", NETWORK);

    let report = Engine::default().analyze(dir.path()).await;
    assert!(report.is_done(), "{:?}", report.error);
    assert_eq!(
        report.stages(),
        vec![Stage::Parsing, Stage::Normalizing, Stage::Validating, Stage::Done]
    );
    let summary = report.summary.as_ref().unwrap();
    assert_eq!(summary.node_count, 2);
    assert_eq!(report.source_dialect, Some(Dialect::Terraform));
    assert!(report.artifacts.is_empty());
    assert!(report.changes.is_empty());
}

#[tokio::test]
async fn test_analyze_is_deterministic() {
    let dir = tempdir().unwrap();
    write(dir.path(), "main.tf", NETWORK);
    write(dir.path(), "extra.tf", DANGLING.replace("\"a\"", "\"b\"").as_str());

    let engine = Engine::default();
    let first = engine.analyze(dir.path()).await;
    let second = engine.analyze(dir.path()).await;
    assert!(!first.findings.is_empty());
    assert_eq!(
        serde_json::to_string(&first.findings).unwrap(),
        serde_json::to_string(&second.findings).unwrap()
    );
}

#[tokio::test]
async fn test_dangling_depends_on_still_generates_with_banner() {
    let dir = tempdir().unwrap();
    write(dir.path(), "main.tf", DANGLING);
    let out = tempdir().unwrap();

    let engine = Engine::default();
    let validated = engine.validate(dir.path(), None).await;
    assert!(validated.is_done());
    assert!(validated
        .normalization_warnings
        .iter()
        .any(|w| w.kind == WarningKind::DanglingReference));
    assert!(validated
        .findings
        .iter()
        .any(|f| f.rule_id == "structural.dangling-reference" && f.severity == Severity::Error));
    assert_eq!(validated.exit_status(), ExitStatus::Findings);

    let report = engine.generate(dir.path(), "terraform", out.path()).await;
    assert!(report.is_done(), "{:?}", report.error);
    assert_eq!(report.stages().last(), Some(&Stage::Done));
    assert!(report.stages().contains(&Stage::Emitting));

    let main = fs::read_to_string(out.path().join("main.tf")).unwrap();
    assert!(main.starts_with("# WARNING: generated from a graph with"));
    assert!(!main.contains("depends_on = [aws_vpc.missing]"));
    assert!(report
        .emission_warnings
        .iter()
        .any(|w| w.kind == EmissionWarningKind::DanglingReference));
}

#[tokio::test]
async fn test_untranslatable_conversion_produces_stub() {
    let dir = tempdir().unwrap();
    write(dir.path(), "storage.tf", "resource \"aws_s3_bucket\" \"logs\" {\n  bucket = \"logs\"\n}\n");
    let out = tempdir().unwrap();

    let report = Engine::default()
        .convert(dir.path(), "terraform", "kubernetes", out.path())
        .await;
    assert!(report.is_done(), "{:?}", report.error);
    assert_eq!(report.target_dialect, Some(Dialect::Kubernetes));
    assert!(report
        .emission_warnings
        .iter()
        .any(|w| w.kind == EmissionWarningKind::UntranslatableResource
            && w.node.as_deref() == Some("aws_s3_bucket.logs")));

    let manifests = fs::read_to_string(out.path().join("manifests.yaml")).unwrap();
    assert!(manifests.contains("# untranslatable resource aws_s3_bucket.logs"));
    assert_ne!(report.exit_status(), ExitStatus::Fatal);
}

#[tokio::test]
async fn test_optimize_merges_across_files() {
    let dir = tempdir().unwrap();
    write(dir.path(), "a.tf", "resource \"aws_sqs_queue\" \"jobs\" {\n  delay_seconds = 5\n}\n");
    write(dir.path(), "b.tf", "resource \"aws_sqs_queue\" \"tasks\" {\n  delay_seconds = 5\n}\n");

    let report = Engine::default().optimize(dir.path(), Some("terraform"), None).await;
    assert!(report.is_done(), "{:?}", report.error);
    assert_eq!(report.changes.len(), 1);
    assert_eq!(report.changes[0].pass, PassKind::MergeDuplicates);
    assert!(report.written.is_empty());

    let moved = report.artifacts.values().any(|text| {
        text.contains("moved {\n  from = aws_sqs_queue.tasks\n  to   = aws_sqs_queue.jobs\n}")
    });
    assert!(moved, "{:?}", report.artifacts);
    let graph = report.graph.as_ref().unwrap();
    assert_eq!(graph.resolve_alias("aws_sqs_queue.tasks"), "aws_sqs_queue.jobs");
}

#[tokio::test]
async fn test_generate_skips_optimizing_without_passes() {
    let dir = tempdir().unwrap();
    write(dir.path(), "main.tf", NETWORK);
    let out = tempdir().unwrap();

    let config = EngineConfig::default().with_optimization(OptimizerConfig::default().with_passes(Vec::new()));
    let report = Engine::new(config)
        .generate(dir.path(), "cloudformation", out.path())
        .await;
    assert!(report.is_done(), "{:?}", report.error);
    assert!(!report.stages().contains(&Stage::Optimizing));
    assert!(out.path().join("template.yaml").is_file());
}

#[tokio::test]
async fn test_fatal_conditions_return_failed_reports() {
    let engine = Engine::default();

    let empty = tempdir().unwrap();
    let report = engine.analyze(empty.path()).await;
    assert!(report.is_failed());
    assert_eq!(report.exit_status().code(), 1);

    let mixed = tempdir().unwrap();
    write(mixed.path(), "main.tf", NETWORK);
    write(
        mixed.path(),
        "deploy.yaml",
        "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: settings\ndata:\n  mode: fast\n",
    );
    let report = engine.validate(mixed.path(), None).await;
    assert!(report.is_failed());
    assert!(report.error.as_deref().unwrap().contains("Ambiguous"));

    let report = engine.validate(mixed.path(), Some("kubernetes")).await;
    assert!(report.is_done(), "{:?}", report.error);
    assert_eq!(report.source_dialect, Some(Dialect::Kubernetes));
}

struct Never;

#[async_trait]
impl HintProvider for Never {
    fn name(&self) -> &str {
        "never"
    }

    async fn request_hints(&self, _graph: &ResourceGraph) -> HintOutcome {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        HintOutcome::from_hints(vec![NodeHint::new("aws_vpc.main", "late")])
    }
}

#[tokio::test]
async fn test_ready_hints_are_merged_and_emitted() {
    let dir = tempdir().unwrap();
    write(dir.path(), "main.tf", NETWORK);
    let out = tempdir().unwrap();

    let hints = StaticHints::new().with_hint("aws_vpc.main", "enable flow logs");
    let report = Engine::default()
        .with_hint_provider(Arc::new(hints))
        .generate(dir.path(), "terraform", out.path())
        .await;
    assert!(report.is_done(), "{:?}", report.error);
    assert_eq!(report.hints_merged, 1);
    let graph = report.graph.as_ref().unwrap();
    assert_eq!(graph.node("aws_vpc.main").unwrap().hints[0].source.as_deref(), Some("static"));
}

#[tokio::test]
async fn test_late_hints_never_block_emission() {
    let dir = tempdir().unwrap();
    write(dir.path(), "main.tf", NETWORK);
    let out = tempdir().unwrap();

    let report = Engine::default()
        .with_hint_provider(Arc::new(Never))
        .generate(dir.path(), "terraform", out.path())
        .await;
    assert!(report.is_done(), "{:?}", report.error);
    assert_eq!(report.hints_merged, 0);
    assert!(!report.artifacts.is_empty());
}

#[tokio::test]
async fn test_report_json_round_trips() {
    let dir = tempdir().unwrap();
    write(dir.path(), "main.tf", NETWORK);

    let report = Engine::default().analyze(dir.path()).await;
    let json = report.to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["operation"], "analyze");
    assert_eq!(value["stage"], "done");
    assert_eq!(value["summary"]["node_count"], 2);
    assert!(value["findings"].is_array());
}
