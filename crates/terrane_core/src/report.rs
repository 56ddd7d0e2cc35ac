//! The structured report every invocation returns, even on failure.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use terrane_model::{
    Dialect, EmissionWarning, GraphSummary, NormalizationWarning, ParseError, ResourceGraph, Severity,
    ValidationFinding,
};
use terrane_optimize::OptimizationChange;
use terrane_policy::FindingSummary;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::stage::{Operation, Stage};

/// Process exit status derived from a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitStatus {
    /// Succeeded with nothing to report
    Clean,
    /// Stopped on a fatal error
    Fatal,
    /// Rejected before running
    InvalidArguments,
    /// Succeeded with warning or error findings, or parse errors
    Findings,
}

impl ExitStatus {
    pub fn code(&self) -> u8 {
        match self {
            ExitStatus::Clean => 0,
            ExitStatus::Fatal => 1,
            ExitStatus::InvalidArguments => 2,
            ExitStatus::Findings => 3,
        }
    }
}

/// Entry into one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub entered_at: DateTime<Utc>,
}

/// Everything one invocation produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationReport {
    /// Unique invocation ID
    pub id: Uuid,
    pub operation: Operation,
    /// Source file or directory
    pub source: PathBuf,
    pub source_dialect: Option<Dialect>,
    pub target_dialect: Option<Dialect>,
    /// Directory artifacts were written to
    pub output: Option<PathBuf>,
    /// Current or final stage
    pub stage: Stage,
    /// Stages entered, in order
    pub history: Vec<StageRecord>,
    /// Counts over the normalized graph
    pub summary: Option<GraphSummary>,
    pub parse_errors: Vec<ParseError>,
    pub normalization_warnings: Vec<NormalizationWarning>,
    /// Sorted by severity, target, then rule
    pub findings: Vec<ValidationFinding>,
    pub changes: Vec<OptimizationChange>,
    pub emission_warnings: Vec<EmissionWarning>,
    /// Emitted text keyed by relative path
    pub artifacts: BTreeMap<String, String>,
    /// Files written below `output`
    pub written: Vec<PathBuf>,
    /// Advisory hints merged before emission
    pub hints_merged: usize,
    /// Fatal error message
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Final graph, kept for embedding callers
    #[serde(skip)]
    pub graph: Option<ResourceGraph>,
}

impl InvocationReport {
    pub fn new(operation: Operation, source: impl Into<PathBuf>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            operation,
            source: source.into(),
            source_dialect: None,
            target_dialect: None,
            output: None,
            stage: Stage::Parsing,
            history: vec![StageRecord {
                stage: Stage::Parsing,
                entered_at: now,
            }],
            summary: None,
            parse_errors: Vec::new(),
            normalization_warnings: Vec::new(),
            findings: Vec::new(),
            changes: Vec::new(),
            emission_warnings: Vec::new(),
            artifacts: BTreeMap::new(),
            written: Vec::new(),
            hints_merged: 0,
            error: None,
            started_at: now,
            completed_at: None,
            graph: None,
        }
    }

    /// Move to `next`, rejecting illegal transitions.
    pub fn transition(&mut self, next: Stage) -> CoreResult<()> {
        if !self.stage.can_transition(next) {
            return Err(CoreError::InvalidTransition {
                from: self.stage.to_string(),
                to: next.to_string(),
            });
        }
        info!("[{}] {} -> {}", self.operation, self.stage, next);
        self.stage = next;
        let now = Utc::now();
        self.history.push(StageRecord {
            stage: next,
            entered_at: now,
        });
        if next.is_terminal() {
            self.completed_at = Some(now);
        }
        Ok(())
    }

    /// Record a fatal error and end in `failed`.
    pub fn fail(&mut self, err: &CoreError) {
        error!("[{}] failed while {}: {}", self.operation, self.stage, err);
        self.error = Some(err.to_string());
        if self.transition(Stage::Failed).is_err() {
            self.stage = Stage::Failed;
            self.completed_at = Some(Utc::now());
        }
    }

    pub fn is_failed(&self) -> bool {
        self.stage == Stage::Failed
    }

    pub fn is_done(&self) -> bool {
        self.stage == Stage::Done
    }

    /// Stages entered, without timestamps.
    pub fn stages(&self) -> Vec<Stage> {
        self.history.iter().map(|r| r.stage).collect()
    }

    pub fn finding_summary(&self) -> FindingSummary {
        FindingSummary::of(&self.findings)
    }

    /// Findings at or above `severity`.
    pub fn findings_at_least(&self, severity: Severity) -> impl Iterator<Item = &ValidationFinding> {
        self.findings.iter().filter(move |f| f.severity >= severity)
    }

    pub fn exit_status(&self) -> ExitStatus {
        if self.is_failed() {
            ExitStatus::Fatal
        } else if self.findings_at_least(Severity::Warning).next().is_some() || !self.parse_errors.is_empty() {
            ExitStatus::Findings
        } else {
            ExitStatus::Clean
        }
    }

    pub fn to_json(&self) -> CoreResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| CoreError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use terrane_model::FindingTarget;

    #[test]
    fn test_transitions_are_recorded() {
        let mut report = InvocationReport::new(Operation::Validate, "infra");
        report.transition(Stage::Normalizing).unwrap();
        report.transition(Stage::Validating).unwrap();
        report.transition(Stage::Done).unwrap();

        assert_eq!(
            report.stages(),
            vec![Stage::Parsing, Stage::Normalizing, Stage::Validating, Stage::Done]
        );
        assert!(report.completed_at.is_some());
        assert!(report.transition(Stage::Emitting).is_err());
    }

    #[test]
    fn test_fail_from_any_stage() {
        let mut report = InvocationReport::new(Operation::Analyze, "infra");
        report.fail(&CoreError::NoResources("infra".into()));
        assert!(report.is_failed());
        assert_eq!(report.exit_status(), ExitStatus::Fatal);
        assert_eq!(report.exit_status().code(), 1);
        assert!(report.error.as_deref().unwrap().contains("No resources"));
    }

    #[test]
    fn test_exit_status_reflects_findings() {
        let mut report = InvocationReport::new(Operation::Validate, "infra");
        report.transition(Stage::Normalizing).unwrap();
        report.transition(Stage::Validating).unwrap();
        report.transition(Stage::Done).unwrap();
        assert_eq!(report.exit_status(), ExitStatus::Clean);

        report.findings.push(ValidationFinding::new(
            Severity::Info,
            "structural.opaque-resource",
            FindingTarget::node("a"),
            "opaque",
        ));
        assert_eq!(report.exit_status(), ExitStatus::Clean);

        report.findings.push(ValidationFinding::new(
            Severity::Warning,
            "best-practice.missing-tags",
            FindingTarget::node("a"),
            "no tags",
        ));
        assert_eq!(report.exit_status(), ExitStatus::Findings);
        assert_eq!(report.exit_status().code(), 3);
    }

    #[test]
    fn test_report_serializes() {
        let report = InvocationReport::new(Operation::Convert, "infra");
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["operation"], "convert");
        assert_eq!(json["stage"], "parsing");
        assert!(json.get("graph").is_none());
    }
}
