//! Report rendering.

use std::fmt;

use anyhow::Result;
use terrane_core::{ExitStatus, InvocationReport};
use terrane_model::Severity;

use super::OutputFormat;

fn severity_icon(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => "❌",
        Severity::Warning => "⚠️ ",
        Severity::Info => "ℹ️ ",
    }
}

/// Human-readable report.
pub fn render_text(report: &InvocationReport) -> String {
    TextReport(report).to_string()
}

struct TextReport<'a>(&'a InvocationReport);

impl fmt::Display for TextReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.0;
        let dialect = report
            .source_dialect
            .map(|d| d.to_string())
            .unwrap_or_else(|| "unknown dialect".to_string());
        writeln!(f, "📋 {} {} ({})", report.operation, report.source.display(), dialect)?;

        if let Some(summary) = &report.summary {
            writeln!(f, "   {} resources, {} edges", summary.node_count, summary.edge_count)?;
            for (resource_type, count) in &summary.types {
                writeln!(f, "      {:<28} {}", resource_type, count)?;
            }
            if !summary.providers.is_empty() {
                let providers: Vec<String> = summary
                    .providers
                    .iter()
                    .map(|(name, count)| format!("{} ({})", name, count))
                    .collect();
                writeln!(f, "   providers: {}", providers.join(", "))?;
            }
            if !summary.environments.is_empty() {
                writeln!(f, "   environments: {}", summary.environments.join(", "))?;
            }
        }

        for error in &report.parse_errors {
            let location = match error.line {
                Some(line) => format!("{}:{}", error.file, line),
                None => error.file.clone(),
            };
            writeln!(f, "   ⚠️  parse error {}: {}", location, error.message)?;
        }
        for warning in &report.normalization_warnings {
            writeln!(f, "   ⚠️  {}: {}", warning.kind.as_str(), warning.message)?;
        }

        if !report.findings.is_empty() {
            writeln!(f)?;
            writeln!(f, "🔒 Findings:")?;
            for finding in &report.findings {
                writeln!(
                    f,
                    "   {} {} [{}] {}: {}",
                    severity_icon(finding.severity),
                    finding.severity.as_str(),
                    finding.rule_id,
                    finding.target.id(),
                    finding.message
                )?;
            }
        }

        if !report.changes.is_empty() {
            writeln!(f)?;
            writeln!(f, "🔧 Changes:")?;
            for change in &report.changes {
                writeln!(f, "   - {}", change)?;
            }
        }

        for warning in &report.emission_warnings {
            writeln!(f, "   ⚠️  {}: {}", warning.kind.as_str(), warning.message)?;
        }

        if !report.written.is_empty() {
            writeln!(f)?;
            writeln!(f, "📁 Wrote {} files:", report.written.len())?;
            for path in &report.written {
                writeln!(f, "   {}", path.display())?;
            }
        }

        writeln!(f)?;
        if let Some(error) = &report.error {
            return writeln!(f, "❌ {} failed while {}: {}", report.operation, last_stage(report), error);
        }
        writeln!(f, "{}", report.finding_summary())?;
        match report.exit_status() {
            ExitStatus::Clean => writeln!(f, "✅ {} completed", report.operation),
            _ => writeln!(f, "⚠️  {} completed with findings", report.operation),
        }
    }
}

/// Stage the invocation was in before it failed.
fn last_stage(report: &InvocationReport) -> String {
    let stages = report.stages();
    stages
        .iter()
        .rev()
        .find(|stage| !stage.is_terminal())
        .map(|stage| stage.to_string())
        .unwrap_or_else(|| "starting".to_string())
}

/// Print `report` and return the status to exit with.
pub fn print_report(report: &InvocationReport, format: OutputFormat) -> Result<ExitStatus> {
    match format {
        OutputFormat::Json => println!("{}", report.to_json()?),
        OutputFormat::Text => print!("{}", render_text(report)),
    }
    Ok(report.exit_status())
}

/// Emitted text for callers that did not ask for files.
pub fn print_artifacts(report: &InvocationReport) {
    for (path, content) in &report.artifacts {
        println!("--- {} ---", path);
        print!("{}", content);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use terrane_core::{CoreError, Operation, Stage};
    use terrane_model::{FindingTarget, ValidationFinding};

    #[test]
    fn test_failed_report_names_stage() {
        let mut report = InvocationReport::new(Operation::Analyze, "infra");
        report.transition(Stage::Normalizing).unwrap();
        report.fail(&CoreError::NoResources("infra".into()));

        let text = render_text(&report);
        assert!(text.contains("analyze failed while normalizing"));
    }

    #[test]
    fn test_findings_are_listed() {
        let mut report = InvocationReport::new(Operation::Validate, "infra");
        report.findings.push(ValidationFinding::new(
            Severity::Error,
            "security.open-ingress",
            FindingTarget::node("aws_security_group.web"),
            "ingress open to 0.0.0.0/0",
        ));

        let text = render_text(&report);
        assert!(text.contains("error [security.open-ingress] aws_security_group.web: ingress open to 0.0.0.0/0"));
        assert!(text.contains("1 findings (1 errors, 0 warnings, 0 info)"));
    }

    #[test]
    fn test_summary_lists_providers_and_environments() {
        let mut graph = terrane_model::ResourceGraph::new(terrane_model::Dialect::Kubernetes);
        graph
            .add_node(
                terrane_model::ResourceNode::new("configmap/app", "config.map")
                    .with_metadata(terrane_model::MetadataBag::for_dialect(terrane_model::Dialect::Kubernetes))
                    .with_origin(terrane_model::SourceOrigin::new("overlays/prod/app.yaml", Some(1))),
            )
            .unwrap();
        let mut report = InvocationReport::new(Operation::Analyze, "infra");
        report.summary = Some(graph.summary());

        let text = render_text(&report);
        assert!(text.contains("   providers: kubernetes (1)"));
        assert!(text.contains("   environments: production"));
    }
}
