//! Analyze command - Summarize a source tree and report findings.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use tracing::info;

use terrane_core::ExitStatus;

use super::output::print_report;
use super::Context;

#[derive(Args)]
pub struct AnalyzeArgs {
    /// Source file or directory
    #[arg(default_value = ".")]
    pub source: PathBuf,
}

pub async fn execute(args: AnalyzeArgs, context: &Context) -> Result<ExitStatus> {
    info!("Analyzing {}", args.source.display());
    let report = context.engine()?.analyze(&args.source).await;
    print_report(&report, context.format)
}
