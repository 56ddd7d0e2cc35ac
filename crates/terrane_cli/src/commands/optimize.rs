//! Optimize command - Optimize a source tree and emit it in its own dialect.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use tracing::info;

use terrane_core::ExitStatus;

use super::output::{print_artifacts, print_report};
use super::{Context, OutputFormat};

#[derive(Args)]
pub struct OptimizeArgs {
    /// Source file or directory
    #[arg(default_value = ".")]
    pub source: PathBuf,

    /// Source dialect; inferred from the files when omitted
    #[arg(short, long)]
    pub dialect: Option<String>,

    /// Directory to write the optimized files to; printed when omitted
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub async fn execute(args: OptimizeArgs, context: &Context) -> Result<ExitStatus> {
    info!("Optimizing {}", args.source.display());
    let report = context
        .engine()?
        .optimize(&args.source, args.dialect.as_deref(), args.output.as_deref())
        .await;

    if args.output.is_none() && context.format == OutputFormat::Text && !report.is_failed() {
        print_artifacts(&report);
        println!();
    }
    print_report(&report, context.format)
}
