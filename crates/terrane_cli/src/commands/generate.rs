//! Generate command - Emit a source tree into another dialect.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use tracing::info;

use terrane_core::ExitStatus;

use super::output::print_report;
use super::Context;

#[derive(Args)]
pub struct GenerateArgs {
    /// Source file or directory; its dialect is inferred
    pub source: PathBuf,

    /// Target dialect (terraform, cloudformation, kubernetes, ansible)
    #[arg(short, long)]
    pub target: String,

    /// Directory to write the generated files to
    #[arg(short, long)]
    pub output: PathBuf,
}

pub async fn execute(args: GenerateArgs, context: &Context) -> Result<ExitStatus> {
    info!("Generating {} from {}", args.target, args.source.display());
    let report = context
        .engine()?
        .generate(&args.source, &args.target, &args.output)
        .await;
    print_report(&report, context.format)
}
