//! Convert command - Convert between two explicit dialects.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use tracing::info;

use terrane_core::ExitStatus;

use super::output::print_report;
use super::Context;

#[derive(Args)]
pub struct ConvertArgs {
    /// Source file or directory
    pub source: PathBuf,

    /// Source dialect
    #[arg(long)]
    pub from: String,

    /// Target dialect
    #[arg(long)]
    pub to: String,

    /// Directory to write the converted files to
    #[arg(short, long)]
    pub output: PathBuf,
}

pub async fn execute(args: ConvertArgs, context: &Context) -> Result<ExitStatus> {
    info!("Converting {} from {} to {}", args.source.display(), args.from, args.to);
    let report = context
        .engine()?
        .convert(&args.source, &args.from, &args.to, &args.output)
        .await;
    print_report(&report, context.format)
}
