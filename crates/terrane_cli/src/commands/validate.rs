//! Validate command - Report findings for a source tree.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use tracing::info;

use terrane_core::ExitStatus;

use super::output::print_report;
use super::Context;

#[derive(Args)]
pub struct ValidateArgs {
    /// Source file or directory
    #[arg(default_value = ".")]
    pub source: PathBuf,

    /// Source dialect; inferred from the files when omitted
    #[arg(short, long)]
    pub dialect: Option<String>,
}

pub async fn execute(args: ValidateArgs, context: &Context) -> Result<ExitStatus> {
    info!("Validating {}", args.source.display());
    let report = context
        .engine()?
        .validate(&args.source, args.dialect.as_deref())
        .await;
    print_report(&report, context.format)
}
