//! Terrane CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success, nothing to report
//! - 1: Fatal failure
//! - 2: Invalid arguments or configuration
//! - 3: Success with findings

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

use commands::{Cli, Commands, Context};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const FATAL: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const FINDINGS: u8 = 3;
}

fn init_logging(verbose: bool, quiet: bool) {
    let default = if verbose {
        "terrane=debug,info"
    } else if quiet {
        "error"
    } else {
        "terrane=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // already initialized when embedded in tests
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let context = match Context::from_cli(&cli) {
        Ok(context) => context,
        Err(e) => {
            eprintln!("❌ Error: {:#}", e);
            return ExitCode::from(ExitCodes::INVALID_ARGS);
        }
    };

    let result = match cli.command {
        Commands::Analyze(args) => commands::analyze::execute(args, &context).await,
        Commands::Generate(args) => commands::generate::execute(args, &context).await,
        Commands::Validate(args) => commands::validate::execute(args, &context).await,
        Commands::Optimize(args) => commands::optimize::execute(args, &context).await,
        Commands::Convert(args) => commands::convert::execute(args, &context).await,
    };

    match result {
        Ok(status) => ExitCode::from(status.code()),
        Err(e) => {
            eprintln!("❌ Error: {:#}", e);
            ExitCode::from(ExitCodes::FATAL)
        }
    }
}
