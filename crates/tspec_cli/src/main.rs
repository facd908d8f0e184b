//! terraspec CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments
//! - 3: Assertion failure
//! - 4: Scenario error

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use tspec_core::CoreError;

mod commands;

use commands::{Cli, Commands};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const ASSERTION_FAILURE: u8 = 3;
    pub const SCENARIO_ERROR: u8 = 4;
}

const LOG_TARGETS: &[&str] = &["terraspec", "tspec_core", "tspec_provider", "tspec_spec"];

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directives: Vec<String> = LOG_TARGETS
            .iter()
            .map(|target| format!("{}={}", target, level))
            .collect();
        EnvFilter::new(format!("warn,{}", directives.join(",")))
    });

    // Logs go to stderr so `--format json` output stays parseable.
    let log_result = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();

    if log_result.is_err() {
        // Logging already initialized, continue
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Run(args) => commands::run::execute(args).await,
        Commands::Check(args) => commands::check::execute(args).await,
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("❌ Error: {:#}", e);
            ExitCode::from(categorize_error(&e))
        }
    }
}

/// Categorize error to determine exit code
fn categorize_error(e: &anyhow::Error) -> u8 {
    if e.downcast_ref::<glob::PatternError>().is_some() {
        return ExitCodes::INVALID_ARGS;
    }
    match e.downcast_ref::<CoreError>() {
        Some(CoreError::Config(_)) => ExitCodes::INVALID_ARGS,
        Some(_) => ExitCodes::SCENARIO_ERROR,
        None => ExitCodes::GENERAL_ERROR,
    }
}
