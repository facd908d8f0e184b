//! Run command - Plan scenarios and check their assertions.

use std::sync::Arc;

use anyhow::Result;
use clap::{Args, ValueEnum};
use tspec_core::{
    DriverOptions, HclEngine, Outcome, RunReport, ScenarioReport, ScenarioRunner,
};

use super::ScenarioArgs;
use crate::ExitCodes;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub scenarios: ScenarioArgs,

    /// Evaluate even if required_version excludes the engine version
    #[arg(long)]
    pub ignore_required_version: bool,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

pub async fn execute(args: RunArgs) -> Result<u8> {
    let (config, scenarios) = args.scenarios.load()?;

    let options = DriverOptions::default().ignore_required_version(args.ignore_required_version);
    let runner = ScenarioRunner::new(Arc::new(HclEngine::new()), Arc::new(config.launcher()))
        .with_options(options);
    let report = runner.run_all(&scenarios).await;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_report(&report),
    }

    Ok(exit_code(&report))
}

fn exit_code(report: &RunReport) -> u8 {
    if report.has_errors() {
        ExitCodes::SCENARIO_ERROR
    } else if !report.passed() {
        ExitCodes::ASSERTION_FAILURE
    } else {
        ExitCodes::SUCCESS
    }
}

fn print_report(report: &RunReport) {
    for scenario in &report.scenarios {
        print_scenario(scenario);
    }

    println!();
    if report.passed() {
        println!(
            "✅ All {} scenario(s) passed in {} ms",
            report.scenarios.len(),
            report.duration_ms
        );
    } else {
        println!(
            "❌ {} of {} scenario(s) failed",
            report.failed_count(),
            report.scenarios.len()
        );
    }
}

fn print_scenario(scenario: &ScenarioReport) {
    let marker = if scenario.passed() { "✅" } else { "❌" };
    println!("{} {} ({} ms)", marker, scenario.name, scenario.duration_ms);

    if let Some(error) = &scenario.error {
        println!("   💥 {:?}: {}", error.kind, error.message);
        return;
    }

    for verdict in &scenario.verdicts {
        match &verdict.outcome {
            Outcome::Pass => println!("   ✓ {}", verdict.label),
            Outcome::Fail { mismatches } => {
                println!("   ✗ {} ({})", verdict.label, verdict.source);
                for mismatch in mismatches {
                    println!("      - {}", mismatch);
                }
            }
            other => println!("   ✗ {}: {} ({})", verdict.label, other, verdict.source),
        }
    }
    for warning in &scenario.warnings {
        println!("   ⚠️  {}", warning);
    }
}
