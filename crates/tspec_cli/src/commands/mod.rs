//! CLI command definitions.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tspec_core::{discover, RunnerConfig, Scenario, CONFIG_FILE};

pub mod check;
pub mod run;

/// terraspec - specification tests for infrastructure configurations
#[derive(Parser)]
#[command(name = "terraspec")]
#[command(version, about = "terraspec - specification tests for infrastructure configurations")]
#[command(long_about = r#"
terraspec asserts what a configuration would create for a given set of
inputs, without provisioning anything. Data lookups are answered from mocks
declared in *.tfspec files, so runs are offline and deterministic.

COMMANDS:
  run    → Plan every scenario and check its assertions
  check  → Parse and pre-flight specifications only

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments
  3 - Assertion failure
  4 - Scenario error
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run scenarios and check their assertions
    Run(run::RunArgs),

    /// Parse and validate specifications without evaluating
    Check(check::CheckArgs),
}

/// Where to find the configuration and its scenarios.
#[derive(Args, Debug, Clone)]
pub struct ScenarioArgs {
    /// Directory holding the configuration under test
    #[arg(short, long, env = "TERRASPEC_DIR", default_value = ".")]
    pub dir: PathBuf,

    /// Spec root, relative to --dir (overrides terraspec.yaml)
    #[arg(long, env = "TERRASPEC_SPEC_DIR")]
    pub spec_dir: Option<PathBuf>,

    /// Run configuration file (default: <dir>/terraspec.yaml)
    #[arg(short, long, env = "TERRASPEC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Only scenarios whose name matches this glob
    #[arg(short, long)]
    pub scenario: Option<String>,
}

impl ScenarioArgs {
    /// Load the run configuration and the selected scenarios.
    pub fn load(&self) -> Result<(RunnerConfig, Vec<Scenario>)> {
        let mut config = match &self.config {
            Some(path) => RunnerConfig::load(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => RunnerConfig::load_or_default(&self.dir)
                .with_context(|| format!("Failed to load {}", self.dir.join(CONFIG_FILE).display()))?,
        };
        if let Some(spec_dir) = &self.spec_dir {
            config = config.with_spec_dir(spec_dir);
        }

        let spec_root = self.dir.join(&config.spec_dir);
        let scenarios = discover(&spec_root, &self.dir)?;
        let scenarios = filter_scenarios(scenarios, self.scenario.as_deref())?;
        info!(count = scenarios.len(), root = ?spec_root, "Selected scenarios");
        Ok((config, scenarios))
    }
}

/// Keep the scenarios whose name matches `pattern`.
pub fn filter_scenarios(scenarios: Vec<Scenario>, pattern: Option<&str>) -> Result<Vec<Scenario>> {
    let Some(pattern) = pattern else {
        return Ok(scenarios);
    };
    let pattern = glob::Pattern::new(pattern)?;
    let selected: Vec<Scenario> = scenarios
        .into_iter()
        .filter(|s| pattern.matches(&s.name))
        .collect();
    if selected.is_empty() {
        anyhow::bail!("No scenario matches `{}`", pattern);
    }
    Ok(selected)
}
