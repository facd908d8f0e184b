//! Check command - Parse and pre-flight specifications without evaluating.

use anyhow::Result;
use clap::Args;
use tracing::info;
use tspec_core::ScenarioRunner;

use super::ScenarioArgs;
use crate::ExitCodes;

#[derive(Args)]
pub struct CheckArgs {
    #[command(flatten)]
    pub scenarios: ScenarioArgs,
}

pub async fn execute(args: CheckArgs) -> Result<u8> {
    let (_, scenarios) = args.scenarios.load()?;

    let mut all_passed = true;
    for scenario in &scenarios {
        match ScenarioRunner::check(scenario) {
            Ok((spec, warnings)) => {
                println!(
                    "✅ {}: {} assertion(s), {} mock(s)",
                    scenario.name,
                    spec.assertions.len(),
                    spec.mocks.len()
                );
                for warning in &warnings {
                    println!("   ⚠️  {}", warning);
                }
            }
            Err(e) => {
                all_passed = false;
                println!("❌ {}: {}", scenario.name, e);
            }
        }
    }

    info!(count = scenarios.len(), "Checked scenarios");
    println!();
    if all_passed {
        println!("✅ All specifications are valid");
        Ok(ExitCodes::SUCCESS)
    } else {
        println!("❌ Some specifications are invalid. Please fix the issues above.");
        Ok(ExitCodes::SCENARIO_ERROR)
    }
}
