//! Scenario runner.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use tspec_provider::{MockRegistry, ProviderLauncher};
use tspec_spec::{SpecError, SpecParser, SpecValidator, Specification, ValueMap};

use crate::discovery::Scenario;
use crate::driver::{DriverOptions, PlanDriver};
use crate::engine::{Configuration, Engine};
use crate::error::{CoreError, CoreResult, ErrorKind};
use crate::matcher::{AssertionMatcher, Verdict};
use crate::variables::load_tfvars;

/// A fatal scenario error: the configuration or specification is broken.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&CoreError> for ScenarioError {
    fn from(err: &CoreError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Outcome of one scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub name: String,
    pub verdicts: Vec<Verdict>,
    pub error: Option<ScenarioError>,
    pub warnings: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl ScenarioReport {
    /// No fatal error and every verdict passed.
    pub fn passed(&self) -> bool {
        self.error.is_none() && self.verdicts.iter().all(Verdict::passed)
    }

    pub fn failed_verdicts(&self) -> impl Iterator<Item = &Verdict> {
        self.verdicts.iter().filter(|v| !v.passed())
    }
}

/// Outcome of a full run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub scenarios: Vec<ScenarioReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        self.scenarios.iter().all(ScenarioReport::passed)
    }

    pub fn passed_count(&self) -> usize {
        self.scenarios.iter().filter(|s| s.passed()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.scenarios.len() - self.passed_count()
    }

    /// True if any scenario stopped on a fatal error.
    pub fn has_errors(&self) -> bool {
        self.scenarios.iter().any(|s| s.error.is_some())
    }
}

/// Runs scenarios end to end: parse, pre-flight, plan, match.
pub struct ScenarioRunner {
    driver: PlanDriver,
    options: DriverOptions,
}

impl ScenarioRunner {
    pub fn new(engine: Arc<dyn Engine>, launcher: Arc<dyn ProviderLauncher>) -> Self {
        Self {
            driver: PlanDriver::new(engine, launcher),
            options: DriverOptions::default(),
        }
    }

    pub fn with_options(mut self, options: DriverOptions) -> Self {
        self.options = options;
        self
    }

    /// Parse and pre-flight a scenario without evaluating anything.
    ///
    /// Returns the specification and the pre-flight warnings.
    pub fn check(scenario: &Scenario) -> CoreResult<(Specification, Vec<String>)> {
        if scenario.spec_files.is_empty() {
            return Err(SpecError::NoSpecFiles(scenario.spec_dir.clone()).into());
        }
        let spec = SpecParser::parse_files(&scenario.spec_files)?;
        let warnings = SpecValidator::validate(&spec).into_result()?;
        debug!(
            scenario = %scenario.name,
            assertions = spec.assertions.len(),
            mocks = spec.mocks.len(),
            "Specification checked"
        );
        Ok((spec, warnings))
    }

    /// Run one scenario. Errors are reported, never returned.
    pub async fn run(&self, scenario: &Scenario) -> ScenarioReport {
        let started_at = Utc::now();
        info!(scenario = %scenario.name, "Running scenario");

        let mut warnings = Vec::new();
        let (verdicts, error) = match self.execute(scenario, &mut warnings).await {
            Ok(verdicts) => (verdicts, None),
            Err(e) => {
                error!(scenario = %scenario.name, error = %e, "Scenario failed");
                (Vec::new(), Some(ScenarioError::from(&e)))
            }
        };

        let finished_at = Utc::now();
        let report = ScenarioReport {
            name: scenario.name.clone(),
            verdicts,
            error,
            warnings,
            started_at,
            finished_at,
            duration_ms: (finished_at - started_at).num_milliseconds().max(0) as u64,
        };
        if report.error.is_none() {
            info!(
                scenario = %report.name,
                passed = report.verdicts.iter().filter(|v| v.passed()).count(),
                failed = report.failed_verdicts().count(),
                "Scenario finished"
            );
        }
        report
    }

    /// Run scenarios one after another.
    pub async fn run_all(&self, scenarios: &[Scenario]) -> RunReport {
        let started_at = Utc::now();
        let mut reports = Vec::with_capacity(scenarios.len());
        for scenario in scenarios {
            reports.push(self.run(scenario).await);
        }
        let finished_at = Utc::now();
        RunReport {
            scenarios: reports,
            started_at,
            finished_at,
            duration_ms: (finished_at - started_at).num_milliseconds().max(0) as u64,
        }
    }

    async fn execute(&self, scenario: &Scenario, warnings: &mut Vec<String>) -> CoreResult<Vec<Verdict>> {
        let (spec, checked) = Self::check(scenario)?;
        warnings.extend(checked);

        let registry = Arc::new(MockRegistry::from_spec(&spec));
        let configuration = Configuration::load(&scenario.config_dir)?;
        let variables = match &scenario.var_file {
            Some(path) => load_tfvars(path)?,
            None => ValueMap::new(),
        };

        let plan = self
            .driver
            .run(configuration, variables, &spec.settings(), registry, &self.options)
            .await?;

        for address in AssertionMatcher::unasserted(&plan, &spec) {
            debug!(scenario = %scenario.name, address = %address, "Planned resource has no assertion");
        }
        let verdicts = AssertionMatcher::evaluate(&plan, &spec);
        for verdict in verdicts.iter().filter(|v| !v.passed()) {
            warn!(scenario = %scenario.name, assertion = %verdict.label, outcome = %verdict.outcome, "Assertion failed");
        }
        Ok(verdicts)
    }
}
