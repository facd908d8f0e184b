//! # tspec_core
//!
//! Plan computation and assertion checking for terraspec.
//!
//! # Architecture
//!
//! - **Engine**: evaluates a configuration into a [`Plan`], talking to providers through transports
//! - **Driver**: runs the engine with every provider behind an interceptor
//! - **Matcher**: reconciles the plan with the specification into verdicts
//! - **Runner**: executes scenario directories end to end
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tspec_core::{discover, HclEngine, RunnerConfig, ScenarioRunner};
//!
//! let config = RunnerConfig::load_or_default(".".as_ref())?;
//! let scenarios = discover(&config.spec_dir, ".".as_ref())?;
//! let runner = ScenarioRunner::new(Arc::new(HclEngine::new()), Arc::new(config.launcher()));
//! let report = runner.run_all(&scenarios).await;
//! assert!(report.passed());
//! ```

pub mod config;
pub mod discovery;
pub mod driver;
pub mod engine;
pub mod error;
pub mod matcher;
pub mod plan;
pub mod runner;
pub mod variables;

pub use config::{RunnerConfig, CONFIG_FILE};
pub use discovery::{discover, Scenario};
pub use driver::{DriverOptions, PlanDriver};
pub use engine::{
    Configuration, Engine, EvaluationRequest, HclEngine, TransportFactory, Version,
    VersionConstraint, ENGINE_VERSION,
};
pub use error::{CoreError, CoreResult, EngineError, EngineResult, ErrorKind};
pub use matcher::{AssertionMatcher, Outcome, Verdict};
pub use plan::{OutputValue, Plan, PlannedInstance};
pub use runner::{RunReport, ScenarioError, ScenarioReport, ScenarioRunner};
pub use variables::load_tfvars;
