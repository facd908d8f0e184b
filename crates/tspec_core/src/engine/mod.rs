//! Configuration evaluation.
//!
//! An [`Engine`] turns a [`Configuration`] plus inputs into a [`Plan`],
//! talking to providers only through the transports handed out by a
//! [`TransportFactory`].

mod configuration;
mod functions;
mod hcl_engine;
mod version;

use std::sync::Arc;

use async_trait::async_trait;
use tspec_provider::{Transport, TransportResult};
use tspec_spec::{ProviderIdentity, ValueMap};

use crate::error::EngineResult;
use crate::plan::Plan;

pub use self::configuration::{ConfigFile, Configuration, CONFIG_EXTENSION};
pub use self::hcl_engine::{HclEngine, ENGINE_VERSION};
pub use self::version::{Version, VersionConstraint};

/// Hands out the transport for each provider identity.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn transport(&self, identity: &ProviderIdentity) -> TransportResult<Arc<dyn Transport>>;
}

/// Inputs of one evaluation.
#[derive(Debug, Clone)]
pub struct EvaluationRequest {
    pub configuration: Configuration,
    pub variables: ValueMap,
    pub workspace: String,
}

/// Evaluates configurations into plans.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Engine version checked against `required_version`.
    fn version(&self) -> Version;

    async fn compute_plan(
        &self,
        request: &EvaluationRequest,
        transports: &dyn TransportFactory,
    ) -> EngineResult<Plan>;
}
