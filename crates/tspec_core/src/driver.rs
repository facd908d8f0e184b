//! Plan driver: one evaluation run with intercepted providers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use tspec_provider::{Interceptor, MockRegistry, ProviderLauncher, Transport, TransportResult};
use tspec_spec::{ProviderIdentity, Settings, ValueMap};

use crate::engine::{Configuration, Engine, EvaluationRequest, TransportFactory, VersionConstraint};
use crate::error::{CoreError, CoreResult};
use crate::plan::Plan;

/// Options for a driver run.
#[derive(Debug, Clone, Default)]
pub struct DriverOptions {
    /// Evaluate even when `required_version` excludes the engine version.
    pub ignore_required_version: bool,
}

impl DriverOptions {
    pub fn ignore_required_version(mut self, ignore: bool) -> Self {
        self.ignore_required_version = ignore;
        self
    }
}

/// Runs an [`Engine`] with every provider wrapped in an [`Interceptor`].
#[derive(Clone)]
pub struct PlanDriver {
    engine: Arc<dyn Engine>,
    launcher: Arc<dyn ProviderLauncher>,
}

impl PlanDriver {
    pub fn new(engine: Arc<dyn Engine>, launcher: Arc<dyn ProviderLauncher>) -> Self {
        Self { engine, launcher }
    }

    /// Compute the plan of `configuration`.
    ///
    /// Every provider connected during the run is shut down before this
    /// returns, whether evaluation succeeded or not. If the returned future
    /// is dropped early the shutdown is spawned onto the current runtime.
    pub async fn run(
        &self,
        mut configuration: Configuration,
        variables: ValueMap,
        settings: &Settings,
        registry: Arc<MockRegistry>,
        options: &DriverOptions,
    ) -> CoreResult<Plan> {
        self.check_required_version(&mut configuration, options)?;

        let request = EvaluationRequest {
            configuration,
            variables,
            workspace: settings.workspace().to_string(),
        };
        info!(
            dir = ?request.configuration.dir,
            workspace = %request.workspace,
            mocks = registry.mock_count(),
            "Computing plan"
        );

        let scope = ProviderScope::new(self.launcher.clone());
        let factory = InterceptingFactory::new(self.launcher.clone(), registry);
        let result = self.engine.compute_plan(&request, &factory).await;

        scope.close().await;
        result.map_err(CoreError::from)
    }

    fn check_required_version(&self, configuration: &mut Configuration, options: &DriverOptions) -> CoreResult<()> {
        let Some(declared) = configuration.required_version.clone() else {
            return Ok(());
        };
        let version = self.engine.version();
        let constraint = VersionConstraint::parse(&declared).map_err(|message| CoreError::Evaluation {
            address: "terraform".to_string(),
            message,
        })?;
        if constraint.matches(&version) {
            return Ok(());
        }
        if options.ignore_required_version {
            warn!(
                required = %constraint,
                engine = %version,
                "Ignoring required_version; evaluating with the engine version"
            );
            configuration.pin_version(&version);
            return Ok(());
        }
        Err(CoreError::Evaluation {
            address: "terraform".to_string(),
            message: format!(
                "this configuration requires version {}, but the engine is {}",
                constraint, version
            ),
        })
    }
}

/// Shuts down every connected provider when the run ends or is abandoned.
struct ProviderScope {
    launcher: Option<Arc<dyn ProviderLauncher>>,
}

impl ProviderScope {
    fn new(launcher: Arc<dyn ProviderLauncher>) -> Self {
        Self {
            launcher: Some(launcher),
        }
    }

    async fn close(mut self) {
        if let Some(launcher) = self.launcher.clone() {
            shutdown_providers(launcher).await;
        }
        self.launcher = None;
    }
}

impl Drop for ProviderScope {
    fn drop(&mut self) {
        let Some(launcher) = self.launcher.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("Plan run abandoned; shutting down providers in the background");
                handle.spawn(shutdown_providers(launcher));
            }
            Err(_) => warn!("Plan run abandoned outside a runtime; providers stop when their handles drop"),
        }
    }
}

async fn shutdown_providers(launcher: Arc<dyn ProviderLauncher>) {
    if let Err(e) = launcher.shutdown_all().await {
        warn!(error = %e, "Failed to shut down providers");
    }
}

/// Connects each provider identity once and wraps it in an interceptor.
struct InterceptingFactory {
    launcher: Arc<dyn ProviderLauncher>,
    registry: Arc<MockRegistry>,
    transports: Mutex<HashMap<ProviderIdentity, Arc<dyn Transport>>>,
}

impl InterceptingFactory {
    fn new(launcher: Arc<dyn ProviderLauncher>, registry: Arc<MockRegistry>) -> Self {
        Self {
            launcher,
            registry,
            transports: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl TransportFactory for InterceptingFactory {
    async fn transport(&self, identity: &ProviderIdentity) -> TransportResult<Arc<dyn Transport>> {
        let mut transports = self.transports.lock().await;
        if let Some(existing) = transports.get(identity) {
            return Ok(existing.clone());
        }
        let upstream = self.launcher.connect(identity).await?;
        let interceptor: Arc<dyn Transport> =
            Arc::new(Interceptor::new(identity.clone(), upstream, self.registry.clone()));
        transports.insert(identity.clone(), interceptor.clone());
        debug!(provider = %identity, "Provider connected through interceptor");
        Ok(interceptor)
    }
}
