//! Provider process management.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};
use tspec_spec::ProviderIdentity;

use crate::error::{TransportError, TransportResult};
use crate::stdio::StdioTransport;
use crate::transport::Transport;

/// How to start the provider for one provider type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderCommand {
    /// Program followed by its arguments.
    pub command: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl ProviderCommand {
    pub fn new<I, S>(command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into_iter().map(Into::into).collect(),
            env: HashMap::new(),
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Starts and stops provider connections, one per provider identity.
#[async_trait]
pub trait ProviderLauncher: Send + Sync {
    /// Connect to the provider for `identity`, reusing an existing connection.
    async fn connect(&self, identity: &ProviderIdentity) -> TransportResult<Arc<dyn Transport>>;

    async fn shutdown(&self, identity: &ProviderIdentity) -> TransportResult<()>;

    async fn shutdown_all(&self) -> TransportResult<()>;
}

/// Launches provider executables configured per provider type.
pub struct ProcessLauncher {
    commands: HashMap<String, ProviderCommand>,
    connections: Mutex<HashMap<ProviderIdentity, Arc<StdioTransport>>>,
}

impl ProcessLauncher {
    pub fn new(commands: HashMap<String, ProviderCommand>) -> Self {
        Self {
            commands,
            connections: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_provider(mut self, provider_type: impl Into<String>, command: ProviderCommand) -> Self {
        self.commands.insert(provider_type.into(), command);
        self
    }

    /// Provider types with a configured command.
    pub fn provider_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.commands.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

#[async_trait]
impl ProviderLauncher for ProcessLauncher {
    async fn connect(&self, identity: &ProviderIdentity) -> TransportResult<Arc<dyn Transport>> {
        let mut connections = self.connections.lock().await;
        if let Some(existing) = connections.get(identity) {
            return Ok(existing.clone());
        }

        let command = self
            .commands
            .get(&identity.provider_type)
            .ok_or_else(|| TransportError::Launch {
                provider: identity.to_string(),
                message: format!(
                    "no command configured for provider type `{}`",
                    identity.provider_type
                ),
            })?;
        info!(provider = %identity, "Launching provider");
        let transport = Arc::new(StdioTransport::spawn(identity.to_string(), command)?);
        connections.insert(identity.clone(), transport.clone());
        Ok(transport)
    }

    async fn shutdown(&self, identity: &ProviderIdentity) -> TransportResult<()> {
        let transport = self.connections.lock().await.remove(identity);
        match transport {
            Some(transport) => transport.shutdown().await,
            None => Ok(()),
        }
    }

    async fn shutdown_all(&self) -> TransportResult<()> {
        let connections: Vec<_> = self.connections.lock().await.drain().collect();
        let mut first_error = None;
        for (identity, transport) in connections {
            if let Err(e) = transport.shutdown().await {
                warn!(provider = %identity, error = %e, "Failed to stop provider");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
