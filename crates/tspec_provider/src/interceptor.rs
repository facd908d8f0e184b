//! Provider transport interceptor.
//!
//! Sits between the evaluation engine and a real provider. Schema, configure,
//! validate and plan calls reach the provider; data reads are answered from
//! the [`MockRegistry`]; state reads report no prior object; applies are
//! refused.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};
use tspec_spec::ProviderIdentity;

use crate::error::{TransportError, TransportResult};
use crate::protocol::{
    ApplyRequest, ApplyResponse, ConfigureRequest, Diagnostic, PlanRequest, PlanResponse,
    ReadDataRequest, ReadDataResponse, ReadResourceRequest, ReadResourceResponse, Schema,
    ValidateRequest,
};
use crate::registry::{Lookup, MockRegistry};
use crate::transport::Transport;

/// Intercepting transport for one provider identity.
pub struct Interceptor {
    identity: ProviderIdentity,
    upstream: Arc<dyn Transport>,
    registry: Arc<MockRegistry>,
}

impl Interceptor {
    pub fn new(identity: ProviderIdentity, upstream: Arc<dyn Transport>, registry: Arc<MockRegistry>) -> Self {
        Self {
            identity,
            upstream,
            registry,
        }
    }

    pub fn identity(&self) -> &ProviderIdentity {
        &self.identity
    }
}

#[async_trait]
impl Transport for Interceptor {
    async fn get_schema(&self) -> TransportResult<Schema> {
        self.upstream.get_schema().await
    }

    async fn configure(&self, request: ConfigureRequest) -> TransportResult<Vec<Diagnostic>> {
        self.upstream.configure(request).await
    }

    async fn validate_resource_config(&self, request: ValidateRequest) -> TransportResult<Vec<Diagnostic>> {
        self.upstream.validate_resource_config(request).await
    }

    async fn validate_data_source_config(&self, request: ValidateRequest) -> TransportResult<Vec<Diagnostic>> {
        self.upstream.validate_data_source_config(request).await
    }

    async fn plan_resource_change(&self, request: PlanRequest) -> TransportResult<PlanResponse> {
        let address = request.address.clone();
        let mut response = self.upstream.plan_resource_change(request).await?;
        if let Some(overrides) = self.registry.computed_values(&address) {
            debug!(address = %address, attributes = overrides.len(), "Overlaying return values onto plan");
            response.planned_state.overlay(overrides);
        }
        Ok(response)
    }

    async fn read_resource(&self, request: ReadResourceRequest) -> TransportResult<ReadResourceResponse> {
        debug!(address = %request.address, "Answering state read with no prior object");
        Ok(ReadResourceResponse {
            new_state: None,
            diagnostics: Vec::new(),
        })
    }

    async fn read_data_source(&self, request: ReadDataRequest) -> TransportResult<ReadDataResponse> {
        let ReadDataRequest { address, config } = request;
        match self.registry.lookup(&address, &self.identity, &config) {
            Lookup::Found(returns) => {
                debug!(address = %address, provider = %self.identity, "Answering data read from mock");
                let mut state = config;
                state.overlay(returns);
                Ok(ReadDataResponse {
                    state,
                    diagnostics: Vec::new(),
                })
            }
            Lookup::NotFound if self.registry.allows_unmocked_reads() => {
                info!(address = %address, provider = %self.identity, "No mock for data read, echoing request");
                Ok(ReadDataResponse {
                    state: config,
                    diagnostics: Vec::new(),
                })
            }
            Lookup::NotFound => Err(TransportError::MockMissing {
                address,
                provider: self.identity.clone(),
            }),
            Lookup::Ambiguous(count) => Err(TransportError::MockAmbiguous {
                address,
                provider: self.identity.clone(),
                count,
            }),
        }
    }

    async fn apply_resource_change(&self, request: ApplyRequest) -> TransportResult<ApplyResponse> {
        Err(TransportError::UnsafeOperation {
            address: request.address,
        })
    }

    async fn shutdown(&self) -> TransportResult<()> {
        self.upstream.shutdown().await
    }
}
