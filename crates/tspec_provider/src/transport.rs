//! The provider transport contract.

use async_trait::async_trait;

use crate::error::TransportResult;
use crate::protocol::{
    ApplyRequest, ApplyResponse, ConfigureRequest, Diagnostic, PlanRequest, PlanResponse,
    ReadDataRequest, ReadDataResponse, ReadResourceRequest, ReadResourceResponse, Schema,
    ValidateRequest,
};

/// Wire names of the provider calls.
pub mod methods {
    pub const GET_SCHEMA: &str = "GetProviderSchema";
    pub const CONFIGURE: &str = "ConfigureProvider";
    pub const VALIDATE_RESOURCE: &str = "ValidateResourceConfig";
    pub const VALIDATE_DATA_SOURCE: &str = "ValidateDataSourceConfig";
    pub const PLAN_RESOURCE_CHANGE: &str = "PlanResourceChange";
    pub const READ_RESOURCE: &str = "ReadResource";
    pub const READ_DATA_SOURCE: &str = "ReadDataSource";
    pub const APPLY_RESOURCE_CHANGE: &str = "ApplyResourceChange";
    pub const STOP: &str = "StopProvider";
}

/// One provider instance, as seen by the evaluation engine.
///
/// Real, intercepted and in-memory providers are interchangeable behind
/// `Arc<dyn Transport>`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get_schema(&self) -> TransportResult<Schema>;

    async fn configure(&self, request: ConfigureRequest) -> TransportResult<Vec<Diagnostic>>;

    async fn validate_resource_config(&self, request: ValidateRequest) -> TransportResult<Vec<Diagnostic>>;

    async fn validate_data_source_config(&self, request: ValidateRequest) -> TransportResult<Vec<Diagnostic>>;

    async fn plan_resource_change(&self, request: PlanRequest) -> TransportResult<PlanResponse>;

    /// Refresh the state of an existing object.
    async fn read_resource(&self, request: ReadResourceRequest) -> TransportResult<ReadResourceResponse>;

    async fn read_data_source(&self, request: ReadDataRequest) -> TransportResult<ReadDataResponse>;

    async fn apply_resource_change(&self, request: ApplyRequest) -> TransportResult<ApplyResponse>;

    /// Release the provider. Transports without a process have nothing to do.
    async fn shutdown(&self) -> TransportResult<()> {
        Ok(())
    }
}
