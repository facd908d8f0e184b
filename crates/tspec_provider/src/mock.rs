//! In-memory provider for testing.
//!
//! Provides a scripted implementation of the [`Transport`] and
//! [`ProviderLauncher`] traits for use in tests without provider processes.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tspec_spec::{Address, ProviderIdentity, Value, ValueMap};

use crate::error::{TransportError, TransportResult};
use crate::launcher::ProviderLauncher;
use crate::protocol::{
    ApplyRequest, ApplyResponse, ConfigureRequest, Diagnostic, PlanRequest, PlanResponse,
    ReadDataRequest, ReadDataResponse, ReadResourceRequest, ReadResourceResponse, Schema,
    ValidateRequest,
};
use crate::transport::{methods, Transport};

/// Captured call information for verification.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedCall {
    pub method: String,
    pub address: Option<Address>,
    pub payload: Value,
}

/// Scripted provider.
///
/// Plans echo the proposed state with unset computed attributes marked
/// unknown, data reads echo the request merged with any scripted values,
/// and every call is captured.
#[derive(Clone, Default)]
pub struct MockTransport {
    schema: Arc<RwLock<Schema>>,
    /// Validation diagnostics per resource or data source type.
    diagnostics: Arc<RwLock<HashMap<String, Vec<Diagnostic>>>>,
    /// Values merged into data reads per data source type.
    data: Arc<RwLock<HashMap<String, ValueMap>>>,
    /// Simulated failure returned by every call.
    simulate_failure: Arc<RwLock<Option<String>>>,
    captured_calls: Arc<RwLock<Vec<CapturedCall>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schema(self, schema: Schema) -> Self {
        *self.schema.write() = schema;
        self
    }

    /// Report `diagnostic` when validating any configuration of `type_name`.
    pub fn with_diagnostic(self, type_name: impl Into<String>, diagnostic: Diagnostic) -> Self {
        self.diagnostics
            .write()
            .entry(type_name.into())
            .or_default()
            .push(diagnostic);
        self
    }

    pub fn with_data(self, type_name: impl Into<String>, values: ValueMap) -> Self {
        self.data.write().insert(type_name.into(), values);
        self
    }

    pub fn simulate_failure(self, message: impl Into<String>) -> Self {
        *self.simulate_failure.write() = Some(message.into());
        self
    }

    /// Get all captured calls.
    pub fn get_calls(&self) -> Vec<CapturedCall> {
        self.captured_calls.read().clone()
    }

    pub fn call_count(&self) -> usize {
        self.captured_calls.read().len()
    }

    pub fn was_called(&self, method: &str) -> bool {
        self.captured_calls.read().iter().any(|c| c.method == method)
    }

    pub fn get_method_calls(&self, method: &str) -> Vec<CapturedCall> {
        self.captured_calls
            .read()
            .iter()
            .filter(|c| c.method == method)
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.captured_calls.write().clear();
    }

    fn record_call(&self, method: &str, address: Option<&Address>, payload: &Value) -> TransportResult<()> {
        self.captured_calls.write().push(CapturedCall {
            method: method.to_string(),
            address: address.cloned(),
            payload: payload.clone(),
        });
        if let Some(message) = self.simulate_failure.read().clone() {
            return Err(TransportError::Provider {
                provider: "mock".to_string(),
                message,
            });
        }
        Ok(())
    }

    fn diagnostics_for(&self, type_name: &str) -> Vec<Diagnostic> {
        self.diagnostics
            .read()
            .get(type_name)
            .cloned()
            .unwrap_or_default()
    }

    fn planned_state(&self, address: &Address, proposed: Value) -> Value {
        let schema = self.schema.read();
        let Some(block) = schema.resource_schemas.get(&address.type_name) else {
            return proposed;
        };
        let mut state = match proposed {
            Value::Map(state) => state,
            other => return other,
        };
        for (name, attribute) in &block.attributes {
            if attribute.computed && state.get(name).map_or(true, Value::is_null) {
                state.insert(name.clone(), Value::Unknown);
            }
        }
        Value::Map(state)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get_schema(&self) -> TransportResult<Schema> {
        self.record_call(methods::GET_SCHEMA, None, &Value::Null)?;
        Ok(self.schema.read().clone())
    }

    async fn configure(&self, request: ConfigureRequest) -> TransportResult<Vec<Diagnostic>> {
        self.record_call(methods::CONFIGURE, None, &request.config)?;
        Ok(Vec::new())
    }

    async fn validate_resource_config(&self, request: ValidateRequest) -> TransportResult<Vec<Diagnostic>> {
        self.record_call(methods::VALIDATE_RESOURCE, Some(&request.address), &request.config)?;
        Ok(self.diagnostics_for(&request.address.type_name))
    }

    async fn validate_data_source_config(&self, request: ValidateRequest) -> TransportResult<Vec<Diagnostic>> {
        self.record_call(methods::VALIDATE_DATA_SOURCE, Some(&request.address), &request.config)?;
        Ok(self.diagnostics_for(&request.address.type_name))
    }

    async fn plan_resource_change(&self, request: PlanRequest) -> TransportResult<PlanResponse> {
        self.record_call(
            methods::PLAN_RESOURCE_CHANGE,
            Some(&request.address),
            &request.proposed_new_state,
        )?;
        Ok(PlanResponse {
            planned_state: self.planned_state(&request.address, request.proposed_new_state),
            requires_replace: Vec::new(),
            diagnostics: Vec::new(),
        })
    }

    async fn read_resource(&self, request: ReadResourceRequest) -> TransportResult<ReadResourceResponse> {
        self.record_call(methods::READ_RESOURCE, Some(&request.address), &request.current_state)?;
        Ok(ReadResourceResponse {
            new_state: Some(request.current_state),
            diagnostics: Vec::new(),
        })
    }

    async fn read_data_source(&self, request: ReadDataRequest) -> TransportResult<ReadDataResponse> {
        self.record_call(methods::READ_DATA_SOURCE, Some(&request.address), &request.config)?;
        let mut state = request.config;
        if let Some(values) = self.data.read().get(&request.address.type_name) {
            state.overlay(values);
        }
        Ok(ReadDataResponse {
            state,
            diagnostics: Vec::new(),
        })
    }

    async fn apply_resource_change(&self, request: ApplyRequest) -> TransportResult<ApplyResponse> {
        self.record_call(methods::APPLY_RESOURCE_CHANGE, Some(&request.address), &request.planned_state)?;
        Ok(ApplyResponse {
            new_state: request.planned_state,
            diagnostics: Vec::new(),
        })
    }

    async fn shutdown(&self) -> TransportResult<()> {
        self.record_call(methods::STOP, None, &Value::Null)
    }
}

/// Launcher handing out [`MockTransport`]s per provider type.
#[derive(Clone, Default)]
pub struct MockLauncher {
    providers: Arc<RwLock<HashMap<String, MockTransport>>>,
    connected: Arc<RwLock<Vec<ProviderIdentity>>>,
    stopped: Arc<RwLock<Vec<ProviderIdentity>>>,
}

impl MockLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve every identity of `provider_type` with `transport`.
    pub fn with_provider(self, provider_type: impl Into<String>, transport: MockTransport) -> Self {
        self.providers.write().insert(provider_type.into(), transport);
        self
    }

    pub fn provider(&self, provider_type: &str) -> Option<MockTransport> {
        self.providers.read().get(provider_type).cloned()
    }

    /// Identities currently connected, in connection order.
    pub fn connected(&self) -> Vec<ProviderIdentity> {
        self.connected.read().clone()
    }

    /// Identities shut down so far.
    pub fn stopped(&self) -> Vec<ProviderIdentity> {
        self.stopped.read().clone()
    }
}

#[async_trait]
impl ProviderLauncher for MockLauncher {
    async fn connect(&self, identity: &ProviderIdentity) -> TransportResult<Arc<dyn Transport>> {
        let transport = self
            .provider(&identity.provider_type)
            .ok_or_else(|| TransportError::Launch {
                provider: identity.to_string(),
                message: "no mock provider registered".to_string(),
            })?;
        let mut connected = self.connected.write();
        if !connected.contains(identity) {
            connected.push(identity.clone());
        }
        Ok(Arc::new(transport))
    }

    async fn shutdown(&self, identity: &ProviderIdentity) -> TransportResult<()> {
        let was_connected = {
            let mut connected = self.connected.write();
            let before = connected.len();
            connected.retain(|c| c != identity);
            connected.len() != before
        };
        if was_connected {
            if let Some(transport) = self.provider(&identity.provider_type) {
                transport.shutdown().await?;
            }
            self.stopped.write().push(identity.clone());
        }
        Ok(())
    }

    async fn shutdown_all(&self) -> TransportResult<()> {
        for identity in self.connected() {
            self.shutdown(&identity).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{AttributeSchema, BlockSchema};

    fn widget_schema() -> Schema {
        Schema::default().with_resource(
            "widget",
            BlockSchema::new()
                .with_attribute("size", AttributeSchema::required())
                .with_attribute("id", AttributeSchema::computed()),
        )
    }

    #[tokio::test]
    async fn test_plan_marks_computed_unknown() {
        let transport = MockTransport::new().with_schema(widget_schema());
        let address = Address::managed("widget", "main");
        let proposed = Value::map([("size", Value::int(10)), ("id", Value::Null)]);

        let response = transport
            .plan_resource_change(PlanRequest {
                address: address.clone(),
                prior_state: Value::Null,
                proposed_new_state: proposed.clone(),
                config: proposed,
            })
            .await
            .unwrap();

        assert_eq!(response.planned_state.get("id"), Some(&Value::Unknown));
        assert_eq!(response.planned_state.get("size"), Some(&Value::int(10)));
        assert_eq!(transport.get_method_calls(methods::PLAN_RESOURCE_CHANGE).len(), 1);
    }

    #[tokio::test]
    async fn test_simulated_failure() {
        let transport = MockTransport::new().simulate_failure("boom");
        assert!(transport.get_schema().await.is_err());
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_launcher_tracks_connections() {
        let transport = MockTransport::new();
        let launcher = MockLauncher::new().with_provider("widget", transport.clone());
        let primary = ProviderIdentity::new("widget");
        let secondary = ProviderIdentity::new("widget").with_alias("secondary");

        launcher.connect(&primary).await.unwrap();
        launcher.connect(&secondary).await.unwrap();
        launcher.connect(&primary).await.unwrap();
        assert_eq!(launcher.connected(), vec![primary.clone(), secondary.clone()]);
        assert!(launcher.connect(&ProviderIdentity::new("other")).await.is_err());

        launcher.shutdown_all().await.unwrap();
        assert!(launcher.connected().is_empty());
        assert_eq!(launcher.stopped(), vec![primary, secondary]);
        assert!(transport.was_called(methods::STOP));
    }
}
