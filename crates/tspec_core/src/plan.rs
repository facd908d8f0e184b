//! The computed plan.

use serde::Serialize;
use tspec_spec::{Address, ProviderIdentity, ResourceMode, Value};

/// One resource or data instance with its final planned values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedInstance {
    pub address: Address,
    pub provider: ProviderIdentity,
    pub values: Value,
}

/// An output value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputValue {
    pub name: String,
    pub value: Value,
    pub sensitive: bool,
}

impl OutputValue {
    /// The output as a block with `value` and `sensitive` attributes.
    pub fn as_block(&self) -> Value {
        Value::map([
            ("value", self.value.clone()),
            ("sensitive", Value::Bool(self.sensitive)),
        ])
    }
}

/// What a configuration would create. Immutable once produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Plan {
    pub instances: Vec<PlannedInstance>,
    pub outputs: Vec<OutputValue>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_instance(mut self, address: Address, provider: ProviderIdentity, values: Value) -> Self {
        self.instances.push(PlannedInstance {
            address,
            provider,
            values,
        });
        self
    }

    pub fn with_output(mut self, name: impl Into<String>, value: Value, sensitive: bool) -> Self {
        self.outputs.push(OutputValue {
            name: name.into(),
            value,
            sensitive,
        });
        self
    }

    /// The instance at exactly `address`.
    pub fn instance(&self, address: &Address) -> Option<&PlannedInstance> {
        self.instances.iter().find(|i| &i.address == address)
    }

    /// Instances an assertion address refers to.
    ///
    /// A keyed address names one instance. An unkeyed address names the
    /// unkeyed instance if there is one, otherwise every instance of the
    /// resource.
    pub fn resolve(&self, address: &Address) -> Vec<&PlannedInstance> {
        if address.key.is_some() {
            return self.instance(address).into_iter().collect();
        }
        if let Some(instance) = self.instance(address) {
            return vec![instance];
        }
        self.instances
            .iter()
            .filter(|i| i.address.same_resource(address))
            .collect()
    }

    pub fn output(&self, name: &str) -> Option<&OutputValue> {
        self.outputs.iter().find(|o| o.name == name)
    }

    pub fn managed(&self) -> impl Iterator<Item = &PlannedInstance> {
        self.instances
            .iter()
            .filter(|i| i.address.mode == ResourceMode::Managed)
    }
}
