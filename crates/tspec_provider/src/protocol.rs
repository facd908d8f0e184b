//! Provider protocol messages.
//!
//! One request/response pair per call category. Payloads are [`Value`]s so
//! unknown values survive the round trip through a provider process.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tspec_spec::{Address, Value};

/// Severity of a provider diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A diagnostic reported by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Attribute path the diagnostic refers to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl Diagnostic {
    pub fn error(summary: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    pub fn warning(summary: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(summary)
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(attribute) = &self.attribute {
            write!(f, "{}: ", attribute)?;
        }
        write!(f, "{}", self.summary)?;
        if let Some(detail) = &self.detail {
            write!(f, " ({})", detail)?;
        }
        Ok(())
    }
}

/// Error diagnostics in `diagnostics`.
pub fn errors(diagnostics: &[Diagnostic]) -> Vec<&Diagnostic> {
    diagnostics.iter().filter(|d| d.is_error()).collect()
}

/// Schema of one attribute.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeSchema {
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub computed: bool,
    #[serde(default)]
    pub sensitive: bool,
}

impl AttributeSchema {
    pub fn required() -> Self {
        Self {
            required: true,
            ..Self::default()
        }
    }

    pub fn optional() -> Self {
        Self {
            optional: true,
            ..Self::default()
        }
    }

    pub fn computed() -> Self {
        Self {
            computed: true,
            ..Self::default()
        }
    }
}

/// How a nested block type is represented in the object value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NestingMode {
    Single,
    #[default]
    List,
    Set,
}

/// Schema of a nested block type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NestedBlockSchema {
    #[serde(default)]
    pub nesting: NestingMode,
    #[serde(default)]
    pub block: BlockSchema,
}

/// Schema of a configuration block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockSchema {
    #[serde(default)]
    pub attributes: IndexMap<String, AttributeSchema>,
    #[serde(default)]
    pub block_types: IndexMap<String, NestedBlockSchema>,
}

impl BlockSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attribute(mut self, name: impl Into<String>, attribute: AttributeSchema) -> Self {
        self.attributes.insert(name.into(), attribute);
        self
    }

    pub fn with_block(mut self, name: impl Into<String>, nesting: NestingMode, block: BlockSchema) -> Self {
        self.block_types
            .insert(name.into(), NestedBlockSchema { nesting, block });
        self
    }
}

/// Full schema of a provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub provider: BlockSchema,
    #[serde(default)]
    pub resource_schemas: IndexMap<String, BlockSchema>,
    #[serde(default)]
    pub data_source_schemas: IndexMap<String, BlockSchema>,
}

impl Schema {
    pub fn with_resource(mut self, type_name: impl Into<String>, block: BlockSchema) -> Self {
        self.resource_schemas.insert(type_name.into(), block);
        self
    }

    pub fn with_data_source(mut self, type_name: impl Into<String>, block: BlockSchema) -> Self {
        self.data_source_schemas.insert(type_name.into(), block);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigureRequest {
    pub config: Value,
}

/// Validation request for a resource or data source configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidateRequest {
    pub address: Address,
    pub config: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanRequest {
    pub address: Address,
    pub prior_state: Value,
    pub proposed_new_state: Value,
    pub config: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanResponse {
    pub planned_state: Value,
    #[serde(default)]
    pub requires_replace: Vec<String>,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadResourceRequest {
    pub address: Address,
    pub current_state: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadResourceResponse {
    /// `None` when the object no longer exists.
    pub new_state: Option<Value>,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadDataRequest {
    pub address: Address,
    pub config: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadDataResponse {
    pub state: Value,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyRequest {
    pub address: Address,
    pub prior_state: Value,
    pub planned_state: Value,
    pub config: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyResponse {
    pub new_state: Value,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
}
