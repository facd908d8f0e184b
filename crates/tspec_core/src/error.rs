//! Error types for the core module.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;
use tspec_provider::TransportError;
use tspec_spec::{Address, ProviderIdentity, SpecError};

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors raised while evaluating a configuration.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{file}: {message}")]
    Load { file: PathBuf, message: String },

    /// Engine diagnostic for one configuration object.
    #[error("{address}: {message}")]
    Evaluation { address: String, message: String },

    #[error("{address}: {source}")]
    Transport {
        address: String,
        #[source]
        source: TransportError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn evaluation(address: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::Evaluation {
            address: address.into(),
            message: message.into(),
        }
    }

    pub fn transport(address: impl Into<String>, source: TransportError) -> Self {
        EngineError::Transport {
            address: address.into(),
            source,
        }
    }
}

/// Errors that can occur during core operations.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error(transparent)]
    Spec(#[from] SpecError),

    #[error("No mock matches the read of {address} (provider {provider})")]
    MockMissing {
        address: Address,
        provider: ProviderIdentity,
    },

    #[error("{count} mocks match the read of {address} (provider {provider})")]
    MockAmbiguous {
        address: Address,
        provider: ProviderIdentity,
        count: usize,
    },

    #[error("Refusing to apply changes to {address}: test runs never apply")]
    UnsafeOperation { address: Address },

    #[error("Evaluation failed at {address}: {message}")]
    Evaluation { address: String, message: String },

    #[error("Provider error: {0}")]
    Provider(TransportError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid variables file {file}: {message}")]
    Variables { file: PathBuf, message: String },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TransportError> for CoreError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::MockMissing { address, provider } => CoreError::MockMissing { address, provider },
            TransportError::MockAmbiguous {
                address,
                provider,
                count,
            } => CoreError::MockAmbiguous {
                address,
                provider,
                count,
            },
            TransportError::UnsafeOperation { address } => CoreError::UnsafeOperation { address },
            other => CoreError::Provider(other),
        }
    }
}

impl From<EngineError> for CoreError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Transport { address, source } if !source.is_interception() => {
                CoreError::Evaluation {
                    address,
                    message: source.to_string(),
                }
            }
            EngineError::Transport { source, .. } => CoreError::from(source),
            EngineError::Evaluation { address, message } => CoreError::Evaluation { address, message },
            EngineError::Load { file, message } => CoreError::Evaluation {
                address: file.display().to_string(),
                message,
            },
            EngineError::Io(e) => CoreError::Io(e),
        }
    }
}

/// Category of a fatal scenario error, as shown in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Parse,
    SpecInvariant,
    MockMissing,
    MockAmbiguous,
    UnsafeOperation,
    Evaluation,
    Configuration,
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Spec(SpecError::Parse(_)) => ErrorKind::Parse,
            CoreError::Spec(SpecError::Invariant(_)) => ErrorKind::SpecInvariant,
            CoreError::Spec(_) => ErrorKind::Configuration,
            CoreError::MockMissing { .. } => ErrorKind::MockMissing,
            CoreError::MockAmbiguous { .. } => ErrorKind::MockAmbiguous,
            CoreError::UnsafeOperation { .. } => ErrorKind::UnsafeOperation,
            CoreError::Evaluation { .. } | CoreError::Provider(_) => ErrorKind::Evaluation,
            CoreError::Config(_)
            | CoreError::Variables { .. }
            | CoreError::Yaml(_)
            | CoreError::Io(_) => ErrorKind::Configuration,
        }
    }
}
