//! Error types for the provider module.

use thiserror::Error;
use tspec_spec::{Address, ProviderIdentity};

/// Result type alias for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors that can occur while talking to a provider.
#[derive(Error, Debug)]
pub enum TransportError {
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

    #[error("Provider {provider} failed: {message}")]
    Provider { provider: String, message: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Failed to launch provider {provider}: {message}")]
    Launch { provider: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TransportError {
    /// True for errors raised by interception rather than by a provider.
    pub fn is_interception(&self) -> bool {
        matches!(
            self,
            TransportError::MockMissing { .. }
                | TransportError::MockAmbiguous { .. }
                | TransportError::UnsafeOperation { .. }
        )
    }
}
