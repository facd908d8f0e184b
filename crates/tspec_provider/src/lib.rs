//! # tspec_provider
//!
//! Provider plumbing for terraspec.
//!
//! ## Features
//!
//! - **Transport**: the provider contract, one method per call category
//! - **Mock Registry**: O(1) lookup of data-source mocks by address and provider
//! - **Interceptor**: forwards validation and planning, answers reads, refuses applies
//! - **Stdio**: provider processes speaking framed JSON-RPC
//! - **Mock**: scripted in-memory providers for tests

pub mod error;
pub mod interceptor;
pub mod launcher;
pub mod mock;
pub mod protocol;
pub mod registry;
pub mod stdio;
pub mod transport;

pub use error::{TransportError, TransportResult};
pub use interceptor::Interceptor;
pub use launcher::{ProcessLauncher, ProviderCommand, ProviderLauncher};
pub use mock::{CapturedCall, MockLauncher, MockTransport};
pub use protocol::*;
pub use registry::{Lookup, MockRegistry};
pub use stdio::StdioTransport;
pub use transport::{methods, Transport};
