//! # tspec_spec
//!
//! Specification language for terraspec.
//!
//! A specification states what a configuration *would* create for a given
//! set of inputs, without provisioning anything. This crate owns:
//!
//! - **Values**: the tagged value type shared with providers and plans
//! - **Addresses**: resource, data and instance addresses plus provider identities
//! - **Matching**: subset comparison with wildcards, nested blocks and rejections
//! - **Parsing**: `*.tfspec` files into a [`Specification`]
//! - **Validation**: pre-flight invariants checked before any evaluation
//!
//! ## Example
//!
//! ```rust,no_run
//! use tspec_spec::{SpecParser, SpecValidator};
//!
//! let spec = SpecParser::parse_dir("./specs/basic".as_ref()).unwrap();
//! let result = SpecValidator::validate(&spec);
//! if !result.valid {
//!     for error in &result.errors {
//!         eprintln!("Error: {}", error);
//!     }
//! }
//! ```

pub mod address;
pub mod error;
pub mod matcher;
pub mod models;
pub mod parser;
pub mod validator;
pub mod value;

pub use address::{Address, InstanceKey, ProviderIdentity, ResourceMode};
pub use error::{ParseError, Position, SpecError, SpecResult};
pub use matcher::{Expectation, Matcher, Mismatch, Rejection};
pub use models::*;
pub use parser::{SourceFile, SpecParser, SPEC_EXTENSION, WILDCARD};
pub use validator::{SpecValidator, ValidationResult};
pub use value::{Value, ValueMap, UNKNOWN_SENTINEL};
