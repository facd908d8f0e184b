//! Pre-flight checks over a parsed specification.
//!
//! These run before any provider process is started, so a broken
//! specification never costs an evaluation.

use std::collections::HashMap;

use tracing::warn;

use crate::error::{SpecError, SpecResult};
use crate::models::{Polarity, Specification, Target};

/// Result of a validation pass.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        self.valid = false;
        self.errors.push(message.into());
    }

    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn merge(&mut self, other: ValidationResult) {
        if !other.valid {
            self.valid = false;
        }
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// Turn collected errors into a [`SpecError::Invariant`].
    ///
    /// Warnings are logged and returned on success.
    pub fn into_result(self) -> SpecResult<Vec<String>> {
        for warning in &self.warnings {
            warn!("{}", warning);
        }
        if self.valid {
            Ok(self.warnings)
        } else {
            Err(SpecError::Invariant(self.errors.join("; ")))
        }
    }
}

/// Validator for parsed specifications.
pub struct SpecValidator;

impl SpecValidator {
    /// Run every pre-flight check.
    pub fn validate(spec: &Specification) -> ValidationResult {
        let mut result = ValidationResult::new();
        result.merge(Self::validate_targets(spec));
        result.merge(Self::validate_mocks(spec));
        result.merge(Self::validate_returns(spec));
        result
    }

    /// Each target may be asserted at most once per scenario.
    pub fn validate_targets(spec: &Specification) -> ValidationResult {
        let mut result = ValidationResult::new();
        let mut seen: HashMap<&Target, usize> = HashMap::new();

        for (index, assertion) in spec.assertions.iter().enumerate() {
            if let Some(first) = seen.get(&assertion.target) {
                let first = &spec.assertions[*first];
                result.add_error(format!(
                    "`{}` at {} targets {} which is already asserted by `{}` at {}",
                    assertion.label(),
                    assertion.source,
                    assertion.target,
                    first.label(),
                    first.source
                ));
                continue;
            }
            seen.insert(&assertion.target, index);

            if assertion.polarity == Polarity::Expect && assertion.matcher.is_empty() {
                result.add_warning(format!(
                    "`{}` at {} has no attributes and only checks presence",
                    assertion.label(),
                    assertion.source
                ));
            }
        }

        result
    }

    /// Two mocks with the same address, provider and request would always be ambiguous.
    pub fn validate_mocks(spec: &Specification) -> ValidationResult {
        let mut result = ValidationResult::new();

        for (i, mock) in spec.mocks.iter().enumerate() {
            let duplicate = spec.mocks[..i].iter().find(|earlier| {
                earlier.address == mock.address
                    && earlier.provider == mock.provider
                    && earlier.request == mock.request
            });
            if let Some(earlier) = duplicate {
                result.add_error(format!(
                    "mock {} (provider {}) at {} duplicates the mock at {}",
                    mock.address, mock.provider, mock.source, earlier.source
                ));
            }
            if mock.returns.is_empty() {
                result.add_warning(format!(
                    "mock {} at {} returns no values",
                    mock.address, mock.source
                ));
            }
        }

        result
    }

    /// Return overrides only apply to asserted resources no mock also names.
    pub fn validate_returns(spec: &Specification) -> ValidationResult {
        let mut result = ValidationResult::new();

        for assertion in spec.assertions.iter().filter(|a| !a.returns.is_empty()) {
            let address = match (&assertion.target, assertion.polarity) {
                (Target::Resource { address }, Polarity::Expect) => address,
                _ => {
                    result.add_error(format!(
                        "`{}` at {} cannot declare return values",
                        assertion.label(),
                        assertion.source
                    ));
                    continue;
                }
            };

            let colliding = spec.mocks.iter().find(|mock| {
                mock.address.type_name == address.type_name && mock.address.name == address.name
            });
            if let Some(mock) = colliding {
                result.add_error(format!(
                    "`{}` at {} declares return values for {}.{} which is also mocked at {}",
                    assertion.label(),
                    assertion.source,
                    address.type_name,
                    address.name,
                    mock.source
                ));
            }
        }

        result
    }
}
