//! Reconciling a plan with a specification.

use std::fmt;

use serde::Serialize;
use tracing::debug;
use tspec_spec::{Address, Assertion, Mismatch, Polarity, SourceRef, Specification, Target, Value};

use crate::plan::Plan;

/// Result of checking one assertion.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Pass,
    Fail { mismatches: Vec<Mismatch> },
    /// An `assert` whose target is not in the plan.
    TargetMissing,
    /// A `reject` whose target is in the plan.
    UnexpectedlyPresent { addresses: Vec<String> },
}

impl Outcome {
    pub fn is_pass(&self) -> bool {
        matches!(self, Outcome::Pass)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Pass => write!(f, "pass"),
            Outcome::Fail { mismatches } => {
                let lines: Vec<String> = mismatches.iter().map(|m| m.to_string()).collect();
                write!(f, "fail: {}", lines.join("; "))
            }
            Outcome::TargetMissing => write!(f, "target missing from plan"),
            Outcome::UnexpectedlyPresent { addresses } => {
                write!(f, "unexpectedly present: {}", addresses.join(", "))
            }
        }
    }
}

/// Verdict for one assertion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub label: String,
    pub target: Target,
    pub polarity: Polarity,
    pub outcome: Outcome,
    pub source: SourceRef,
}

impl Verdict {
    pub fn passed(&self) -> bool {
        self.outcome.is_pass()
    }
}

/// Checks assertions against a computed plan.
pub struct AssertionMatcher;

impl AssertionMatcher {
    /// One verdict per assertion, in specification order.
    pub fn evaluate(plan: &Plan, spec: &Specification) -> Vec<Verdict> {
        spec.assertions
            .iter()
            .map(|assertion| {
                let outcome = Self::check(plan, assertion);
                debug!(assertion = %assertion.label(), outcome = %outcome, "Checked assertion");
                Verdict {
                    label: assertion.label(),
                    target: assertion.target.clone(),
                    polarity: assertion.polarity,
                    outcome,
                    source: assertion.source.clone(),
                }
            })
            .collect()
    }

    fn check(plan: &Plan, assertion: &Assertion) -> Outcome {
        let candidates = Self::candidates(plan, &assertion.target);

        match assertion.polarity {
            Polarity::Reject => {
                if candidates.is_empty() {
                    Outcome::Pass
                } else {
                    Outcome::UnexpectedlyPresent {
                        addresses: candidates.into_iter().map(|(address, _)| address).collect(),
                    }
                }
            }
            Polarity::Expect => {
                let Some((_, first)) = candidates.first() else {
                    return Outcome::TargetMissing;
                };
                if candidates.iter().any(|(_, values)| assertion.matcher.matches(values)) {
                    Outcome::Pass
                } else {
                    Outcome::Fail {
                        mismatches: assertion.matcher.mismatches(first),
                    }
                }
            }
        }
    }

    /// Plan entries an assertion target refers to, with their values.
    fn candidates(plan: &Plan, target: &Target) -> Vec<(String, Value)> {
        match target {
            Target::Resource { address } => plan
                .resolve(address)
                .into_iter()
                .map(|instance| (instance.address.to_string(), instance.values.clone()))
                .collect(),
            Target::Output { name } => plan
                .output(name)
                .map(|output| (format!("output.{}", output.name), output.as_block()))
                .into_iter()
                .collect(),
        }
    }

    /// Addresses in the plan that no assertion mentions.
    pub fn unasserted<'p>(plan: &'p Plan, spec: &Specification) -> Vec<&'p Address> {
        plan.managed()
            .map(|instance| &instance.address)
            .filter(|address| {
                !spec.assertions.iter().any(|a| match &a.target {
                    Target::Resource { address: target } => {
                        target == *address || (target.key.is_none() && target.same_resource(address))
                    }
                    Target::Output { .. } => false,
                })
            })
            .collect()
    }
}
