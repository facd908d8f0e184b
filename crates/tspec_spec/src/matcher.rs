//! Structural subset matching.
//!
//! A [`Matcher`] names the attributes it cares about and ignores the rest.
//! Nested block matchers are existential over repeated blocks: a matcher
//! element is satisfied when *some* actual block satisfies it. Rejections
//! describe shapes that must not appear.
//!
//! The same routine serves mock request matching and assertion checking.

use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;

use crate::value::Value;

/// What an attribute is expected to hold.
#[derive(Debug, Clone, PartialEq)]
pub enum Expectation {
    /// Exactly this value.
    Exact(Value),
    /// Present and non-null; the value itself is irrelevant.
    Computed,
    /// A single nested block.
    Block(Matcher),
    /// Several nested blocks of the same name, each matched independently.
    Blocks(Vec<Matcher>),
}

/// A shape that must not appear under `attribute`.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    /// The attribute must not equal this value.
    Value { attribute: String, value: Value },
    /// No block under the attribute may satisfy `shape`. An empty shape
    /// requires the attribute to be absent or empty.
    Block { attribute: String, shape: Matcher },
}

impl Rejection {
    pub fn attribute(&self) -> &str {
        match self {
            Rejection::Value { attribute, .. } | Rejection::Block { attribute, .. } => attribute,
        }
    }
}

/// One difference between expected and actual values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mismatch {
    pub path: String,
    pub expected: String,
    pub actual: String,
}

impl Mismatch {
    fn new(path: &str, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: expected {}, actual {}", self.path, self.expected, self.actual)
    }
}

/// Structural pattern over a map value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Matcher {
    pub attributes: IndexMap<String, Expectation>,
    pub rejections: Vec<Rejection>,
}

impl Matcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expect(mut self, attribute: impl Into<String>, expectation: Expectation) -> Self {
        self.attributes.insert(attribute.into(), expectation);
        self
    }

    pub fn value(self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        self.expect(attribute, Expectation::Exact(value.into()))
    }

    pub fn reject(mut self, rejection: Rejection) -> Self {
        self.rejections.push(rejection);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.rejections.is_empty()
    }

    /// Number of constraints, nested ones included. A matcher that narrows
    /// another one by adding constraints always has a higher count.
    pub fn specificity(&self) -> usize {
        let attributes: usize = self
            .attributes
            .values()
            .map(|expectation| match expectation {
                Expectation::Exact(_) | Expectation::Computed => 1,
                Expectation::Block(nested) => 1 + nested.specificity(),
                Expectation::Blocks(all) => 1 + all.iter().map(Matcher::specificity).sum::<usize>(),
            })
            .sum();
        attributes + self.rejections.len()
    }

    /// True if `actual` satisfies every expectation and no rejection.
    pub fn matches(&self, actual: &Value) -> bool {
        self.compare(actual, "").is_empty()
    }

    /// All differences between this matcher and `actual`.
    pub fn mismatches(&self, actual: &Value) -> Vec<Mismatch> {
        self.compare(actual, "")
    }

    fn compare(&self, actual: &Value, path: &str) -> Vec<Mismatch> {
        if self.is_empty() {
            return Vec::new();
        }
        let Some(map) = actual.as_map() else {
            return vec![Mismatch::new(
                display_path(path),
                format!("block {}", self),
                describe(Some(actual)),
            )];
        };

        let mut mismatches = Vec::new();
        for (name, expectation) in &self.attributes {
            let child = join(path, name);
            let value = map.get(name);
            match expectation {
                Expectation::Exact(expected) => {
                    let actual = value.unwrap_or(&Value::Null);
                    if !expected.equivalent(actual) {
                        mismatches.push(Mismatch::new(&child, expected.to_string(), describe(value)));
                    }
                }
                Expectation::Computed => {
                    if value.map_or(true, Value::is_null) {
                        mismatches.push(Mismatch::new(&child, "(computed)", describe(value)));
                    }
                }
                Expectation::Block(matcher) => {
                    mismatches.extend(matcher.compare_block(value, &child));
                }
                Expectation::Blocks(matchers) => {
                    for matcher in matchers {
                        mismatches.extend(matcher.compare_block(value, &child));
                    }
                }
            }
        }

        for rejection in &self.rejections {
            mismatches.extend(rejection.check(map.get(rejection.attribute()), path));
        }
        mismatches
    }

    /// Compare against a block attribute that may be a single object or a
    /// list of objects.
    fn compare_block(&self, actual: Option<&Value>, path: &str) -> Vec<Mismatch> {
        match actual {
            Some(Value::List(items)) => {
                if items.iter().any(|item| self.matches(item)) {
                    return Vec::new();
                }
                match items.as_slice() {
                    [] => vec![Mismatch::new(path, format!("block {}", self), "no blocks")],
                    [only] => self.compare(only, &format!("{}[0]", path)),
                    _ => vec![Mismatch::new(
                        path,
                        format!("a block matching {}", self),
                        format!("none of {} blocks matched", items.len()),
                    )],
                }
            }
            Some(value @ Value::Map(_)) => self.compare(value, path),
            other => vec![Mismatch::new(path, format!("block {}", self), describe(other))],
        }
    }
}

impl Rejection {
    fn check(&self, actual: Option<&Value>, path: &str) -> Vec<Mismatch> {
        let child = join(path, self.attribute());
        match self {
            Rejection::Value { value, .. } => match actual {
                Some(actual) if value.equivalent(actual) => {
                    vec![Mismatch::new(&child, format!("not {}", value), actual.to_string())]
                }
                _ => Vec::new(),
            },
            Rejection::Block { shape, .. } => {
                let Some(actual) = actual else {
                    return Vec::new();
                };
                match actual {
                    Value::Null => Vec::new(),
                    Value::List(items) => items
                        .iter()
                        .enumerate()
                        .filter(|(_, item)| shape.matches(item))
                        .map(|(i, item)| {
                            Mismatch::new(
                                &format!("{}[{}]", child, i),
                                rejected(shape),
                                item.to_string(),
                            )
                        })
                        .collect(),
                    Value::Map(map) if map.is_empty() => Vec::new(),
                    Value::Map(_) => {
                        if shape.matches(actual) {
                            vec![Mismatch::new(&child, rejected(shape), actual.to_string())]
                        } else {
                            Vec::new()
                        }
                    }
                    // Scalars and unknowns only violate an empty shape (presence).
                    _ if shape.is_empty() => {
                        vec![Mismatch::new(&child, rejected(shape), actual.to_string())]
                    }
                    _ => Vec::new(),
                }
            }
        }
    }
}

fn rejected(shape: &Matcher) -> String {
    if shape.is_empty() {
        "absent".to_string()
    } else {
        format!("no block matching {}", shape)
    }
}

fn describe(value: Option<&Value>) -> String {
    match value {
        Some(value) => value.to_string(),
        None => "absent".to_string(),
    }
}

fn join(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", path, name)
    }
}

fn display_path(path: &str) -> &str {
    if path.is_empty() {
        "."
    } else {
        path
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "{{}}");
        }
        let mut parts = Vec::new();
        for (name, expectation) in &self.attributes {
            match expectation {
                Expectation::Exact(value) => parts.push(format!("{} = {}", name, value)),
                Expectation::Computed => parts.push(format!("{} = (computed)", name)),
                Expectation::Block(matcher) => parts.push(format!("{} {}", name, matcher)),
                Expectation::Blocks(matchers) => {
                    parts.extend(matchers.iter().map(|m| format!("{} {}", name, m)))
                }
            }
        }
        for rejection in &self.rejections {
            match rejection {
                Rejection::Value { attribute, value } => {
                    parts.push(format!("reject {} = {}", attribute, value))
                }
                Rejection::Block { attribute, shape } => {
                    parts.push(format!("reject {} {}", attribute, shape))
                }
            }
        }
        write!(f, "{{ {} }}", parts.join(", "))
    }
}
