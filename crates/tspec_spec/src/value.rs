//! Uniform value model.
//!
//! The same tagged value type is used for expected values in the DSL, for
//! provider request/response payloads and for planned attribute values, so a
//! single recursive comparison routine covers all of them.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Number;

/// Wire sentinel for a value that is only known after apply.
pub const UNKNOWN_SENTINEL: &str = "74D93920-ED26-11E3-AC10-0800200C9A66";

/// Ordered attribute map.
pub type ValueMap = IndexMap<String, Value>;

/// A configuration or planned value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    List(Vec<Value>),
    Map(ValueMap),
    /// Computed by the provider, known only after apply.
    Unknown,
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn int(n: i64) -> Self {
        Value::Number(Number::from(n))
    }

    /// Build a float value. Non-finite floats become null.
    pub fn float(n: f64) -> Self {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }

    pub fn map<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Value::Unknown)
    }

    /// Null, an empty list or an empty map.
    pub fn is_empty_like(&self) -> bool {
        match self {
            Value::Null => true,
            Value::List(items) => items.is_empty(),
            Value::Map(map) => map.is_empty(),
            _ => false,
        }
    }

    /// True when no part of the value is unknown.
    pub fn is_wholly_known(&self) -> bool {
        match self {
            Value::Unknown => false,
            Value::List(items) => items.iter().all(Value::is_wholly_known),
            Value::Map(map) => map.values().all(Value::is_wholly_known),
            _ => true,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&ValueMap> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Attribute lookup on a map value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|map| map.get(key))
    }

    /// Structural equality where numbers compare by numeric value and map
    /// key order is irrelevant.
    pub fn equivalent(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => numbers_equal(a, b),
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.equivalent(y))
            }
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.get(k).map_or(false, |other| v.equivalent(other)))
            }
            _ => self == other,
        }
    }

    /// Copy `overrides` onto a map value at the top level. Non-map values
    /// are replaced by a map holding only the overrides.
    pub fn overlay(&mut self, overrides: &ValueMap) {
        match self {
            Value::Map(map) => {
                for (key, value) in overrides {
                    map.insert(key.clone(), value.clone());
                }
            }
            other => *other = Value::Map(overrides.clone()),
        }
    }
}

fn numbers_equal(a: &Number, b: &Number) -> bool {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return x == y;
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{:?}", s),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Map(map) => {
                if map.is_empty() {
                    return write!(f, "{{}}");
                }
                write!(f, "{{ ")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} = {}", key, value)?;
                }
                write!(f, " }}")
            }
            Value::Unknown => write!(f, "(known after apply)"),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n),
            serde_json::Value::String(s) if s == UNKNOWN_SENTINEL => Value::Unknown,
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Number(n) => serde_json::Value::Number(n),
            Value::String(s) => serde_json::Value::String(s),
            Value::List(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            Value::Map(map) => serde_json::Value::Object(
                map.into_iter().map(|(k, v)| (k, v.into())).collect(),
            ),
            Value::Unknown => serde_json::Value::String(UNKNOWN_SENTINEL.to_string()),
        }
    }
}

impl From<hcl::Value> for Value {
    fn from(value: hcl::Value) -> Self {
        match value {
            hcl::Value::Null => Value::Null,
            hcl::Value::Bool(b) => Value::Bool(b),
            hcl::Value::Number(n) => number_from_hcl(&n),
            // Interpolating an unknown value into a template yields an unknown string.
            hcl::Value::String(s) if s.contains(UNKNOWN_SENTINEL) => Value::Unknown,
            hcl::Value::String(s) => Value::String(s),
            hcl::Value::Array(items) => Value::List(items.into_iter().map(Value::from).collect()),
            hcl::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
            #[allow(unreachable_patterns)]
            _ => Value::Null,
        }
    }
}

impl From<Value> for hcl::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => hcl::Value::Null,
            Value::Bool(b) => hcl::Value::Bool(b),
            Value::Number(n) => number_to_hcl(&n),
            Value::String(s) => hcl::Value::String(s),
            Value::List(items) => hcl::Value::Array(items.into_iter().map(Into::into).collect()),
            Value::Map(map) => {
                let mut object = hcl::Map::new();
                for (key, value) in map {
                    object.insert(key, value.into());
                }
                hcl::Value::Object(object)
            }
            Value::Unknown => hcl::Value::String(UNKNOWN_SENTINEL.to_string()),
        }
    }
}

fn number_from_hcl(n: &hcl::Number) -> Value {
    if let Some(i) = n.as_i64() {
        Value::Number(Number::from(i))
    } else if let Some(u) = n.as_u64() {
        Value::Number(Number::from(u))
    } else {
        n.as_f64().map(Value::float).unwrap_or(Value::Null)
    }
}

fn number_to_hcl(n: &Number) -> hcl::Value {
    if let Some(i) = n.as_i64() {
        hcl::Value::Number(hcl::Number::from(i))
    } else if let Some(u) = n.as_u64() {
        hcl::Value::Number(hcl::Number::from(u))
    } else {
        n.as_f64()
            .and_then(hcl::Number::from_f64)
            .map(hcl::Value::Number)
            .unwrap_or(hcl::Value::Null)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::int(i64::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::int(n)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<ValueMap> for Value {
    fn from(map: ValueMap) -> Self {
        Value::Map(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_equivalence() {
        assert!(Value::int(10).equivalent(&Value::float(10.0)));
        assert!(!Value::int(10).equivalent(&Value::int(11)));
        assert_ne!(Value::int(10), Value::float(10.0));
    }

    #[test]
    fn test_map_equivalence_ignores_order() {
        let a = Value::map([("a", Value::int(1)), ("b", Value::from("x"))]);
        let b = Value::map([("b", Value::from("x")), ("a", Value::int(1))]);
        assert!(a.equivalent(&b));
    }

    #[test]
    fn test_unknown_survives_json() {
        let value = Value::map([("id", Value::Unknown), ("name", Value::from("web"))]);
        let json = serde_json::to_string(&value).unwrap();
        assert!(json.contains(UNKNOWN_SENTINEL));
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_unknown_survives_hcl() {
        let value = Value::List(vec![Value::Unknown, Value::int(3)]);
        let hcl_value: hcl::Value = value.clone().into();
        assert_eq!(Value::from(hcl_value), value);
    }

    #[test]
    fn test_display() {
        let value = Value::map([
            ("size", Value::int(10)),
            ("tags", Value::List(vec![Value::from("a")])),
            ("id", Value::Unknown),
        ]);
        assert_eq!(
            value.to_string(),
            r#"{ size = 10, tags = ["a"], id = (known after apply) }"#
        );
    }

    #[test]
    fn test_overlay() {
        let mut value = Value::map([("key", Value::from("x"))]);
        let mut overrides = ValueMap::new();
        overrides.insert("value".to_string(), Value::from("y"));
        value.overlay(&overrides);
        assert_eq!(value.get("key"), Some(&Value::from("x")));
        assert_eq!(value.get("value"), Some(&Value::from("y")));
    }
}
