//! A dynamic value type standing in for the untyped payloads (task input,
//! step input, agent results) that flow through the orchestrator.
//!
//! Grounded on Design Notes "Untyped payloads": tag the variants, dispatch on
//! the tag, and hand agents a typed interface built on top of this sum type
//! rather than threading `serde_json::Value` (or worse, `Box<dyn Any>`)
//! through every seam.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Ordered map so that serialization and iteration order are deterministic;
/// payloads are small enough that this never matters for performance.
pub type Map = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Value>),
    Map(Map),
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl Value {
    pub fn map() -> Self {
        Value::Map(Map::new())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut Map> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Look up a dotted path (`"a.b.c"`) into nested maps. Missing
    /// intermediate keys, or indexing into a non-map, resolve to `None` (the
    /// "absent value" of the condition-evaluation spec) rather than erroring.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut current = self;
        for segment in path.split('.') {
            current = current.as_map()?.get(segment)?;
        }
        Some(current)
    }

    /// Merge `other`'s top-level entries into `self`, with `other`'s keys
    /// taking precedence. No-op unless both sides are maps.
    pub fn merge_map(&mut self, other: &Map) {
        if let Value::Map(m) = self {
            for (k, v) in other {
                m.insert(k.clone(), v.clone());
            }
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    pub fn from_json(v: serde_json::Value) -> Self {
        serde_json::from_value(v).unwrap_or(Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s}"),
            Value::List(_) | Value::Map(_) => write!(f, "{}", self.to_json()),
        }
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

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<Map> for Value {
    fn from(m: Map) -> Self {
        Value::Map(m)
    }
}

impl From<Vec<Value>> for Value {
    fn from(l: Vec<Value>) -> Self {
        Value::List(l)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Value {
        let mut inner = Map::new();
        inner.insert("c".to_string(), Value::Number(42.0));
        let mut outer = Map::new();
        outer.insert("b".to_string(), Value::Map(inner));
        Value::Map(outer)
    }

    #[test]
    fn get_path_resolves_nested_fields() {
        let v = sample();
        assert_eq!(v.get_path("b.c"), Some(&Value::Number(42.0)));
    }

    #[test]
    fn get_path_missing_is_none() {
        let v = sample();
        assert_eq!(v.get_path("b.missing"), None);
        assert_eq!(v.get_path("nope.c"), None);
    }

    #[test]
    fn merge_map_prefers_incoming_keys() {
        let mut base = Value::map();
        base.as_map_mut()
            .unwrap()
            .insert("x".to_string(), Value::Number(1.0));
        let mut incoming = Map::new();
        incoming.insert("x".to_string(), Value::Number(2.0));
        incoming.insert("y".to_string(), Value::Bool(true));
        base.merge_map(&incoming);
        assert_eq!(base.get_path("x"), Some(&Value::Number(2.0)));
        assert_eq!(base.get_path("y"), Some(&Value::Bool(true)));
    }
}
