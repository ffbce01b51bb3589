//! Dynamically typed attribute values.
//!
//! Span and resource attributes are heterogeneous: scalars, nested maps and
//! lists all occur (measurements are a map of maps, breadcrumbs a list of
//! maps). `Value` is the tagged variant covering those shapes, with a string
//! coercion used wherever a downstream component needs text form.

use std::collections::BTreeMap;

/// Attribute map with deterministic iteration order.
pub type AttributeMap = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Int(i64),
    Double(f64),
    Bool(bool),
    Bytes(Vec<u8>),
    Map(AttributeMap),
    Slice(Vec<Value>),
}

impl Value {
    /// Coerces any value to its string form. Scalars render directly,
    /// compound values render as compact JSON.
    pub fn as_string(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            Value::Int(i) => i.to_string(),
            Value::Double(d) => d.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
            Value::Map(_) | Value::Slice(_) => self.to_json().to_string(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&AttributeMap> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_slice(&self) -> Option<&[Value]> {
        match self {
            Value::Slice(s) => Some(s),
            _ => None,
        }
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Double(d) => serde_json::Number::from_f64(*d)
                .map(serde_json::Value::Number)
                .unwrap_or_else(|| serde_json::Value::String(d.to_string())),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Bytes(b) => serde_json::Value::String(String::from_utf8_lossy(b).into_owned()),
            Value::Map(m) => serde_json::Value::Object(
                m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Value::Slice(s) => serde_json::Value::Array(s.iter().map(Value::to_json).collect()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_string_coercion() {
        assert_eq!(Value::Str("abc".into()).as_string(), "abc");
        assert_eq!(Value::Int(42).as_string(), "42");
        assert_eq!(Value::Bool(true).as_string(), "true");
        assert_eq!(Value::Double(1.5).as_string(), "1.5");
    }

    #[test]
    fn test_map_renders_as_json() {
        let mut map = AttributeMap::new();
        map.insert("value".into(), Value::Double(123.0));
        map.insert("unit".into(), Value::Str("millisecond".into()));
        let rendered = Value::Map(map).as_string();
        let parsed: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(parsed["unit"], "millisecond");
        assert_eq!(parsed["value"], 123.0);
    }

    #[test]
    fn test_slice_renders_as_json_array() {
        let rendered = Value::Slice(vec![Value::Int(1), Value::Str("a".into())]).as_string();
        assert_eq!(rendered, r#"[1,"a"]"#);
    }

    #[test]
    fn test_as_double_accepts_int() {
        assert_eq!(Value::Int(7).as_double(), Some(7.0));
        assert_eq!(Value::Str("7".into()).as_double(), None);
    }
}
