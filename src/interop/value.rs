//! Host-side values
//!
//! The bridge treats host values as opaque except through descriptors; this
//! enum is the common currency descriptors, constructors and extractors trade.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::types::Scalar;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    /// Host sequence; serialized through a pointer as a contiguous array
    List(Vec<Value>),
    /// Positional record produced for descriptors without a constructor
    #[serde(skip_deserializing)]
    Record(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Build an object from `(name, value)` pairs
    pub fn object<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Self::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Short description used in shape errors
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::List(_) => "list",
            Self::Record(_) => "record",
            Self::Object(_) => "object",
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Field lookup on objects
    pub fn get(&self, name: &str) -> Option<&Value> {
        match self {
            Self::Object(map) => map.get(name),
            _ => None,
        }
    }

    /// Positional elements of a record or list
    pub fn positional(&self) -> Option<&[Value]> {
        match self {
            Self::Record(items) | Self::List(items) => Some(items),
            _ => None,
        }
    }
}

impl From<Scalar> for Value {
    fn from(scalar: Scalar) -> Self {
        match scalar {
            Scalar::Int(v) => Self::Int(v),
            Scalar::Float(v) => Self::Float(v),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_shapes() {
        let v: Value = serde_json::from_str(r#"{"x": 3, "y": -4.5, "tiles": [1, null]}"#).unwrap();
        assert_eq!(v.get("x"), Some(&Value::Int(3)));
        assert_eq!(v.get("y"), Some(&Value::Float(-4.5)));
        assert_eq!(
            v.get("tiles"),
            Some(&Value::List(vec![Value::Int(1), Value::Null]))
        );
    }

    #[test]
    fn records_serialize_as_arrays() {
        let v = Value::Record(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(serde_json::to_string(&v).unwrap(), "[1,2]");
    }

    #[test]
    fn positional_access() {
        let r = Value::Record(vec![Value::Int(7)]);
        assert_eq!(r.positional().map(|f| f.len()), Some(1));
        assert!(Value::Int(7).positional().is_none());
    }
}
