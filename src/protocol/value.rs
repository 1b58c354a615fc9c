//! Positional statement arguments and row values

use serde::{Deserialize, Serialize};

/// A single column or parameter value
///
/// Marshalling to the wire format is done by the [`Wire`](super::Wire)
/// implementation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// SQL NULL
    Null,
    /// BOOLEAN
    Boolean(bool),
    /// SMALLINT / INTEGER / BIGINT
    Integer(i64),
    /// FLOAT / DOUBLE PRECISION
    Double(f64),
    /// CHAR / VARCHAR / text BLOB
    Text(String),
    /// Binary BLOB / OCTETS
    Binary(Vec<u8>),
}

impl Value {
    /// Whether this is SQL NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Binary(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// An argument associated with a 1-based position, optionally named
#[derive(Debug, Clone, PartialEq)]
pub struct NamedValue {
    /// Parameter name, if the caller supplied one (not used for binding)
    pub name: Option<String>,
    /// 1-based position
    pub ordinal: usize,
    /// Bound value
    pub value: Value,
}

impl NamedValue {
    /// Positional argument
    pub fn new(ordinal: usize, value: impl Into<Value>) -> Self {
        Self {
            name: None,
            ordinal,
            value: value.into(),
        }
    }

    /// Named argument at a position
    pub fn named(name: impl Into<String>, ordinal: usize, value: impl Into<Value>) -> Self {
        Self {
            name: Some(name.into()),
            ordinal,
            value: value.into(),
        }
    }
}

/// Flatten ordinal-tagged arguments into the positional list sent to the server.
///
/// The sort is stable: arguments sharing an ordinal keep the caller's order.
pub fn flatten_named(mut args: Vec<NamedValue>) -> Vec<Value> {
    args.sort_by_key(|nv| nv.ordinal);
    args.into_iter().map(|nv| nv.value).collect()
}
