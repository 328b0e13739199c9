use std::collections::HashMap;
use std::fmt;
use std::hash::BuildHasher;

use serde::{Deserialize, Serialize};

/// Canonical column value handed out by a [`Row`]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    /// Unsigned storage, e.g. one half of an IPv6 address
    Uint(u64),
    Text(String),
}

impl Value {
    pub(crate) fn as_integer(&self) -> Option<i128> {
        match self {
            Value::Int(v) => Some(i128::from(*v)),
            Value::Uint(v) => Some(i128::from(*v)),
            Value::Text(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Uint(v) => write!(f, "{v}"),
            Value::Text(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Uint(v)
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

/// Read access to the columns of one flow record
///
/// `column` is an underlying storage name (`e0id7`, `e0id27p0`, or an
/// aggregate like `sum(e0id1)`); `None` means the record has no such value.
pub trait Row {
    fn value(&self, column: &str) -> Option<Value>;
}

impl<S: BuildHasher> Row for HashMap<String, Value, S> {
    fn value(&self, column: &str) -> Option<Value> {
        self.get(column).cloned()
    }
}

impl<R: Row + ?Sized> Row for &R {
    fn value(&self, column: &str) -> Option<Value> {
        (**self).value(column)
    }
}
