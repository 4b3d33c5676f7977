//! Document and field model
//!
//! Documents are flat maps of named fields, addressed by slash-separated
//! paths. Fields serialize to JSON for wire adapters and debugging.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single field value within a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum FieldValue {
    Str(String),
    Int(i64),
    Bool(bool),
    /// A concrete timestamp
    Time(DateTime<Utc>),
    /// Sentinel replaced with the backend clock at write time
    ServerTime,
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::Time(t) => Some(*t),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Str(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Str(s)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Int(n)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(t: DateTime<Utc>) -> Self {
        FieldValue::Time(t)
    }
}

/// A document's fields, keyed by field name
pub type Fields = BTreeMap<String, FieldValue>;

/// Serialize fields to JSON bytes
pub fn encode(fields: &Fields) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(fields)
}

/// Deserialize fields from JSON bytes
pub fn decode(bytes: &[u8]) -> Result<Fields, serde_json::Error> {
    serde_json::from_slice(bytes)
}

/// Ascending order over a named field, applied to collection subscriptions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy(String);

impl OrderBy {
    pub fn field(name: impl Into<String>) -> Self {
        OrderBy(name.into())
    }

    pub fn field_name(&self) -> &str {
        &self.0
    }
}

/// Path to a single document, e.g. `rooms/483920`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocPath(String);

impl DocPath {
    pub fn new(path: impl Into<String>) -> Self {
        DocPath(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Final path segment (the document id)
    pub fn id(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// The collection containing this document
    pub fn parent(&self) -> CollectionPath {
        match self.0.rsplit_once('/') {
            Some((parent, _)) => CollectionPath::new(parent),
            None => CollectionPath::new(""),
        }
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Path to a collection, e.g. `rooms/483920/messages`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectionPath(String);

impl CollectionPath {
    pub fn new(path: impl Into<String>) -> Self {
        CollectionPath(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path of a document inside this collection
    pub fn doc(&self, id: &str) -> DocPath {
        DocPath::new(format!("{}/{}", self.0, id))
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
