// SPDX-License-Identifier: Apache-2.0
//! Values and records.
//!
//! A [`Record`] is the serialized form of an object: an ordered mapping from
//! persisted-field name to [`Value`]. Records are backend-agnostic; the
//! canonical JSON encoding produced by [`Record::to_json`] is the stable wire
//! form that durable backends persist, so it must round-trip exactly and must
//! not change shape between versions.
//!
//! Timestamps encode as `{"$timestamp": "<RFC 3339 UTC>"}` at microsecond
//! precision; `$timestamp` is therefore a reserved key that plain maps may
//! not use.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

/// Reserved key marking an encoded timestamp inside the JSON form.
const TIMESTAMP_KEY: &str = "$timestamp";

/// Errors produced while encoding or decoding values.
#[derive(Debug, Error)]
pub enum ValueError {
    /// A live object reference appeared in a value tree. References are
    /// never serializable; the referenced object's path must be stored
    /// instead.
    #[error("a live object reference is not serializable; store the object's path instead")]
    ObjectReference,

    /// A float with no JSON representation (NaN or infinity).
    #[error("non-finite float {0} is not representable")]
    NonFiniteFloat(f64),

    /// A map used a key reserved by the encoding.
    #[error("map key {0:?} is reserved by the record encoding")]
    ReservedKey(String),

    /// The stored payload could not be decoded back into a record.
    #[error("malformed record encoding: {0}")]
    Decode(String),
}

/// A handle to another live in-process object.
///
/// `LiveRef` exists so that a field accessor *can* hand the serializer an
/// object reference and get a typed rejection back, rather than the store
/// attempting to persist an object graph. Equality is handle identity.
#[derive(Clone)]
pub struct LiveRef(Arc<dyn Any + Send + Sync>);

impl LiveRef {
    /// Wrap a shared object in a reference handle.
    pub fn new<T: Any + Send + Sync>(target: Arc<T>) -> Self {
        Self(target)
    }

    /// Wrap an already-erased shared object.
    pub fn from_arc(target: Arc<dyn Any + Send + Sync>) -> Self {
        Self(target)
    }

    /// The referenced object.
    pub fn target(&self) -> &Arc<dyn Any + Send + Sync> {
        &self.0
    }
}

impl PartialEq for LiveRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for LiveRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LiveRef(<live object>)")
    }
}

/// The kind of a [`Value`], used for field type checks and error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Bool,
    Int,
    Float,
    Text,
    Timestamp,
    List,
    Map,
    Reference,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Text => "text",
            Self::Timestamp => "timestamp",
            Self::List => "list",
            Self::Map => "map",
            Self::Reference => "reference",
        };
        f.write_str(name)
    }
}

/// A single field value.
///
/// The supported kinds are closed: primitives, timestamps, and composites
/// built recursively from them. [`Value::Ref`] is representable so the
/// serializer can reject it with a typed error, but it never survives a
/// round trip through storage.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Ref(LiveRef),
}

impl Value {
    /// The kind of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Null => ValueKind::Null,
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::Float(_) => ValueKind::Float,
            Self::Text(_) => ValueKind::Text,
            Self::Timestamp(_) => ValueKind::Timestamp,
            Self::List(_) => ValueKind::List,
            Self::Map(_) => ValueKind::Map,
            Self::Ref(_) => ValueKind::Reference,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric accessor; integers widen to floats.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(x) => Some(*x),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Truncate a timestamp to the encoding's microsecond precision.
    pub fn canonical_timestamp(t: DateTime<Utc>) -> DateTime<Utc> {
        DateTime::from_timestamp_micros(t.timestamp_micros()).unwrap_or(t)
    }

    /// Encode into the canonical JSON form.
    pub fn to_json(&self) -> Result<serde_json::Value, ValueError> {
        match self {
            Self::Null => Ok(serde_json::Value::Null),
            Self::Bool(b) => Ok(serde_json::Value::Bool(*b)),
            Self::Int(i) => Ok(serde_json::Value::Number((*i).into())),
            Self::Float(x) => serde_json::Number::from_f64(*x)
                .map(serde_json::Value::Number)
                .ok_or(ValueError::NonFiniteFloat(*x)),
            Self::Text(s) => Ok(serde_json::Value::String(s.clone())),
            Self::Timestamp(t) => {
                let canonical = Self::canonical_timestamp(*t)
                    .to_rfc3339_opts(SecondsFormat::Micros, true);
                let mut marker = serde_json::Map::with_capacity(1);
                marker.insert(TIMESTAMP_KEY.to_string(), serde_json::Value::String(canonical));
                Ok(serde_json::Value::Object(marker))
            }
            Self::List(items) => {
                let mut encoded = Vec::with_capacity(items.len());
                for item in items {
                    encoded.push(item.to_json()?);
                }
                Ok(serde_json::Value::Array(encoded))
            }
            Self::Map(entries) => {
                let mut encoded = serde_json::Map::with_capacity(entries.len());
                for (key, value) in entries {
                    if key == TIMESTAMP_KEY {
                        return Err(ValueError::ReservedKey(key.clone()));
                    }
                    encoded.insert(key.clone(), value.to_json()?);
                }
                Ok(serde_json::Value::Object(encoded))
            }
            Self::Ref(_) => Err(ValueError::ObjectReference),
        }
    }

    /// Decode from the canonical JSON form.
    pub fn from_json(json: &serde_json::Value) -> Result<Value, ValueError> {
        match json {
            serde_json::Value::Null => Ok(Self::Null),
            serde_json::Value::Bool(b) => Ok(Self::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Self::Int(i))
                } else if let Some(x) = n.as_f64() {
                    Ok(Self::Float(x))
                } else {
                    Err(ValueError::Decode(format!("unrepresentable number {n}")))
                }
            }
            serde_json::Value::String(s) => Ok(Self::Text(s.clone())),
            serde_json::Value::Array(items) => {
                let mut decoded = Vec::with_capacity(items.len());
                for item in items {
                    decoded.push(Self::from_json(item)?);
                }
                Ok(Self::List(decoded))
            }
            serde_json::Value::Object(entries) => {
                if let Some(raw) = entries.get(TIMESTAMP_KEY) {
                    if entries.len() != 1 {
                        return Err(ValueError::Decode(format!(
                            "{TIMESTAMP_KEY:?} marker mixed with other keys"
                        )));
                    }
                    let raw = raw.as_str().ok_or_else(|| {
                        ValueError::Decode(format!("{TIMESTAMP_KEY:?} value is not a string"))
                    })?;
                    let parsed = DateTime::parse_from_rfc3339(raw).map_err(|err| {
                        ValueError::Decode(format!("bad timestamp {raw:?}: {err}"))
                    })?;
                    return Ok(Self::Timestamp(parsed.with_timezone(&Utc)));
                }
                let mut decoded = BTreeMap::new();
                for (key, value) in entries {
                    decoded.insert(key.clone(), Self::from_json(value)?);
                }
                Ok(Self::Map(decoded))
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Self::Timestamp(t)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(entries: BTreeMap<String, Value>) -> Self {
        Self::Map(entries)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        match opt {
            Some(v) => v.into(),
            None => Self::Null,
        }
    }
}

/// An ordered mapping from field name to value.
///
/// Iteration order is deterministic (sorted by field name), which keeps the
/// canonical encoding stable regardless of insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: BTreeMap<String, Value>,
}

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a field, returning the previous value if any.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(name.into(), value.into())
    }

    /// Look up a field by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// True if the record contains the named field.
    pub fn contains_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate fields in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Iterate field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Encode into the canonical JSON object form.
    pub fn to_json(&self) -> Result<serde_json::Value, ValueError> {
        let mut encoded = serde_json::Map::with_capacity(self.fields.len());
        for (name, value) in &self.fields {
            encoded.insert(name.clone(), value.to_json()?);
        }
        Ok(serde_json::Value::Object(encoded))
    }

    /// Decode from the canonical JSON object form.
    pub fn from_json(json: &serde_json::Value) -> Result<Self, ValueError> {
        let entries = json.as_object().ok_or_else(|| {
            ValueError::Decode(format!("record payload is not an object: {json}"))
        })?;
        let mut fields = BTreeMap::new();
        for (name, value) in entries {
            fields.insert(name.clone(), Value::from_json(value)?);
        }
        Ok(Self { fields })
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}
