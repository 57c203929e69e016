// SPDX-License-Identifier: Apache-2.0
//! Bidirectional mapping between storable objects and [`Record`]s.
//!
//! Serialization walks only the fields the type descriptor marks persisted;
//! derived fields are skipped deterministically and recompute after load.
//! Every value is validated before it reaches a backend: live object
//! references are rejected outright (persist the referenced object's path
//! instead), kinds must match the field declarations, and floats must be
//! finite. Timestamps are canonicalized to microsecond precision so the
//! stored form round-trips exactly.

use std::sync::Arc;

use thiserror::Error;
use trellis_types::{Record, Value, ValueError, ValueKind};

use crate::model::{FieldDescriptor, FieldError, FieldKind, FieldRole, Persistent};
use crate::registry::TypeRegistration;

/// Errors raised while converting between objects and records.
#[derive(Debug, Error)]
pub enum SerializationError {
    /// A field held a live object reference, which is never serializable.
    #[error(
        "field {field:?} of {type_name} holds a live object reference; \
         store the referenced object's path instead"
    )]
    ObjectReference {
        type_name: &'static str,
        field: String,
    },

    /// A value's kind disagrees with the field's declared kind.
    #[error("field {field:?} of {type_name} expects {expected}, got {actual}")]
    KindMismatch {
        type_name: &'static str,
        field: String,
        expected: FieldKind,
        actual: ValueKind,
    },

    /// A record carried a field name outside the type's persisted set.
    #[error("{type_name} has no persisted field {field:?}")]
    UnknownField {
        type_name: &'static str,
        field: String,
    },

    /// A field value cannot be represented in the canonical encoding.
    #[error("field {field:?}: {source}")]
    Unrepresentable {
        field: String,
        #[source]
        source: ValueError,
    },

    /// The object itself refused a field access.
    #[error(transparent)]
    Field(#[from] FieldError),

    /// A stored payload could not be decoded.
    #[error("stored record could not be decoded: {0}")]
    Decode(String),
}

/// Converts storable objects to and from backend-agnostic records.
#[derive(Debug, Clone, Copy, Default)]
pub struct Serializer;

impl Serializer {
    pub fn new() -> Self {
        Self
    }

    /// Serialize an object's persisted fields into a record.
    pub fn serialize(&self, obj: &dyn Persistent) -> Result<Record, SerializationError> {
        let descriptor = obj.descriptor();
        let mut record = Record::new();
        for field in descriptor.persisted_fields() {
            let value = obj.get_field(field.name)?;
            validate(descriptor.name, field, &value)?;
            record.insert(field.name, canonicalize(value));
        }
        Ok(record)
    }

    /// Reconstruct an object from a record.
    ///
    /// A blank instance is created and only the persisted fields present in
    /// the record are set; derived fields are left for the domain model to
    /// recompute on first access.
    pub fn deserialize(
        &self,
        registration: &TypeRegistration,
        record: &Record,
    ) -> Result<Arc<dyn Persistent>, SerializationError> {
        let descriptor = registration.descriptor();
        let obj = registration.instantiate();
        for (name, value) in record.iter() {
            let field = descriptor
                .field(name)
                .filter(|f| f.role == FieldRole::Persisted)
                .ok_or_else(|| SerializationError::UnknownField {
                    type_name: descriptor.name,
                    field: name.to_string(),
                })?;
            if !field.kind.accepts(value.kind()) {
                return Err(SerializationError::KindMismatch {
                    type_name: descriptor.name,
                    field: name.to_string(),
                    expected: field.kind,
                    actual: value.kind(),
                });
            }
            obj.set_field(name, value.clone())?;
        }
        Ok(obj)
    }

    /// Serialize an object to a pretty-printed JSON string.
    pub fn to_json_string(&self, obj: &dyn Persistent) -> Result<String, SerializationError> {
        let record = self.serialize(obj)?;
        let json = record
            .to_json()
            .map_err(|err| SerializationError::Decode(err.to_string()))?;
        serde_json::to_string_pretty(&json)
            .map_err(|err| SerializationError::Decode(err.to_string()))
    }

    /// Reconstruct an object from a JSON string produced by
    /// [`to_json_string`](Self::to_json_string).
    pub fn from_json_string(
        &self,
        registration: &TypeRegistration,
        json: &str,
    ) -> Result<Arc<dyn Persistent>, SerializationError> {
        let parsed: serde_json::Value = serde_json::from_str(json)
            .map_err(|err| SerializationError::Decode(err.to_string()))?;
        let record =
            Record::from_json(&parsed).map_err(|err| SerializationError::Decode(err.to_string()))?;
        self.deserialize(registration, &record)
    }
}

/// Check one field value against its declaration and the closed set of
/// serializable kinds, recursing into composites.
fn validate(
    type_name: &'static str,
    field: &FieldDescriptor,
    value: &Value,
) -> Result<(), SerializationError> {
    // Walk the tree first so a live reference reports as such rather than
    // as a kind mismatch.
    validate_tree(type_name, field.name, value)?;
    if !field.kind.accepts(value.kind()) {
        return Err(SerializationError::KindMismatch {
            type_name,
            field: field.name.to_string(),
            expected: field.kind,
            actual: value.kind(),
        });
    }
    Ok(())
}

fn validate_tree(
    type_name: &'static str,
    field: &str,
    value: &Value,
) -> Result<(), SerializationError> {
    match value {
        Value::Ref(_) => Err(SerializationError::ObjectReference {
            type_name,
            field: field.to_string(),
        }),
        Value::Float(x) if !x.is_finite() => Err(SerializationError::Unrepresentable {
            field: field.to_string(),
            source: ValueError::NonFiniteFloat(*x),
        }),
        Value::List(items) => {
            for item in items {
                validate_tree(type_name, field, item)?;
            }
            Ok(())
        }
        Value::Map(entries) => {
            for value in entries.values() {
                validate_tree(type_name, field, value)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Truncate every timestamp in the value tree to the encoding's precision.
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Timestamp(t) => Value::Timestamp(Value::canonical_timestamp(t)),
        Value::List(items) => Value::List(items.into_iter().map(canonicalize).collect()),
        Value::Map(entries) => Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k, canonicalize(v)))
                .collect(),
        ),
        other => other,
    }
}
