// SPDX-License-Identifier: Apache-2.0
//! The storable-object protocol.
//!
//! Trellis does not know how domain objects compute their values; it only
//! needs a stable, enumerable description of which fields exist, which are
//! persisted, and typed get/set access by field name. That contract is the
//! [`Persistent`] trait plus a static [`TypeDescriptor`] table per type —
//! deliberately a compile-time table rather than runtime reflection.
//!
//! Fields come in two roles: [`FieldRole::Persisted`] fields are durably
//! stored and restored on load; [`FieldRole::Derived`] fields are never
//! serialized and are expected to recompute from persisted state on access
//! (that recomputation is the domain model's concern, not the store's).
//!
//! Every stored object also carries a [`StoreBinding`]: its current path
//! (None when detached) and a weak back-reference to the owning store, which
//! powers `path()`-style introspection and `save()`.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, Weak};

use async_trait::async_trait;
use thiserror::Error;
use trellis_types::{ObjectPath, Value, ValueKind};

use crate::error::StoreError;
use crate::store::{Store, StoreInner};

/// Errors raised by field access on a storable object.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    /// The object's type declares no field with this name.
    #[error("type {type_name} has no field {field:?}")]
    UnknownField {
        type_name: &'static str,
        field: String,
    },
}

/// Declared kind of a field's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Bool,
    Int,
    Float,
    Text,
    Timestamp,
    List,
    Map,
}

impl FieldKind {
    /// Whether a value of `kind` may be stored in a field of this kind.
    ///
    /// `Null` is accepted everywhere (fields are nullable), and integer
    /// values widen into float fields.
    pub fn accepts(&self, kind: ValueKind) -> bool {
        matches!(
            (self, kind),
            (_, ValueKind::Null)
                | (Self::Bool, ValueKind::Bool)
                | (Self::Int, ValueKind::Int)
                | (Self::Float, ValueKind::Float)
                | (Self::Float, ValueKind::Int)
                | (Self::Text, ValueKind::Text)
                | (Self::Timestamp, ValueKind::Timestamp)
                | (Self::List, ValueKind::List)
                | (Self::Map, ValueKind::Map)
        )
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Text => "text",
            Self::Timestamp => "timestamp",
            Self::List => "list",
            Self::Map => "map",
        };
        f.write_str(name)
    }
}

/// Whether a field is durably stored or recomputed after load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    /// Stored on save, restored on load.
    Persisted,
    /// Never serialized; recomputes lazily from persisted state.
    Derived,
}

/// Static description of one field.
#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub kind: FieldKind,
    pub role: FieldRole,
}

/// Static description of a storable type: its name and field table.
///
/// One `static` instance exists per type; the registry and the type checks
/// compare descriptors by address.
#[derive(Debug)]
pub struct TypeDescriptor {
    pub name: &'static str,
    pub fields: &'static [FieldDescriptor],
}

impl TypeDescriptor {
    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Iterate the persisted fields in declaration order.
    pub fn persisted_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields
            .iter()
            .filter(|f| f.role == FieldRole::Persisted)
    }
}

/// The object protocol the store consumes.
///
/// Implementations provide get/set access to named fields carrying [`Value`]s
/// and embed a [`StoreBinding`] the store uses to track path and ownership.
/// The store itself only ever touches persisted fields; derived fields are
/// read or written by nobody but the domain model.
#[async_trait]
pub trait Persistent: Send + Sync + 'static {
    /// The static descriptor for this object's type.
    fn descriptor(&self) -> &'static TypeDescriptor;

    /// Read the current value of a named field.
    fn get_field(&self, name: &str) -> Result<Value, FieldError>;

    /// Set a named field.
    fn set_field(&self, name: &str, value: Value) -> Result<(), FieldError>;

    /// The object's store-awareness state.
    fn binding(&self) -> &StoreBinding;

    /// Borrow as `Any` for runtime type checks.
    fn as_any(&self) -> &dyn Any;

    /// Convert a shared handle into `Any` for downcasting.
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    /// Re-persist the object's current field values at its tracked path.
    ///
    /// Fails with [`StoreError::NotTracked`] if the object is detached. For
    /// type-erased handles use [`Store::save`] directly.
    async fn save(&self) -> Result<(), StoreError>
    where
        Self: Sized,
    {
        let store = self.binding().store().ok_or(StoreError::NotTracked)?;
        store.save(self).await
    }
}

impl std::fmt::Debug for dyn Persistent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(self.descriptor().name)
            .finish_non_exhaustive()
    }
}

/// Companion trait for concrete storable types: the static descriptor and a
/// blank-instance constructor used by deserialization and [`Store::create`].
pub trait PersistentType: Persistent + Sized {
    /// The static descriptor shared by all instances.
    fn type_descriptor() -> &'static TypeDescriptor;

    /// Construct a blank instance with every field at its default.
    fn blank() -> Self;
}

/// Bound state: the path and the owning store.
struct BoundState {
    path: ObjectPath,
    store: Weak<StoreInner>,
}

/// An object's store-awareness state.
///
/// Detached objects (never stored, or deleted) have no path and no store.
/// The store reference is weak: objects never keep their store alive.
#[derive(Default)]
pub struct StoreBinding {
    state: RwLock<Option<BoundState>>,
}

impl StoreBinding {
    /// Create a detached binding.
    pub fn new() -> Self {
        Self::default()
    }

    /// The object's current path, or `None` when detached.
    pub fn path(&self) -> Option<ObjectPath> {
        self.read().as_ref().map(|s| s.path.clone())
    }

    /// The owning store, if the object is bound and the store is alive.
    pub fn store(&self) -> Option<Store> {
        self.read()
            .as_ref()
            .and_then(|s| s.store.upgrade())
            .map(Store::from_inner)
    }

    /// True when the object is tracked by some store.
    pub fn is_bound(&self) -> bool {
        self.read().is_some()
    }

    /// The object's path, but only if it is bound to `store`.
    pub(crate) fn path_if_bound_to(&self, store: &Arc<StoreInner>) -> Option<ObjectPath> {
        self.read().as_ref().and_then(|s| {
            let owner = s.store.upgrade()?;
            if Arc::ptr_eq(&owner, store) {
                Some(s.path.clone())
            } else {
                None
            }
        })
    }

    pub(crate) fn bind(&self, path: ObjectPath, store: &Arc<StoreInner>) {
        *self.write() = Some(BoundState {
            path,
            store: Arc::downgrade(store),
        });
    }

    pub(crate) fn clear(&self) {
        *self.write() = None;
    }

    // A poisoned lock only means some thread panicked mid-update; the state
    // itself is still a plain Option and safe to use.
    fn read(&self) -> std::sync::RwLockReadGuard<'_, Option<BoundState>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Option<BoundState>> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for StoreBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreBinding")
            .field("path", &self.path())
            .finish()
    }
}
