// SPDX-License-Identifier: Apache-2.0
//! Trellis object store.
//!
//! A path-addressed database mapping hierarchical string keys like
//! `/Instruments/AAPL_C_150` to typed domain objects. Three concerns meet
//! here:
//!
//! - **Selective serialization** — only fields a type declares as persisted
//!   are stored; derived fields recompute after load ([`Serializer`]).
//! - **Identity consistency** — repeated lookups of one path return the same
//!   live instance, so mutations are visible to every holder
//!   ([`IdentityCache`]).
//! - **Transactional writes** — a scoped [`Transaction`] buffers writes and
//!   deletes, applying them in order on commit or discarding them on
//!   rollback (best-effort atomicity; see [`transaction`]).
//!
//! Storage engines are swappable: an in-memory backend and a durable
//! single-file backend ship in `trellis-storage`, selected by URL through
//! [`connect`].
//!
//! ```rust
//! use trellis_store::connect;
//!
//! let db = connect("memory://").unwrap();
//! // db.register_type::<VanillaOption>("/Instruments/*".parse().unwrap());
//! // let opt = db.create::<VanillaOption>(&"/Instruments/X".parse().unwrap()).await?;
//! ```

pub mod cache;
pub mod error;
pub mod model;
pub mod registry;
pub mod serializer;
pub mod store;
pub mod transaction;

#[cfg(test)]
pub(crate) mod testutil;

pub use cache::IdentityCache;
pub use error::{ConnectError, StoreError};
pub use model::{
    FieldDescriptor, FieldError, FieldKind, FieldRole, Persistent, PersistentType, StoreBinding,
    TypeDescriptor,
};
pub use registry::{TypeRegistration, TypeRegistry};
pub use serializer::{SerializationError, Serializer};
pub use store::{connect, Store};
pub use transaction::{Transaction, TransactionError, TransactionManager, TransactionPhase};

// Re-export the value model and backends so consumers need only this crate.
pub use trellis_storage::{InMemoryBackend, StorageBackend, StorageError, StoredRecord};
pub use trellis_types::{
    LiveRef, ObjectPath, PathError, PathPattern, Record, Value, ValueError, ValueKind,
};

#[cfg(feature = "redb-backend")]
pub use trellis_storage::RedbBackend;
