// SPDX-License-Identifier: Apache-2.0
//
// Trellis storage backend abstraction.
//
// This crate provides the pluggable record-storage interface for Trellis.
// The core `StorageBackend` trait defines the contract every backend must
// implement, so the store facade can swap storage engines without changing
// application logic. Records are keyed by `ObjectPath` and carried in a
// `StoredRecord` envelope (type tag, revision metadata, field record).
//
// # Modules
//
// - `backend` -- The `StorageBackend` trait and the `StoredRecord` envelope.
// - `error` -- The `StorageError` enum covering all backend failure modes.
// - `memory` -- An in-memory `BTreeMap`-based backend for testing and
//   ephemeral workloads.
// - `redb_backend` (feature `redb-backend`) -- A durable single-file backend
//   with an ephemeral in-memory mode of the same engine.

pub mod backend;
pub mod error;
pub mod memory;

// Optional persistent backend — feature-gated to keep the default build lean.
#[cfg(feature = "redb-backend")]
pub mod redb_backend;

// Re-export the most commonly used types at the crate root for convenience.
pub use backend::{StorageBackend, StoredRecord};
pub use error::StorageError;
pub use memory::InMemoryBackend;

#[cfg(feature = "redb-backend")]
pub use redb_backend::RedbBackend;
