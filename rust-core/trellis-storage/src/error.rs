// SPDX-License-Identifier: Apache-2.0
//
// Storage error types for the Trellis backend abstraction.
//
// Provides a unified error enum covering all failure modes a storage backend
// may encounter: I/O errors, missing paths, encoding failures, data
// corruption, and backend unavailability.

use thiserror::Error;
use trellis_types::ObjectPath;

/// Errors that can occur when interacting with a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred in the underlying storage layer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No record is stored at the requested path.
    #[error("no record at path: {0}")]
    NotFound(ObjectPath),

    /// Failed to encode a record for storage.
    #[error("encoding error: {0}")]
    Serialization(String),

    /// The stored data is corrupted or in an unexpected format.
    #[error("corrupted data: {0}")]
    CorruptedData(String),

    /// The storage backend is not available (e.g., already closed).
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
}

impl StorageError {
    /// True when this error means "the path is absent", as opposed to a
    /// storage-level failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
