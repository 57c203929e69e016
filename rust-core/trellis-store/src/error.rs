// SPDX-License-Identifier: Apache-2.0
//! Store-level error types.
//!
//! Every public `Store` operation fails with exactly one [`StoreError`]
//! variant; backend storage errors fold into this taxonomy (a missing path
//! surfaces as [`StoreError::NotFound`], a corrupt stored blob as a
//! serialization failure, and remaining I/O-level conditions pass through as
//! [`StoreError::Backend`]).

use thiserror::Error;
use trellis_storage::StorageError;
use trellis_types::ObjectPath;

use crate::serializer::SerializationError;
use crate::transaction::TransactionError;

/// Errors surfaced by `Store` operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No object is stored at the path.
    #[error("no object at path: {0}")]
    NotFound(ObjectPath),

    /// No registered pattern matches the path.
    #[error("no type registered for path: {0}")]
    TypeNotRegistered(ObjectPath),

    /// The object's type disagrees with the type resolved for its path.
    #[error("path {path} expects {expected}, got {actual}")]
    TypeMismatch {
        path: ObjectPath,
        expected: String,
        actual: String,
    },

    /// Serializing, deserializing, or decoding an object failed.
    #[error(transparent)]
    Serialization(#[from] SerializationError),

    /// A transaction could not be started or committed.
    #[error(transparent)]
    Transaction(#[from] TransactionError),

    /// The object is not tracked by this store (detached, or owned by a
    /// different store), so it has no path to save to.
    #[error("object is not tracked by this store; store it at a path first")]
    NotTracked,

    /// A storage-level failure outside the store's own taxonomy.
    #[error("storage backend error: {0}")]
    Backend(StorageError),
}

impl From<StorageError> for StoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(path) => Self::NotFound(path),
            StorageError::CorruptedData(msg) => {
                Self::Serialization(SerializationError::Decode(msg))
            }
            other => Self::Backend(other),
        }
    }
}

/// Errors produced by [`connect`](crate::connect).
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The URL did not have a `scheme://` shape.
    #[error("malformed connection url: {0:?}")]
    MalformedUrl(String),

    /// The URL scheme names no known backend.
    #[error("unknown storage scheme {scheme:?} in {url:?}")]
    UnknownScheme { scheme: String, url: String },

    /// The backend failed to open.
    #[error(transparent)]
    Backend(#[from] StorageError),
}
