// SPDX-License-Identifier: Apache-2.0
//
// Core storage backend trait for Trellis.
//
// Defines the `StorageBackend` trait that all storage implementations must
// satisfy: raw get/put/delete/exists plus prefix listing and glob queries
// over records keyed by path. Backends are expected to be thread-safe
// (`Send + Sync`) and fully asynchronous; the store facade layers type
// resolution, identity caching, and transactions on top.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use trellis_types::{ObjectPath, PathPattern, Record};

use crate::error::StorageError;

/// The envelope a backend stores for each path: the serialized field record
/// plus the type tag and revision metadata maintained by the store facade.
///
/// The binary form (see [`StoredRecord::to_bytes`]) is the canonical JSON
/// encoding of the record wrapped in a small envelope object. Durable
/// backends persist these bytes verbatim, so the shape must stay stable for
/// forward compatibility of stored data.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    /// Name of the registered type that produced the record.
    pub type_name: String,
    /// The serialized persisted-field values.
    pub record: Record,
    /// Revision counter, starting at 1 and bumped on every overwrite.
    pub version: u64,
    /// When the path was first written.
    pub created_at: DateTime<Utc>,
    /// When the path was last written.
    pub updated_at: DateTime<Utc>,
}

impl StoredRecord {
    /// Build a first-revision envelope stamped with the current time.
    pub fn new(type_name: impl Into<String>, record: Record) -> Self {
        let now = Utc::now();
        Self {
            type_name: type_name.into(),
            record,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Build the next revision of `previous` carrying the same creation time.
    pub fn next_revision(&self, record: Record) -> Self {
        Self {
            type_name: self.type_name.clone(),
            record,
            version: self.version + 1,
            created_at: self.created_at,
            updated_at: Utc::now(),
        }
    }

    /// Encode into the canonical storage bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, StorageError> {
        let payload = serde_json::json!({
            "type": self.type_name,
            "version": self.version,
            "created_at": self.created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            "updated_at": self.updated_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            "record": self
                .record
                .to_json()
                .map_err(|err| StorageError::Serialization(err.to_string()))?,
        });
        serde_json::to_vec(&payload).map_err(|err| StorageError::Serialization(err.to_string()))
    }

    /// Decode from the canonical storage bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        let payload: serde_json::Value = serde_json::from_slice(bytes)
            .map_err(|err| StorageError::CorruptedData(format!("invalid envelope: {err}")))?;

        let type_name = payload
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| StorageError::CorruptedData("envelope missing type tag".to_string()))?
            .to_string();
        let version = payload
            .get("version")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| StorageError::CorruptedData("envelope missing version".to_string()))?;
        let created_at = decode_time(&payload, "created_at")?;
        let updated_at = decode_time(&payload, "updated_at")?;
        let record = payload
            .get("record")
            .ok_or_else(|| StorageError::CorruptedData("envelope missing record".to_string()))
            .and_then(|raw| {
                Record::from_json(raw)
                    .map_err(|err| StorageError::CorruptedData(err.to_string()))
            })?;

        Ok(Self {
            type_name,
            record,
            version,
            created_at,
            updated_at,
        })
    }
}

fn decode_time(payload: &serde_json::Value, key: &str) -> Result<DateTime<Utc>, StorageError> {
    let raw = payload
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| StorageError::CorruptedData(format!("envelope missing {key}")))?;
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|err| StorageError::CorruptedData(format!("bad {key} {raw:?}: {err}")))
}

/// A pluggable record-storage backend.
///
/// Paths are opaque keys; hierarchy only matters for [`list`] and [`query`].
/// Single-key writes are atomic at this layer; multi-key atomicity is the
/// transaction manager's (best-effort) concern. Implementations must be safe
/// to share across threads and tokio tasks.
///
/// [`list`]: StorageBackend::list
/// [`query`]: StorageBackend::query
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Retrieve the record stored at `path`.
    ///
    /// Fails with [`StorageError::NotFound`] if the path is absent.
    async fn get(&self, path: &ObjectPath) -> Result<StoredRecord, StorageError>;

    /// Store a record at `path`, overwriting any previous record atomically.
    async fn put(&self, path: &ObjectPath, record: StoredRecord) -> Result<(), StorageError>;

    /// Delete the record at `path`.
    ///
    /// Fails with [`StorageError::NotFound`] if the path is absent.
    async fn delete(&self, path: &ObjectPath) -> Result<(), StorageError>;

    /// Check whether `path` holds a record without retrieving it.
    async fn exists(&self, path: &ObjectPath) -> Result<bool, StorageError>;

    /// List stored paths under `prefix` in lexicographic order.
    ///
    /// With `recursive` false only direct children (exactly one additional
    /// segment) are returned; with `recursive` true all descendants are.
    async fn list(
        &self,
        prefix: &ObjectPath,
        recursive: bool,
    ) -> Result<Vec<ObjectPath>, StorageError>;

    /// Return all stored paths matching `pattern`, in lexicographic order.
    async fn query(&self, pattern: &PathPattern) -> Result<Vec<ObjectPath>, StorageError>;

    /// A human-readable name for this backend, used in logging.
    fn name(&self) -> &str;

    /// Release backend resources. Must be idempotent; operations after close
    /// fail with [`StorageError::BackendUnavailable`] on durable backends.
    async fn close(&self) -> Result<(), StorageError>;
}

/// Shared helper for prefix listings: decide whether `path` belongs in the
/// listing for `prefix`, honoring the recursive flag.
pub(crate) fn listed_under(prefix: &str, path: &str, recursive: bool) -> bool {
    let Some(suffix) = path.strip_prefix(prefix) else {
        return false;
    };
    if suffix.is_empty() {
        // The prefix itself is not its own child.
        return false;
    }
    recursive || !suffix.contains('/')
}

/// Normalize a prefix path to its string form ending in `/`.
pub(crate) fn prefix_string(prefix: &ObjectPath) -> String {
    if prefix.is_root() {
        "/".to_string()
    } else {
        format!("{}/", prefix.as_str())
    }
}
