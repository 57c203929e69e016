// SPDX-License-Identifier: Apache-2.0
//
// In-memory storage backend for Trellis.
//
// Uses a `BTreeMap` wrapped in a tokio `RwLock` for thread-safe, ordered
// record storage. The BTreeMap ordering gives lexicographic listings for
// free. Intended for testing, development, and ephemeral datasets; nothing
// survives a process restart.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use trellis_types::{ObjectPath, PathPattern};

use crate::backend::{listed_under, prefix_string, StorageBackend, StoredRecord};
use crate::error::StorageError;

/// An in-memory storage backend backed by a sorted `BTreeMap`.
///
/// All data lives in process memory and is dropped on [`close`]. Cloning the
/// backend shares the underlying map, matching the shared-handle behavior of
/// durable backends.
///
/// [`close`]: StorageBackend::close
///
/// # Example
///
/// ```rust
/// use trellis_storage::memory::InMemoryBackend;
/// use trellis_storage::backend::{StorageBackend, StoredRecord};
/// use trellis_types::{ObjectPath, Record};
///
/// # tokio_test::block_on(async {
/// let backend = InMemoryBackend::new();
/// let path = ObjectPath::parse("/Instruments/X").unwrap();
/// backend.put(&path, StoredRecord::new("Quote", Record::new())).await.unwrap();
/// assert!(backend.exists(&path).await.unwrap());
/// # });
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    /// The underlying sorted map, keyed by path string.
    data: Arc<RwLock<BTreeMap<String, StoredRecord>>>,
}

impl InMemoryBackend {
    /// Create a new, empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently stored.
    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    /// True if the backend holds no records.
    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }
}

#[async_trait]
impl StorageBackend for InMemoryBackend {
    async fn get(&self, path: &ObjectPath) -> Result<StoredRecord, StorageError> {
        let map = self.data.read().await;
        map.get(path.as_str())
            .cloned()
            .ok_or_else(|| StorageError::NotFound(path.clone()))
    }

    async fn put(&self, path: &ObjectPath, record: StoredRecord) -> Result<(), StorageError> {
        let mut map = self.data.write().await;
        map.insert(path.as_str().to_string(), record);
        Ok(())
    }

    async fn delete(&self, path: &ObjectPath) -> Result<(), StorageError> {
        let mut map = self.data.write().await;
        map.remove(path.as_str())
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(path.clone()))
    }

    async fn exists(&self, path: &ObjectPath) -> Result<bool, StorageError> {
        let map = self.data.read().await;
        Ok(map.contains_key(path.as_str()))
    }

    async fn list(
        &self,
        prefix: &ObjectPath,
        recursive: bool,
    ) -> Result<Vec<ObjectPath>, StorageError> {
        let prefix = prefix_string(prefix);
        let map = self.data.read().await;
        map.range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(prefix.as_str()))
            .filter(|(key, _)| listed_under(&prefix, key, recursive))
            .map(|(key, _)| {
                ObjectPath::parse(key)
                    .map_err(|err| StorageError::CorruptedData(format!("stored key {key:?}: {err}")))
            })
            .collect()
    }

    async fn query(&self, pattern: &PathPattern) -> Result<Vec<ObjectPath>, StorageError> {
        let prefix = pattern.literal_prefix();
        let map = self.data.read().await;
        let mut matches = Vec::new();
        for (key, _) in map
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(prefix.as_str()))
        {
            let path = ObjectPath::parse(key).map_err(|err| {
                StorageError::CorruptedData(format!("stored key {key:?}: {err}"))
            })?;
            if pattern.matches(&path) {
                matches.push(path);
            }
        }
        Ok(matches)
    }

    fn name(&self) -> &str {
        "in-memory"
    }

    async fn close(&self) -> Result<(), StorageError> {
        let mut map = self.data.write().await;
        let dropped = map.len();
        map.clear();
        debug!(dropped, "closed in-memory backend");
        Ok(())
    }
}
