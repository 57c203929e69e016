// SPDX-License-Identifier: Apache-2.0
//
// redb-backed persistent storage backend for Trellis.
//
// Uses redb (pure Rust, B-tree, ACID, single-file database) to provide
// durable record storage keyed by path. No C/C++ dependencies — builds on
// any platform with a Rust toolchain.
//
// # Design
//
// - Single redb `Database` file containing one `objects` table mapping path
//   string to the `StoredRecord` envelope bytes.
// - Read transactions for all read operations; write transactions for
//   put/delete (serialised by redb internally, fsynced on commit).
// - Prefix listings and glob queries use `range()` from the literal prefix
//   and stop as soon as keys no longer share it.
// - `ephemeral()` opens the same engine on redb's in-memory storage, giving
//   tests a backend that is wire-compatible with the durable one.
// - One `RedbBackend` must own its database file exclusively; opening two
//   on the same file is unsupported.

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use redb::{Database, ReadableDatabase, TableDefinition};
use tracing::debug;
use trellis_types::{ObjectPath, PathPattern};

use crate::backend::{listed_under, prefix_string, StorageBackend, StoredRecord};
use crate::error::StorageError;

/// Table definition for the record store: path string -> envelope bytes.
const OBJECTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("objects");

/// A durable storage backend powered by redb.
///
/// Each backend wraps a single database file (or an in-memory region in
/// ephemeral mode). `close()` drops the database handle and is idempotent;
/// operations after close fail with [`StorageError::BackendUnavailable`].
///
/// # Example
///
/// ```rust,no_run
/// use trellis_storage::redb_backend::RedbBackend;
/// use trellis_storage::backend::{StorageBackend, StoredRecord};
/// use trellis_types::{ObjectPath, Record};
///
/// # tokio_test::block_on(async {
/// let backend = RedbBackend::open("/tmp/trading.trellis").unwrap();
/// let path = ObjectPath::parse("/Instruments/X").unwrap();
/// backend.put(&path, StoredRecord::new("VanillaOption", Record::new())).await.unwrap();
/// # });
/// ```
pub struct RedbBackend {
    /// The redb database handle; `None` once closed.
    db: RwLock<Option<Arc<Database>>>,
    /// Path of the database file; `None` in ephemeral mode.
    path: Option<PathBuf>,
}

impl RedbBackend {
    /// Open or create a database file at the given path.
    ///
    /// Creates parent directories if they don't exist. The objects table is
    /// created on first write.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = Database::create(&path).map_err(|e| {
            StorageError::BackendUnavailable(format!(
                "failed to open redb at {}: {}",
                path.display(),
                e
            ))
        })?;

        debug!(path = %path.display(), "opened redb backend");

        Ok(Self {
            db: RwLock::new(Some(Arc::new(db))),
            path: Some(path),
        })
    }

    /// Open an ephemeral database on redb's in-memory storage.
    ///
    /// Behaves identically to a file-backed database (same tables, same
    /// encoding) but nothing survives the backend being dropped.
    pub fn ephemeral() -> Result<Self, StorageError> {
        let db = Database::builder()
            .create_with_backend(redb::backends::InMemoryBackend::new())
            .map_err(|e| {
                StorageError::BackendUnavailable(format!("failed to open ephemeral redb: {e}"))
            })?;

        debug!("opened ephemeral redb backend");

        Ok(Self {
            db: RwLock::new(Some(Arc::new(db))),
            path: None,
        })
    }

    /// The filesystem path of the database file, if file-backed.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Grab the live database handle, or fail if the backend was closed.
    fn handle(&self) -> Result<Arc<Database>, StorageError> {
        self.db
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .cloned()
            .ok_or_else(|| StorageError::BackendUnavailable("backend is closed".to_string()))
    }
}

impl std::fmt::Debug for RedbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbBackend").field("path", &self.path).finish()
    }
}

#[async_trait]
impl StorageBackend for RedbBackend {
    async fn get(&self, path: &ObjectPath) -> Result<StoredRecord, StorageError> {
        let db = self.handle()?;
        let path = path.clone();

        tokio::task::spawn_blocking(move || -> Result<StoredRecord, StorageError> {
            let txn = db
                .begin_read()
                .map_err(|e| StorageError::BackendUnavailable(format!("read txn: {e}")))?;

            let table = match txn.open_table(OBJECTS_TABLE) {
                Ok(t) => t,
                // Table doesn't exist yet — nothing has been written.
                Err(_) => return Err(StorageError::NotFound(path)),
            };

            match table.get(path.as_str()) {
                Ok(Some(value)) => StoredRecord::from_bytes(value.value()),
                Ok(None) => Err(StorageError::NotFound(path)),
                Err(e) => Err(StorageError::CorruptedData(format!("get: {e}"))),
            }
        })
        .await
        .map_err(|e| StorageError::BackendUnavailable(format!("task join: {e}")))?
    }

    async fn put(&self, path: &ObjectPath, record: StoredRecord) -> Result<(), StorageError> {
        let db = self.handle()?;
        let path = path.clone();
        let bytes = record.to_bytes()?;

        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let txn = db
                .begin_write()
                .map_err(|e| StorageError::BackendUnavailable(format!("write txn: {e}")))?;
            {
                let mut table = txn
                    .open_table(OBJECTS_TABLE)
                    .map_err(|e| StorageError::BackendUnavailable(format!("open table: {e}")))?;
                table
                    .insert(path.as_str(), bytes.as_slice())
                    .map_err(|e| StorageError::CorruptedData(format!("insert: {e}")))?;
            }
            txn.commit()
                .map_err(|e| StorageError::CorruptedData(format!("commit: {e}")))?;
            Ok(())
        })
        .await
        .map_err(|e| StorageError::BackendUnavailable(format!("task join: {e}")))?
    }

    async fn delete(&self, path: &ObjectPath) -> Result<(), StorageError> {
        let db = self.handle()?;
        let path = path.clone();

        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let txn = db
                .begin_write()
                .map_err(|e| StorageError::BackendUnavailable(format!("write txn: {e}")))?;
            let existed;
            {
                let mut table = txn
                    .open_table(OBJECTS_TABLE)
                    .map_err(|e| StorageError::BackendUnavailable(format!("open table: {e}")))?;
                existed = table
                    .remove(path.as_str())
                    .map_err(|e| StorageError::CorruptedData(format!("remove: {e}")))?
                    .is_some();
            }
            txn.commit()
                .map_err(|e| StorageError::CorruptedData(format!("commit: {e}")))?;
            if existed {
                Ok(())
            } else {
                Err(StorageError::NotFound(path))
            }
        })
        .await
        .map_err(|e| StorageError::BackendUnavailable(format!("task join: {e}")))?
    }

    async fn exists(&self, path: &ObjectPath) -> Result<bool, StorageError> {
        let db = self.handle()?;
        let path = path.clone();

        tokio::task::spawn_blocking(move || -> Result<bool, StorageError> {
            let txn = db
                .begin_read()
                .map_err(|e| StorageError::BackendUnavailable(format!("read txn: {e}")))?;
            let table = match txn.open_table(OBJECTS_TABLE) {
                Ok(t) => t,
                Err(_) => return Ok(false),
            };
            match table.get(path.as_str()) {
                Ok(found) => Ok(found.is_some()),
                Err(e) => Err(StorageError::CorruptedData(format!("exists: {e}"))),
            }
        })
        .await
        .map_err(|e| StorageError::BackendUnavailable(format!("task join: {e}")))?
    }

    async fn list(
        &self,
        prefix: &ObjectPath,
        recursive: bool,
    ) -> Result<Vec<ObjectPath>, StorageError> {
        let db = self.handle()?;
        let prefix = prefix_string(prefix);

        tokio::task::spawn_blocking(move || -> Result<Vec<ObjectPath>, StorageError> {
            scan_keys(&db, &prefix, |key| listed_under(&prefix, key, recursive))
        })
        .await
        .map_err(|e| StorageError::BackendUnavailable(format!("task join: {e}")))?
    }

    async fn query(&self, pattern: &PathPattern) -> Result<Vec<ObjectPath>, StorageError> {
        let db = self.handle()?;
        let pattern = pattern.clone();
        let prefix = pattern.literal_prefix();

        tokio::task::spawn_blocking(move || -> Result<Vec<ObjectPath>, StorageError> {
            let keys = scan_keys(&db, &prefix, |_| true)?;
            Ok(keys.into_iter().filter(|p| pattern.matches(p)).collect())
        })
        .await
        .map_err(|e| StorageError::BackendUnavailable(format!("task join: {e}")))?
    }

    fn name(&self) -> &str {
        "redb"
    }

    async fn close(&self) -> Result<(), StorageError> {
        let mut guard = self.db.write().unwrap_or_else(PoisonError::into_inner);
        if guard.take().is_some() {
            debug!(path = ?self.path, "closed redb backend");
        }
        Ok(())
    }
}

/// Scan keys sharing `prefix` in lexicographic order, keeping those the
/// filter accepts.
fn scan_keys(
    db: &Database,
    prefix: &str,
    keep: impl Fn(&str) -> bool,
) -> Result<Vec<ObjectPath>, StorageError> {
    let txn = db
        .begin_read()
        .map_err(|e| StorageError::BackendUnavailable(format!("read txn: {e}")))?;
    let table = match txn.open_table(OBJECTS_TABLE) {
        Ok(t) => t,
        // Table doesn't exist yet — nothing matches.
        Err(_) => return Ok(Vec::new()),
    };

    let iter = table
        .range(prefix..)
        .map_err(|e| StorageError::CorruptedData(format!("range scan: {e}")))?;

    let mut results = Vec::new();
    for entry in iter {
        let entry = entry.map_err(|e| StorageError::CorruptedData(format!("scan entry: {e}")))?;
        let key = entry.0.value().to_string();
        if !key.starts_with(prefix) {
            break;
        }
        if keep(&key) {
            let path = ObjectPath::parse(&key).map_err(|err| {
                StorageError::CorruptedData(format!("stored key {key:?}: {err}"))
            })?;
            results.push(path);
        }
    }
    Ok(results)
}
