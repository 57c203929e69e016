// SPDX-License-Identifier: Apache-2.0
//! The store facade.
//!
//! [`Store`] combines the registry, serializer, identity cache, transaction
//! manager, and a storage backend behind one handle. It is a cheap clone
//! (all clones share state) and is built either directly from a backend via
//! [`Store::with_backend`] or from a connection URL via [`connect`].
//!
//! The store assumes a single logical writer at a time: it performs no
//! internal locking beyond what keeps its own structures coherent, and
//! concurrent external writers must serialize through their own discipline.
//! Opening two stores on the same database file is unsupported.

use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info};
use trellis_storage::{InMemoryBackend, StorageBackend, StoredRecord};
use trellis_types::{ObjectPath, PathPattern};

use crate::cache::IdentityCache;
use crate::error::{ConnectError, StoreError};
use crate::model::{Persistent, PersistentType};
use crate::registry::{TypeRegistration, TypeRegistry};
use crate::serializer::Serializer;
use crate::transaction::{PendingOp, Transaction, TransactionManager, TransactionPhase};

pub(crate) struct StoreInner {
    backend: Box<dyn StorageBackend>,
    registry: RwLock<TypeRegistry>,
    serializer: Serializer,
    cache: IdentityCache,
    transactions: TransactionManager,
}

/// Path-addressed persistent storage for domain objects.
///
/// ```rust
/// use trellis_store::{connect, Store};
/// # use trellis_store::StoreError;
/// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// let db = connect("memory://")?;
/// // db.register_type::<VanillaOption>("/Instruments/*".parse()?);
/// // let option = db.create::<VanillaOption>(&"/Instruments/AAPL_C_150".parse()?).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    /// Build a store over an explicit backend.
    pub fn with_backend(backend: impl StorageBackend + 'static) -> Self {
        info!(backend = backend.name(), "opened store");
        Self {
            inner: Arc::new(StoreInner {
                backend: Box::new(backend),
                registry: RwLock::new(TypeRegistry::new()),
                serializer: Serializer::new(),
                cache: IdentityCache::new(),
                transactions: TransactionManager::new(),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<StoreInner>) -> Self {
        Self { inner }
    }

    /// The active backend's name (for logs and diagnostics).
    pub fn backend_name(&self) -> &str {
        self.inner.backend.name()
    }

    // ------------------------------------------------------------------
    // Type registration
    // ------------------------------------------------------------------

    /// Register `T` for paths matching `pattern`.
    ///
    /// Registrations resolve in insertion order with first match winning,
    /// so register specific patterns before general ones.
    pub fn register_type<T: PersistentType>(&self, pattern: PathPattern) {
        self.inner
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .register::<T>(pattern);
    }

    fn resolve(&self, path: &ObjectPath) -> Result<TypeRegistration, StoreError> {
        self.inner
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .resolve(path)
            .cloned()
            .ok_or_else(|| StoreError::TypeNotRegistered(path.clone()))
    }

    // ------------------------------------------------------------------
    // CRUD
    // ------------------------------------------------------------------

    /// Create a blank `T`, persist an initial record at `path`, and return
    /// the live instance installed in the cache.
    ///
    /// Fails with [`StoreError::TypeMismatch`] if `T` is not the type
    /// resolved for `path`.
    pub async fn create<T: PersistentType>(&self, path: &ObjectPath) -> Result<Arc<T>, StoreError> {
        let registration = self.resolve(path)?;
        if !std::ptr::eq(registration.descriptor(), T::type_descriptor()) {
            return Err(StoreError::TypeMismatch {
                path: path.clone(),
                expected: registration.descriptor().name.to_string(),
                actual: T::type_descriptor().name.to_string(),
            });
        }
        let obj = Arc::new(T::blank());
        self.persist(path, obj.clone()).await?;
        debug!(%path, type_name = T::type_descriptor().name, "created object");
        Ok(obj)
    }

    /// Store `obj` at `path` (assignment form).
    ///
    /// Resolves the type registered for `path` and fails with
    /// [`StoreError::TypeMismatch`] if `obj` is of a different type. The
    /// write goes through the active transaction if one is open; the cache
    /// and the object's path/store awareness update immediately either way.
    pub async fn put(&self, path: &ObjectPath, obj: Arc<dyn Persistent>) -> Result<(), StoreError> {
        let registration = self.resolve(path)?;
        if !std::ptr::eq(registration.descriptor(), obj.descriptor()) {
            return Err(StoreError::TypeMismatch {
                path: path.clone(),
                expected: registration.descriptor().name.to_string(),
                actual: obj.descriptor().name.to_string(),
            });
        }
        self.persist(path, obj).await?;
        debug!(%path, "stored object");
        Ok(())
    }

    /// Retrieve the object at `path`.
    ///
    /// Returns the cached live instance when present; otherwise loads from
    /// the backend, deserializes, installs in the cache, and returns it.
    /// Two sequential gets for the same path return the identical instance.
    pub async fn get(&self, path: &ObjectPath) -> Result<Arc<dyn Persistent>, StoreError> {
        self.inner
            .cache
            .get_or_load(path, || self.load(path))
            .await
    }

    /// Retrieve the object at `path`, downcast to `T`.
    ///
    /// Fails with [`StoreError::TypeMismatch`] when the stored object is of
    /// a different type.
    pub async fn get_as<T: PersistentType>(&self, path: &ObjectPath) -> Result<Arc<T>, StoreError> {
        let obj = self.get(path).await?;
        let actual = obj.descriptor().name;
        obj.into_any()
            .downcast::<T>()
            .map_err(|_| StoreError::TypeMismatch {
                path: path.clone(),
                expected: T::type_descriptor().name.to_string(),
                actual: actual.to_string(),
            })
    }

    /// Like [`get`](Self::get) but maps [`StoreError::NotFound`] to `None`.
    pub async fn try_get(
        &self,
        path: &ObjectPath,
    ) -> Result<Option<Arc<dyn Persistent>>, StoreError> {
        match self.get(path).await {
            Ok(obj) => Ok(Some(obj)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Like [`get`](Self::get) but returns `default` when nothing is stored
    /// at `path`.
    pub async fn get_or_default(
        &self,
        path: &ObjectPath,
        default: Arc<dyn Persistent>,
    ) -> Result<Arc<dyn Persistent>, StoreError> {
        Ok(self.try_get(path).await?.unwrap_or(default))
    }

    /// True when an object exists at `path` (cached or stored).
    pub async fn contains(&self, path: &ObjectPath) -> Result<bool, StoreError> {
        if self.inner.cache.get(path).is_some() {
            return Ok(true);
        }
        Ok(self.inner.backend.exists(path).await?)
    }

    /// Delete the object at `path`.
    ///
    /// Outside a transaction the backend delete happens immediately and a
    /// missing path fails with [`StoreError::NotFound`]. Inside a
    /// transaction the delete is buffered (absence only surfaces at commit).
    /// Either way the cache entry is evicted and any live object becomes
    /// detached: its `path()` reverts to `None` but it stays usable in
    /// memory.
    pub async fn delete(&self, path: &ObjectPath) -> Result<(), StoreError> {
        if let Some(op) = self
            .inner
            .transactions
            .buffer(PendingOp::Delete { path: path.clone() })
        {
            self.apply_now(op).await?;
        }
        if let Some(obj) = self.inner.cache.evict(path) {
            obj.binding().clear();
        }
        debug!(%path, "deleted object");
        Ok(())
    }

    /// Re-serialize and re-write a tracked object at its current path.
    ///
    /// Fails with [`StoreError::NotTracked`] when the object is detached or
    /// belongs to a different store.
    pub async fn save(&self, obj: &dyn Persistent) -> Result<(), StoreError> {
        let path = obj
            .binding()
            .path_if_bound_to(&self.inner)
            .ok_or(StoreError::NotTracked)?;
        let record = self.inner.serializer.serialize(obj)?;
        let stored = self.next_revision(&path, obj.descriptor().name, record).await?;
        self.write_through(&path, stored).await?;
        debug!(%path, "saved object");
        Ok(())
    }

    /// The path a tracked object lives at, or `None` if it is detached or
    /// owned by a different store.
    pub fn path_of(&self, obj: &dyn Persistent) -> Option<ObjectPath> {
        obj.binding().path_if_bound_to(&self.inner)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Stored paths under `prefix`, lexicographic. Non-recursive listings
    /// return only direct children (exactly one additional segment).
    pub async fn list(
        &self,
        prefix: &ObjectPath,
        recursive: bool,
    ) -> Result<Vec<ObjectPath>, StoreError> {
        Ok(self.inner.backend.list(prefix, recursive).await?)
    }

    /// Stored paths matching `pattern`, lexicographic.
    pub async fn query(&self, pattern: &PathPattern) -> Result<Vec<ObjectPath>, StoreError> {
        Ok(self.inner.backend.query(pattern).await?)
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    /// Open a scoped transaction.
    ///
    /// Until the returned guard commits, `put`/`delete` calls buffer instead
    /// of reaching the backend. Dropping the guard without committing rolls
    /// back. Fails with [`TransactionError::Nested`] while another
    /// transaction is open.
    ///
    /// [`TransactionError::Nested`]: crate::transaction::TransactionError::Nested
    pub fn transaction(&self) -> Result<Transaction, StoreError> {
        self.inner.transactions.begin()?;
        Ok(Transaction::new(self.clone()))
    }

    /// The transaction manager's current phase (diagnostics).
    pub fn transaction_phase(&self) -> TransactionPhase {
        self.inner.transactions.phase()
    }

    pub(crate) async fn commit_active(&self) -> Result<(), StoreError> {
        self.inner
            .transactions
            .commit(self.inner.backend.as_ref())
            .await?;
        Ok(())
    }

    pub(crate) fn rollback_active(&self) {
        if self.inner.transactions.rollback().is_ok() {
            // Cached objects may hold writes the backend never saw; drop
            // them so later reads reload committed state. In-process field
            // mutations on objects the caller still holds are not reverted.
            self.inner.cache.clear();
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Drop every identity-cache entry, forcing subsequent gets to reload
    /// from the backend. Objects keep their store awareness and can still
    /// `save()`.
    pub fn clear_cache(&self) {
        self.inner.cache.clear();
    }

    /// Number of live objects in the identity cache.
    pub fn cached_objects(&self) -> usize {
        self.inner.cache.len()
    }

    /// Release backend resources and drop the cache. Idempotent.
    pub async fn close(&self) -> Result<(), StoreError> {
        self.inner.backend.close().await?;
        self.inner.cache.clear();
        info!(backend = self.inner.backend.name(), "closed store");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Serialize and write `obj` at `path`, then bind it and install it in
    /// the cache.
    async fn persist(&self, path: &ObjectPath, obj: Arc<dyn Persistent>) -> Result<(), StoreError> {
        let record = self.inner.serializer.serialize(obj.as_ref())?;
        let stored = self.next_revision(path, obj.descriptor().name, record).await?;
        self.write_through(path, stored).await?;
        obj.binding().bind(path.clone(), &self.inner);
        self.inner.cache.insert(path.clone(), obj);
        Ok(())
    }

    /// Build the stored envelope for `path`, continuing the revision chain
    /// when the path already holds a record.
    ///
    /// Revision metadata is read through the backend, so inside an open
    /// transaction it reflects committed state only (consistent with reads
    /// not being transaction-isolated).
    async fn next_revision(
        &self,
        path: &ObjectPath,
        type_name: &str,
        record: trellis_types::Record,
    ) -> Result<StoredRecord, StoreError> {
        match self.inner.backend.get(path).await {
            Ok(existing) => {
                let mut stored = existing.next_revision(record);
                stored.type_name = type_name.to_string();
                Ok(stored)
            }
            Err(err) if err.is_not_found() => Ok(StoredRecord::new(type_name, record)),
            Err(err) => Err(err.into()),
        }
    }

    /// Route a write through the active transaction, or apply immediately.
    async fn write_through(&self, path: &ObjectPath, stored: StoredRecord) -> Result<(), StoreError> {
        if let Some(op) = self.inner.transactions.buffer(PendingOp::Put {
            path: path.clone(),
            record: stored,
        }) {
            self.apply_now(op).await?;
        }
        Ok(())
    }

    async fn apply_now(&self, op: PendingOp) -> Result<(), StoreError> {
        match op {
            PendingOp::Put { path, record } => {
                self.inner.backend.put(&path, record).await?;
            }
            PendingOp::Delete { path } => {
                self.inner.backend.delete(&path).await?;
            }
        }
        Ok(())
    }

    /// Load path: resolve type, read the backend, deserialize, bind.
    async fn load(&self, path: &ObjectPath) -> Result<Arc<dyn Persistent>, StoreError> {
        let registration = self.resolve(path)?;
        let stored = self.inner.backend.get(path).await?;
        if stored.type_name != registration.descriptor().name {
            return Err(StoreError::TypeMismatch {
                path: path.clone(),
                expected: registration.descriptor().name.to_string(),
                actual: stored.type_name.clone(),
            });
        }
        let obj = self.inner.serializer.deserialize(&registration, &stored.record)?;
        obj.binding().bind(path.clone(), &self.inner);
        debug!(%path, type_name = %stored.type_name, version = stored.version, "loaded object");
        Ok(obj)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("backend", &self.inner.backend.name())
            .field("cached_objects", &self.inner.cache.len())
            .field("transaction_phase", &self.inner.transactions.phase())
            .finish()
    }
}

/// Connect to a store using a URL.
///
/// Supported schemes:
///
/// - `memory://` — in-memory backend, nothing survives the process.
/// - `file:///path/to/db` — durable single-file backend.
/// - `file:///:memory:` — the durable engine on in-memory storage
///   (ephemeral but wire-compatible, for tests).
///
/// ```rust
/// use trellis_store::connect;
///
/// let db = connect("memory://").unwrap();
/// assert_eq!(db.backend_name(), "in-memory");
/// ```
pub fn connect(url: &str) -> Result<Store, ConnectError> {
    let (scheme, rest) = url
        .split_once("://")
        .ok_or_else(|| ConnectError::MalformedUrl(url.to_string()))?;

    match scheme {
        "memory" => Ok(Store::with_backend(InMemoryBackend::new())),

        #[cfg(feature = "redb-backend")]
        "file" => {
            if rest.is_empty() {
                return Err(ConnectError::MalformedUrl(url.to_string()));
            }
            if rest == ":memory:" || rest == "/:memory:" {
                let backend = trellis_storage::RedbBackend::ephemeral()?;
                return Ok(Store::with_backend(backend));
            }
            let backend = trellis_storage::RedbBackend::open(rest)?;
            Ok(Store::with_backend(backend))
        }

        other => Err(ConnectError::UnknownScheme {
            scheme: other.to_string(),
            url: url.to_string(),
        }),
    }
}
