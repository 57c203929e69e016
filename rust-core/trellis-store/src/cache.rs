// SPDX-License-Identifier: Apache-2.0
//! In-process identity cache.
//!
//! Guarantees that repeated lookups of the same path return the same live
//! object instance, so a mutation made through one handle is visible to
//! every other holder. Entries live until evicted (on delete) or dropped
//! wholesale by [`clear`](IdentityCache::clear), the explicit
//! cache-invalidation escape hatch that forces subsequent reads to reload
//! from the backend.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;
use trellis_types::ObjectPath;

use crate::error::StoreError;
use crate::model::Persistent;

/// Path → live-object map enforcing one instance per path.
#[derive(Default)]
pub struct IdentityCache {
    entries: RwLock<HashMap<ObjectPath, Arc<dyn Persistent>>>,
}

impl IdentityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached object for `path`, if any.
    pub fn get(&self, path: &ObjectPath) -> Option<Arc<dyn Persistent>> {
        self.read().get(path).cloned()
    }

    /// Return the cached object for `path`, or run `load` and install its
    /// result.
    ///
    /// If two callers race past the cache miss, the first installed instance
    /// wins and both callers receive it, preserving the one-instance-per-path
    /// guarantee.
    pub async fn get_or_load<F, Fut>(
        &self,
        path: &ObjectPath,
        load: F,
    ) -> Result<Arc<dyn Persistent>, StoreError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<dyn Persistent>, StoreError>>,
    {
        if let Some(hit) = self.get(path) {
            return Ok(hit);
        }
        let loaded = load().await?;
        let mut entries = self.write();
        Ok(entries.entry(path.clone()).or_insert(loaded).clone())
    }

    /// Install or overwrite the entry for `path`.
    pub fn insert(&self, path: ObjectPath, obj: Arc<dyn Persistent>) {
        self.write().insert(path, obj);
    }

    /// Remove the entry for `path`, returning the object that was cached.
    pub fn evict(&self, path: &ObjectPath) -> Option<Arc<dyn Persistent>> {
        self.write().remove(path)
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let mut entries = self.write();
        let dropped = entries.len();
        entries.clear();
        if dropped > 0 {
            debug!(dropped, "cleared identity cache");
        }
    }

    /// Number of cached objects.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    // A poisoned lock only means a panic happened mid-update; the map is
    // still structurally sound.
    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<ObjectPath, Arc<dyn Persistent>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<ObjectPath, Arc<dyn Persistent>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for IdentityCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityCache")
            .field("entries", &self.len())
            .finish()
    }
}
