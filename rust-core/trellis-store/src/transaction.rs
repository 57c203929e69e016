// SPDX-License-Identifier: Apache-2.0
//! Transaction buffering and the scoped transaction guard.
//!
//! The store supports one transaction at a time. While a transaction is
//! active, writes and deletes are buffered in order instead of touching the
//! backend; reads still go straight through, so a read during an open
//! transaction does NOT see uncommitted writes — a documented consistency
//! limitation, not a guarantee.
//!
//! # State machine
//!
//! ```text
//! ┌──────┐  begin()   ┌────────┐   commit()    ┌────────────┐
//! │ Idle │ ─────────> │ Active │ ────────────> │ Committing │ ──> Idle
//! └──────┘            └────────┘               └────────────┘
//!                          │
//!                          │ rollback() / guard dropped
//!                          ▼
//!                    ┌─────────────┐
//!                    │ RollingBack │ ──> Idle
//!                    └─────────────┘
//! ```
//!
//! Commit applies the buffered operations to the backend in buffer order.
//! The backends here have no multi-key atomic apply, so a failure partway
//! leaves the earlier operations in place: atomicity is best-effort, and the
//! failure surfaces as [`TransactionError::PartialCommit`] carrying how far
//! the commit got. Rollback discards the buffer without touching the
//! backend; object state mutated in process beforehand is not reverted.

use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use tracing::{debug, info, warn};
use trellis_storage::{StorageBackend, StorageError, StoredRecord};
use trellis_types::ObjectPath;

use crate::error::StoreError;
use crate::store::Store;

/// Observable lifecycle phase of the transaction manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionPhase {
    /// No transaction is open.
    Idle,
    /// A transaction is open and buffering operations.
    Active,
    /// Buffered operations are being applied to the backend.
    Committing,
    /// Buffered operations are being discarded.
    RollingBack,
}

/// A buffered write or delete.
#[derive(Debug, Clone)]
pub(crate) enum PendingOp {
    Put {
        path: ObjectPath,
        record: StoredRecord,
    },
    Delete {
        path: ObjectPath,
    },
}

impl PendingOp {
    fn path(&self) -> &ObjectPath {
        match self {
            Self::Put { path, .. } | Self::Delete { path } => path,
        }
    }
}

/// Errors raised by transaction control.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// A transaction was opened while another was active.
    #[error("a transaction is already active; nested transactions are not supported")]
    Nested,

    /// Commit or rollback was requested with no transaction open.
    #[error("no transaction is active")]
    NotActive,

    /// Commit failed partway; `applied` operations reached the backend and
    /// are NOT unwound.
    #[error("commit applied {applied} of {total} operations, then failed at {path}: {source}")]
    PartialCommit {
        applied: usize,
        total: usize,
        path: ObjectPath,
        #[source]
        source: StorageError,
    },
}

struct ManagerState {
    phase: TransactionPhase,
    pending: Vec<PendingOp>,
}

/// Buffers operations for the single open transaction and applies or
/// discards them.
pub struct TransactionManager {
    state: Mutex<ManagerState>,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ManagerState {
                phase: TransactionPhase::Idle,
                pending: Vec::new(),
            }),
        }
    }

    /// The current lifecycle phase.
    pub fn phase(&self) -> TransactionPhase {
        self.lock().phase
    }

    /// True while a transaction is open and buffering.
    pub fn is_active(&self) -> bool {
        self.phase() == TransactionPhase::Active
    }

    /// Number of operations currently buffered.
    pub fn pending_ops(&self) -> usize {
        self.lock().pending.len()
    }

    /// Open a transaction: Idle → Active.
    pub(crate) fn begin(&self) -> Result<(), TransactionError> {
        let mut state = self.lock();
        if state.phase != TransactionPhase::Idle {
            return Err(TransactionError::Nested);
        }
        state.phase = TransactionPhase::Active;
        debug!("transaction opened");
        Ok(())
    }

    /// Buffer an operation if a transaction is active; otherwise hand it
    /// back for immediate application.
    pub(crate) fn buffer(&self, op: PendingOp) -> Option<PendingOp> {
        let mut state = self.lock();
        if state.phase == TransactionPhase::Active {
            debug!(path = %op.path(), buffered = state.pending.len() + 1, "buffered operation");
            state.pending.push(op);
            None
        } else {
            Some(op)
        }
    }

    /// Apply the buffered operations to `backend` in order: Active →
    /// Committing → Idle.
    ///
    /// On the first failing operation the manager returns to Idle and
    /// reports [`TransactionError::PartialCommit`]; operations already
    /// applied stay applied.
    pub(crate) async fn commit(
        &self,
        backend: &dyn StorageBackend,
    ) -> Result<usize, TransactionError> {
        let ops = {
            let mut state = self.lock();
            if state.phase != TransactionPhase::Active {
                return Err(TransactionError::NotActive);
            }
            state.phase = TransactionPhase::Committing;
            std::mem::take(&mut state.pending)
        };

        let total = ops.len();
        for (applied, op) in ops.into_iter().enumerate() {
            let (path, result) = match op {
                PendingOp::Put { path, record } => {
                    let result = backend.put(&path, record).await;
                    (path, result)
                }
                PendingOp::Delete { path } => {
                    let result = backend.delete(&path).await;
                    (path, result)
                }
            };
            if let Err(source) = result {
                self.lock().phase = TransactionPhase::Idle;
                warn!(
                    %path,
                    applied,
                    total,
                    "transaction commit failed partway; earlier operations are not unwound"
                );
                return Err(TransactionError::PartialCommit {
                    applied,
                    total,
                    path,
                    source,
                });
            }
        }

        self.lock().phase = TransactionPhase::Idle;
        info!(operations = total, "transaction committed");
        Ok(total)
    }

    /// Discard the buffered operations: Active → RollingBack → Idle.
    ///
    /// Returns the number of discarded operations. The backend is never
    /// touched.
    pub(crate) fn rollback(&self) -> Result<usize, TransactionError> {
        let mut state = self.lock();
        if state.phase != TransactionPhase::Active {
            return Err(TransactionError::NotActive);
        }
        state.phase = TransactionPhase::RollingBack;
        let discarded = state.pending.len();
        state.pending.clear();
        state.phase = TransactionPhase::Idle;
        info!(discarded, "transaction rolled back");
        Ok(discarded)
    }

    // A poisoned lock only means a panic mid-update; the buffer is still a
    // plain Vec and safe to use.
    fn lock(&self) -> std::sync::MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("phase", &self.phase())
            .field("pending", &self.pending_ops())
            .finish()
    }
}

/// A scoped transaction over a [`Store`].
///
/// Obtained from [`Store::transaction`]. Buffered writes reach the backend
/// only through [`commit`](Transaction::commit); dropping the guard without
/// committing rolls the transaction back, so every exit path — including
/// early returns and panics — ends in commit-or-rollback.
///
/// ```rust
/// # use trellis_store::{connect, Store, StoreError};
/// # use trellis_types::ObjectPath;
/// # async fn demo(store: &Store) -> Result<(), StoreError> {
/// let txn = store.transaction()?;
/// // ... store.put / store.delete calls buffer here ...
/// txn.commit().await?;
/// # Ok(())
/// # }
/// ```
#[must_use = "dropping a transaction rolls it back"]
pub struct Transaction {
    store: Store,
    finished: bool,
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl Transaction {
    pub(crate) fn new(store: Store) -> Self {
        Self {
            store,
            finished: false,
        }
    }

    /// Apply the buffered operations to the backend.
    pub async fn commit(mut self) -> Result<(), StoreError> {
        self.finished = true;
        self.store.commit_active().await
    }

    /// Discard the buffered operations explicitly.
    pub fn rollback(mut self) {
        self.finished = true;
        self.store.rollback_active();
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.finished {
            self.store.rollback_active();
        }
    }
}
