//! Chain-consistency coordination.
//!
//! Appending to a chain is a read-modify-write of its tail: read the tail
//! hash, hash the new record over it, persist. [`Coordinator`] makes that
//! sequence exclusive per chain with two locks, taken in a fixed order:
//!
//! 1. a process-local mutex owned by the store instance;
//! 2. a cluster lease from a [`LockService`], keyed by chain.
//!
//! Both are held by a [`ChainGuard`] and dropped cluster-first on every
//! exit path. The tail of each chain is cached in a [`TailCache`] for a
//! short TTL so back-to-back appends skip the backend lookup.

mod cache;
mod lock;

pub use cache::{MemoryTailCache, TailCache, TailEntry};
pub use lock::{LockGuard, LockOptions, LockService, LockToken, MemoryLockService};

use crate::deadline::Deadline;
use crate::error::LedgerResult;
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Base key of the cluster lock.
pub const LOCK_KEY: &str = "auditor.lock";

/// Base key of the tail cache entry.
pub const CACHE_KEY: &str = "auditor.previoushash";

/// Cluster lock key for a chain. `None` is the unpartitioned chain.
#[must_use]
pub fn lock_key(scope: Option<&str>) -> String {
    scoped(LOCK_KEY, scope)
}

/// Tail cache key for a chain. `None` is the unpartitioned chain.
#[must_use]
pub fn cache_key(scope: Option<&str>) -> String {
    scoped(CACHE_KEY, scope)
}

fn scoped(base: &str, scope: Option<&str>) -> String {
    match scope {
        Some(partition) => format!("{base}.{partition}"),
        None => base.to_string(),
    }
}

/// Exclusive access to one chain's tail.
///
/// Field order is drop order: the cluster lease is released before the
/// local mutex.
pub struct ChainGuard<'a> {
    cluster: LockGuard,
    _local: MutexGuard<'a, ()>,
    scope: Option<String>,
}

impl ChainGuard<'_> {
    /// Partition this guard covers.
    #[must_use]
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// Cluster lock key held.
    #[must_use]
    pub fn lock_key(&self) -> &str {
        self.cluster.key()
    }

    /// Deadline at which the cluster lease lapses. Writes under this guard
    /// must finish before it.
    #[must_use]
    pub fn lease_deadline(&self) -> Deadline {
        self.cluster.lease_deadline()
    }
}

impl fmt::Debug for ChainGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainGuard")
            .field("cluster", &self.cluster)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// Serializes appends per chain and maintains the tail cache.
pub struct Coordinator {
    local: Mutex<()>,
    locks: Arc<dyn LockService>,
    cache: Arc<dyn TailCache>,
    lock_options: LockOptions,
    cache_ttl: Duration,
}

impl Coordinator {
    /// Creates a coordinator over shared lock and cache services.
    pub fn new(
        locks: Arc<dyn LockService>,
        cache: Arc<dyn TailCache>,
        lock_options: LockOptions,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            local: Mutex::new(()),
            locks,
            cache,
            lock_options,
            cache_ttl,
        }
    }

    /// Takes the local mutex, then the cluster lease for `scope`.
    ///
    /// # Errors
    ///
    /// Returns `DeadlineExceeded` if either lock is not obtained in time,
    /// `LockUnavailable` if the lease retries run out, or the lock service's
    /// error. Nothing is held on error.
    pub fn lock(&self, scope: Option<&str>, deadline: Deadline) -> LedgerResult<ChainGuard<'_>> {
        let local = deadline.lock(&self.local, "local lock")?;
        let cluster = LockGuard::acquire(
            Arc::clone(&self.locks),
            &lock_key(scope),
            &self.lock_options,
            deadline,
        )?;
        Ok(ChainGuard {
            cluster,
            _local: local,
            scope: scope.map(str::to_string),
        })
    }

    /// The cached tail of the guarded chain, if fresh.
    ///
    /// # Errors
    ///
    /// Returns `DeadlineExceeded`, a cache error, or a serialization error
    /// for an unreadable entry.
    pub fn cached_tail(
        &self,
        guard: &ChainGuard<'_>,
        deadline: Deadline,
    ) -> LedgerResult<Option<TailEntry>> {
        deadline.check("tail cache lookup")?;
        let key = cache_key(guard.scope());
        match self.cache.get(&key)? {
            Some(bytes) => {
                let entry = TailEntry::decode(&bytes)?;
                debug!(key, hash = %entry.hash, "tail cache hit");
                Ok(Some(entry))
            }
            None => {
                debug!(key, "tail cache miss");
                Ok(None)
            }
        }
    }

    /// Records `entry` as the guarded chain's new tail.
    ///
    /// Runs after a successful write, so it never fails: if the entry cannot
    /// be stored the key is invalidated instead, and the next append falls
    /// back to the backend.
    pub fn publish_tail(&self, guard: &ChainGuard<'_>, entry: &TailEntry) {
        let key = cache_key(guard.scope());
        let stored = entry
            .encode()
            .and_then(|bytes| self.cache.set(&key, bytes, self.cache_ttl));
        if let Err(e) = stored {
            warn!(key, error = %e, "tail cache refresh failed, invalidating");
            if let Err(e) = self.cache.invalidate(&key) {
                warn!(key, error = %e, "tail cache invalidation failed");
            }
        }
    }
}

impl fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("lock_options", &self.lock_options)
            .field("cache_ttl", &self.cache_ttl)
            .finish_non_exhaustive()
    }
}
