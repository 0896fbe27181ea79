//! Cluster-wide lease locks.

use crate::deadline::Deadline;
use crate::error::{LedgerError, LedgerResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Identifies one acquisition attempt: `<host>-<pid>-<uuid>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockToken(String);

impl LockToken {
    /// A fresh token, unique per call.
    #[must_use]
    pub fn generate() -> Self {
        let host = std::env::var("HOSTNAME")
            .ok()
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| "localhost".to_string());
        Self(format!(
            "{host}-{}-{}",
            std::process::id(),
            uuid::Uuid::new_v4()
        ))
    }

    /// The token text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A lease lock shared by every process writing to the same ledger.
///
/// A lease expires after its TTL even if never released, so a crashed
/// holder cannot block the chain forever.
pub trait LockService: Send + Sync {
    /// Takes the lease on `key` for `ttl` unless another token holds an
    /// unexpired lease. Returns whether the lease was taken.
    ///
    /// # Errors
    ///
    /// Returns an error if the service is unreachable.
    fn try_acquire(&self, key: &str, token: &LockToken, ttl: Duration) -> LedgerResult<bool>;

    /// Releases `key` if and only if `token` still holds it. Returns whether
    /// a lease was released.
    ///
    /// # Errors
    ///
    /// Returns an error if the service is unreachable.
    fn release(&self, key: &str, token: &LockToken) -> LedgerResult<bool>;
}

/// Retry policy for lease acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    /// Lease lifetime.
    pub ttl: Duration,
    /// Retries after the first attempt.
    pub retry_count: u32,
    /// Pause between attempts.
    pub retry_delay: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(5),
            retry_count: 10,
            retry_delay: Duration::from_millis(50),
        }
    }
}

impl LockOptions {
    /// Sets the lease lifetime.
    #[must_use]
    pub const fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sets the number of retries.
    #[must_use]
    pub const fn retry_count(mut self, count: u32) -> Self {
        self.retry_count = count;
        self
    }

    /// Sets the pause between attempts.
    #[must_use]
    pub const fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

/// A held lease. Released on drop.
pub struct LockGuard {
    service: Arc<dyn LockService>,
    key: String,
    token: LockToken,
    expires_at: Instant,
}

impl LockGuard {
    /// Acquires `key`, retrying per `options` within `deadline`. A new token
    /// is generated for every attempt.
    ///
    /// # Errors
    ///
    /// Returns `LockUnavailable` when retries run out, `DeadlineExceeded`
    /// when the deadline passes first, or the service's own error.
    pub fn acquire(
        service: Arc<dyn LockService>,
        key: &str,
        options: &LockOptions,
        deadline: Deadline,
    ) -> LedgerResult<Self> {
        let attempts = options.retry_count.saturating_add(1);
        for attempt in 1..=attempts {
            deadline.check("cluster lock")?;
            let token = LockToken::generate();
            // measured before the request, so never later than the
            // service's own expiry
            let requested_at = Instant::now();
            if service.try_acquire(key, &token, options.ttl)? {
                debug!(key, attempt, token = %token, "cluster lock acquired");
                return Ok(Self {
                    service,
                    key: key.to_string(),
                    token,
                    expires_at: requested_at + options.ttl,
                });
            }
            if attempt < attempts {
                let pause = deadline
                    .remaining()
                    .map_or(options.retry_delay, |left| left.min(options.retry_delay));
                std::thread::sleep(pause);
            }
        }
        debug!(key, attempts, "cluster lock unavailable");
        Err(LedgerError::LockUnavailable {
            key: key.to_string(),
            attempts,
        })
    }

    /// The lock key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The token holding the lease.
    #[must_use]
    pub fn token(&self) -> &LockToken {
        &self.token
    }

    /// Deadline at which the lease lapses and another token may take it.
    #[must_use]
    pub fn lease_deadline(&self) -> Deadline {
        Deadline::at(self.expires_at)
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        match self.service.release(&self.key, &self.token) {
            Ok(true) => debug!(key = %self.key, "cluster lock released"),
            Ok(false) => warn!(key = %self.key, "cluster lock lease lost before release"),
            Err(e) => warn!(key = %self.key, error = %e, "cluster lock release failed"),
        }
    }
}

impl fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard")
            .field("key", &self.key)
            .field("token", &self.token)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

struct Lease {
    token: LockToken,
    expires_at: Instant,
}

/// In-process [`LockService`]. Share one instance through `Arc` to model
/// several replicas contending for the same ledger.
#[derive(Default)]
pub struct MemoryLockService {
    leases: Mutex<HashMap<String, Lease>>,
}

impl MemoryLockService {
    /// Creates a service with no leases.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `key` is currently held by anyone.
    #[must_use]
    pub fn is_held(&self, key: &str) -> bool {
        self.leases
            .lock()
            .get(key)
            .is_some_and(|lease| lease.expires_at > Instant::now())
    }
}

impl LockService for MemoryLockService {
    fn try_acquire(&self, key: &str, token: &LockToken, ttl: Duration) -> LedgerResult<bool> {
        let now = Instant::now();
        let mut leases = self.leases.lock();
        if let Some(lease) = leases.get(key) {
            if lease.expires_at > now && lease.token != *token {
                return Ok(false);
            }
        }
        leases.insert(
            key.to_string(),
            Lease {
                token: token.clone(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    fn release(&self, key: &str, token: &LockToken) -> LedgerResult<bool> {
        let mut leases = self.leases.lock();
        match leases.get(key) {
            Some(lease) if lease.token == *token => {
                leases.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

impl fmt::Debug for MemoryLockService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryLockService")
            .field("leases", &self.leases.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick() -> LockOptions {
        LockOptions::default()
            .retry_count(2)
            .retry_delay(Duration::from_millis(5))
    }

    #[test]
    fn tokens_are_unique() {
        let a = LockToken::generate();
        let b = LockToken::generate();
        assert_ne!(a, b);
        assert!(a.as_str().contains(&std::process::id().to_string()));
    }

    #[test]
    fn lease_excludes_other_tokens() {
        let service = MemoryLockService::new();
        let a = LockToken::generate();
        let b = LockToken::generate();
        assert!(service.try_acquire("auditor.lock", &a, Duration::from_secs(5)).unwrap());
        assert!(!service.try_acquire("auditor.lock", &b, Duration::from_secs(5)).unwrap());
        assert!(service.try_acquire("auditor.lock.other", &b, Duration::from_secs(5)).unwrap());
    }

    #[test]
    fn expired_lease_can_be_taken() {
        let service = MemoryLockService::new();
        let a = LockToken::generate();
        let b = LockToken::generate();
        assert!(service.try_acquire("k", &a, Duration::from_millis(10)).unwrap());
        std::thread::sleep(Duration::from_millis(20));
        assert!(service.try_acquire("k", &b, Duration::from_secs(5)).unwrap());
    }

    #[test]
    fn stale_holder_cannot_release_reacquired_lock() {
        let service = MemoryLockService::new();
        let stale = LockToken::generate();
        let current = LockToken::generate();
        service.try_acquire("k", &stale, Duration::from_millis(10)).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        service.try_acquire("k", &current, Duration::from_secs(5)).unwrap();

        assert!(!service.release("k", &stale).unwrap());
        assert!(service.is_held("k"));
        assert!(service.release("k", &current).unwrap());
        assert!(!service.is_held("k"));
    }

    #[test]
    fn guard_releases_on_drop() {
        let service = Arc::new(MemoryLockService::new());
        {
            let guard =
                LockGuard::acquire(service.clone(), "auditor.lock", &quick(), Deadline::never())
                    .unwrap();
            assert_eq!(guard.key(), "auditor.lock");
            assert!(service.is_held("auditor.lock"));
        }
        assert!(!service.is_held("auditor.lock"));
    }

    #[test]
    fn lease_deadline_follows_ttl() {
        let service = Arc::new(MemoryLockService::new());
        let options = quick().ttl(Duration::from_millis(20));
        let guard = LockGuard::acquire(service.clone(), "k", &options, Deadline::never()).unwrap();
        assert!(!guard.lease_deadline().is_expired());

        std::thread::sleep(Duration::from_millis(30));
        assert!(guard.lease_deadline().is_expired());
        assert!(!service.is_held("k"));
    }

    #[test]
    fn retries_are_bounded() {
        let service = Arc::new(MemoryLockService::new());
        let _held =
            LockGuard::acquire(service.clone(), "auditor.lock", &quick(), Deadline::never()).unwrap();

        let result = LockGuard::acquire(service, "auditor.lock", &quick(), Deadline::never());
        assert!(matches!(
            result,
            Err(LedgerError::LockUnavailable { attempts: 3, .. })
        ));
    }

    #[test]
    fn expired_deadline_stops_acquisition() {
        let service = Arc::new(MemoryLockService::new());
        let result = LockGuard::acquire(
            service.clone(),
            "auditor.lock",
            &quick(),
            Deadline::after(Duration::ZERO),
        );
        assert!(matches!(result, Err(LedgerError::DeadlineExceeded { .. })));
        assert!(!service.is_held("auditor.lock"));
    }
}
