//! Absolute time bounds for ledger operations.

use crate::error::{LedgerError, LedgerResult};
use parking_lot::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// An absolute instant after which an operation must give up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// A deadline `timeout` from now.
    #[must_use]
    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now().checked_add(timeout),
        }
    }

    /// A deadline at `instant`.
    #[must_use]
    pub const fn at(instant: Instant) -> Self {
        Self { at: Some(instant) }
    }

    /// Whichever of the two deadlines comes first.
    #[must_use]
    pub fn earliest(self, other: Self) -> Self {
        match (self.at, other.at) {
            (Some(a), Some(b)) => Self { at: Some(a.min(b)) },
            (Some(_), None) => self,
            (None, _) => other,
        }
    }

    /// A deadline that never expires.
    #[must_use]
    pub const fn never() -> Self {
        Self { at: None }
    }

    /// Time left, or `None` if the deadline never expires.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Whether the deadline has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }

    /// Fails with [`LedgerError::DeadlineExceeded`] if expired.
    ///
    /// # Errors
    ///
    /// Returns `DeadlineExceeded` naming `operation` when the deadline passed.
    pub fn check(&self, operation: &str) -> LedgerResult<()> {
        if self.is_expired() {
            Err(LedgerError::deadline_exceeded(operation))
        } else {
            Ok(())
        }
    }

    /// Locks `mutex`, waiting no longer than the deadline allows.
    ///
    /// # Errors
    ///
    /// Returns `DeadlineExceeded` naming `operation` if the lock was not
    /// obtained in time.
    pub fn lock<'a, T>(&self, mutex: &'a Mutex<T>, operation: &str) -> LedgerResult<MutexGuard<'a, T>> {
        let guard = match self.remaining() {
            None => Some(mutex.lock()),
            Some(left) => mutex.try_lock_for(left),
        };
        guard.ok_or_else(|| LedgerError::deadline_exceeded(operation))
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::never()
    }
}
