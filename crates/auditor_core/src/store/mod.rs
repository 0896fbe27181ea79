//! The store contract and its chained implementation.

mod document;
mod keyrange;

pub use document::DocumentAdapter;
pub use keyrange::KeyRangeAdapter;

use crate::config::LedgerConfig;
use crate::coord::{Coordinator, TailEntry};
use crate::deadline::Deadline;
use crate::dir::LedgerDir;
use crate::error::{LedgerError, LedgerResult};
use crate::hash::compute_and_set_hash;
use crate::schema::{FieldKind, Record, Schema};
use auditor_codec::Value;
use chrono::Utc;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Page size used when a caller passes `limit <= 0`.
pub const DEFAULT_LIMIT: usize = 100;

/// Maps a caller-supplied limit to a page size.
#[must_use]
pub fn normalize_limit(limit: i64, default_limit: usize) -> usize {
    if limit <= 0 {
        default_limit
    } else {
        usize::try_from(limit).unwrap_or(usize::MAX)
    }
}

/// Append and paginated read over chained records.
pub trait Store<R>: Send + Sync {
    /// Appends `record`, filling in its hash and previous hash.
    ///
    /// # Errors
    ///
    /// Fails without writing if validation, locking, the tail lookup or
    /// hashing fails, or if the deadline passes first.
    fn save_until(&self, record: &mut R, deadline: Deadline) -> LedgerResult<()>;

    /// Up to `limit` records, newest first, strictly older than the
    /// cursor's sort value and within its partition when partitioned.
    ///
    /// # Errors
    ///
    /// Returns `MissingPartition` for a partitioned store without a cursor
    /// partition, or a backend error.
    fn read_until(&self, limit: i64, cursor: Option<&R>, deadline: Deadline) -> LedgerResult<Vec<R>>;

    /// Releases backend resources. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the session does not shut down cleanly.
    fn close(&self) -> LedgerResult<()>;

    /// Deadline length used by [`Store::save`] and [`Store::read`].
    fn operation_timeout(&self) -> Duration;

    /// [`Store::save_until`] with the default timeout.
    ///
    /// # Errors
    ///
    /// See [`Store::save_until`].
    fn save(&self, record: &mut R) -> LedgerResult<()> {
        self.save_until(record, Deadline::after(self.operation_timeout()))
    }

    /// [`Store::read_until`] with the default timeout.
    ///
    /// # Errors
    ///
    /// See [`Store::read_until`].
    fn read(&self, limit: i64, cursor: Option<&R>) -> LedgerResult<Vec<R>> {
        self.read_until(limit, cursor, Deadline::after(self.operation_timeout()))
    }
}

/// What a store needs from a backend adapter.
pub trait ChainBackend<R>: Send + Sync {
    /// Chain the record belongs to: its partition, or `None` for the single
    /// global chain.
    ///
    /// # Errors
    ///
    /// Returns `MissingPartition` if the backend is partitioned and the
    /// record has no partition value.
    fn chain_scope(&self, record: &R) -> LedgerResult<Option<String>>;

    /// Newest record of the chain `record` would join, read consistently.
    ///
    /// # Errors
    ///
    /// Returns a backend error.
    fn tail(&self, record: &R, deadline: Deadline) -> LedgerResult<Option<R>>;

    /// Persists a fully chained record.
    ///
    /// # Errors
    ///
    /// Returns a backend error.
    fn insert(&self, record: &R, deadline: Deadline) -> LedgerResult<()>;

    /// Up to `limit` records older than the cursor, newest first.
    ///
    /// # Errors
    ///
    /// Returns a backend error or `MissingPartition`.
    fn query(&self, limit: usize, cursor: Option<&R>, deadline: Deadline) -> LedgerResult<Vec<R>>;

    /// Releases the session.
    ///
    /// # Errors
    ///
    /// Returns a backend error.
    fn close(&self) -> LedgerResult<()>;
}

/// A [`Store`] that chains every record to its predecessor.
///
/// Each `save` runs under the [`Coordinator`]: lock the chain, find the
/// tail (cache first, then backend), stamp or check the sort value, hash,
/// persist, refresh the cache, unlock. Reads go straight to the backend.
pub struct ChainedStore<R> {
    schema: Arc<Schema<R>>,
    backend: Box<dyn ChainBackend<R>>,
    coordinator: Coordinator,
    operation_timeout: Duration,
    default_limit: usize,
    closed: AtomicBool,
    directory: Mutex<Option<LedgerDir>>,
}

impl<R: Record> ChainedStore<R> {
    /// Assembles a store from its parts.
    pub fn new(
        schema: Arc<Schema<R>>,
        backend: Box<dyn ChainBackend<R>>,
        coordinator: Coordinator,
        config: &LedgerConfig,
    ) -> Self {
        Self {
            schema,
            backend,
            coordinator,
            operation_timeout: config.operation_timeout,
            default_limit: config.default_limit,
            closed: AtomicBool::new(false),
            directory: Mutex::new(None),
        }
    }

    /// Holds `dir` until the store closes, keeping other stores off the
    /// same data directory.
    #[must_use]
    pub fn with_directory(self, dir: LedgerDir) -> Self {
        *self.directory.lock() = Some(dir);
        self
    }

    /// Data directory held by this store, if durable and open.
    #[must_use]
    pub fn directory(&self) -> Option<std::path::PathBuf> {
        self.directory.lock().as_ref().map(|d| d.path().to_path_buf())
    }

    /// The record schema.
    #[must_use]
    pub fn schema(&self) -> &Schema<R> {
        &self.schema
    }

    /// Whether [`Store::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(AtomicOrdering::Acquire)
    }

    fn ensure_open(&self) -> LedgerResult<()> {
        if self.is_closed() {
            Err(LedgerError::Closed)
        } else {
            Ok(())
        }
    }

    fn check_unchained(&self, record: &R) -> LedgerResult<()> {
        for field in [self.schema.hash_field(), self.schema.previous_hash_field()] {
            let value = field.get(record);
            if !(value.is_null() || value.as_text() == Some("")) {
                return Err(LedgerError::validation(format!(
                    "{} is assigned by the ledger and must be empty",
                    field.name()
                )));
            }
        }
        Ok(())
    }

    fn tail_entry(&self, tail: &R) -> LedgerResult<TailEntry> {
        let hash = self.schema.hash_field().get(tail);
        let hash = hash
            .as_text()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| LedgerError::backend("stored tail record has no hash"))?;
        Ok(TailEntry {
            hash: hash.to_string(),
            sort: self.schema.sort_field().get(tail),
        })
    }

    /// Gives the record a sort value after the tail's, or checks the one it
    /// already has.
    fn assign_sort(&self, record: &mut R, tail: Option<&TailEntry>) -> LedgerResult<()> {
        let field = self.schema.sort_field();
        let current = field.get(record);
        if current.is_null() {
            let stamped = next_sort_value(field.kind(), field.name(), tail.map(|t| &t.sort))?;
            set_or_fail(field.set(record, stamped), field.name())
        } else {
            match tail {
                Some(tail) if current.cmp_natural(&tail.sort) != Ordering::Greater => {
                    Err(LedgerError::OutOfOrder {
                        sort: current.to_string(),
                        tail: tail.sort.to_string(),
                    })
                }
                _ => Ok(()),
            }
        }
    }
}

fn set_or_fail(ok: bool, field: &str) -> LedgerResult<()> {
    if ok {
        Ok(())
    } else {
        Err(LedgerError::serialization(format!(
            "field '{field}' rejected its value"
        )))
    }
}

/// The smallest sort value that keeps the chain strictly increasing.
fn next_sort_value(kind: FieldKind, field: &str, tail: Option<&Value>) -> LedgerResult<Value> {
    match kind {
        FieldKind::Timestamp => {
            let now = Utc::now();
            let stamped = match tail {
                Some(Value::Timestamp(last)) => {
                    let after = *last + chrono::Duration::nanoseconds(1);
                    now.max(after)
                }
                _ => now,
            };
            Ok(Value::Timestamp(stamped))
        }
        FieldKind::Integer => match tail {
            Some(Value::Integer(last)) => last
                .checked_add(1)
                .map(Value::Integer)
                .ok_or_else(|| LedgerError::validation(format!("sort field '{field}' overflowed"))),
            _ => Ok(Value::Integer(1)),
        },
        FieldKind::Text => Err(LedgerError::validation(format!(
            "sort field '{field}' must be set"
        ))),
    }
}

impl<R: Record> Store<R> for ChainedStore<R> {
    fn save_until(&self, record: &mut R, deadline: Deadline) -> LedgerResult<()> {
        self.ensure_open()?;
        deadline.check("save")?;
        self.check_unchained(record)?;

        let scope = self.backend.chain_scope(record)?;
        let guard = self.coordinator.lock(scope.as_deref(), deadline)?;
        // nothing may be written once the lease can have passed to another
        // replica
        let lease = guard.lease_deadline();
        let deadline = deadline.earliest(lease);

        let tail = match self.coordinator.cached_tail(&guard, deadline)? {
            Some(entry) => Some(entry),
            None => match self.backend.tail(record, deadline)? {
                Some(stored) => Some(self.tail_entry(&stored)?),
                None => None,
            },
        };

        let mut candidate = record.clone();
        self.assign_sort(&mut candidate, tail.as_ref())?;
        let previous = tail.map(|t| t.hash).unwrap_or_default();
        let prev_field = self.schema.previous_hash_field();
        set_or_fail(
            prev_field.set(&mut candidate, Value::text(previous.clone())),
            prev_field.name(),
        )?;
        let hash = compute_and_set_hash(&self.schema, &mut candidate)?;

        lease.check("cluster lock lease")?;
        deadline.check("save")?;
        if let Err(e) = self.backend.insert(&candidate, deadline) {
            error!(partition = ?scope, error = %e, "append failed");
            return Err(e);
        }

        self.coordinator.publish_tail(
            &guard,
            &TailEntry {
                hash: hash.clone(),
                sort: self.schema.sort_field().get(&candidate),
            },
        );
        drop(guard);

        debug!(partition = ?scope, hash = %hash, previous_hash = %previous, "record appended");
        *record = candidate;
        Ok(())
    }

    fn read_until(&self, limit: i64, cursor: Option<&R>, deadline: Deadline) -> LedgerResult<Vec<R>> {
        self.ensure_open()?;
        deadline.check("read")?;
        let limit = normalize_limit(limit, self.default_limit);
        self.backend.query(limit, cursor, deadline)
    }

    fn close(&self) -> LedgerResult<()> {
        if self.closed.swap(true, AtomicOrdering::AcqRel) {
            return Ok(());
        }
        info!(record = self.schema.record_name(), "store closed");
        let result = self.backend.close();
        if let Some(dir) = self.directory.lock().take() {
            debug!(path = %dir.path().display(), "data directory released");
        }
        result
    }

    fn operation_timeout(&self) -> Duration {
        self.operation_timeout
    }
}

impl<R> Drop for ChainedStore<R> {
    fn drop(&mut self) {
        if !self.closed.swap(true, AtomicOrdering::AcqRel) {
            if let Err(e) = self.backend.close() {
                warn!(error = %e, "backend close failed on drop");
            }
        }
    }
}

impl<R> fmt::Debug for ChainedStore<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainedStore")
            .field("record", &self.schema.record_name())
            .field("coordinator", &self.coordinator)
            .field("operation_timeout", &self.operation_timeout)
            .field("default_limit", &self.default_limit)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}
