//! Store construction from configuration.

use crate::config::{BackendKind, LedgerConfig};
use crate::coord::{Coordinator, LockService, MemoryLockService, MemoryTailCache, TailCache};
use crate::dir::LedgerDir;
use crate::engine::{DocumentClient, EmbeddedDocumentDb, EmbeddedKeyRangeDb, KeyRangeClient};
use crate::error::{LedgerError, LedgerResult};
use crate::schema::{Record, Schema};
use crate::store::{ChainBackend, ChainedStore, DocumentAdapter, KeyRangeAdapter};
use auditor_storage::{FileBackend, StorageBackend};
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// File holding the document engine's log inside the data directory.
pub const DOCUMENT_LOG: &str = "documents.log";

/// File holding the key-range engine's log inside the data directory.
pub const KEYRANGE_LOG: &str = "keyrange.log";

/// Lock and cache services shared by every replica of a ledger.
///
/// Stores built from clones of the same `SharedServices` coordinate with
/// each other the way separate processes do through a shared lock service
/// and cache.
#[derive(Clone)]
pub struct SharedServices {
    /// Cluster lease service.
    pub locks: Arc<dyn LockService>,
    /// Tail cache.
    pub cache: Arc<dyn TailCache>,
}

impl SharedServices {
    /// Fresh in-process services.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            locks: Arc::new(MemoryLockService::new()),
            cache: Arc::new(MemoryTailCache::new()),
        }
    }
}

impl Default for SharedServices {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl fmt::Debug for SharedServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedServices").finish_non_exhaustive()
    }
}

/// Builds a store for `R` with its own engine and in-process services.
///
/// # Errors
///
/// Returns a configuration error for an invalid schema or configuration,
/// or a backend error if the engine cannot be opened.
pub fn new_store<R: Record>(config: &LedgerConfig) -> LedgerResult<ChainedStore<R>> {
    new_store_with(config, &SharedServices::in_memory())
}

/// Builds a store for `R` with its own engine, coordinating through
/// `services`.
///
/// With `config.data_dir` set, the store locks that directory for as long
/// as it stays open, and the engine persists to a log file there that is
/// replayed on open.
///
/// # Errors
///
/// Same as [`new_store`], plus `DirectoryLocked` if another store holds
/// the data directory.
pub fn new_store_with<R: Record>(
    config: &LedgerConfig,
    services: &SharedServices,
) -> LedgerResult<ChainedStore<R>> {
    let schema = prepare::<R>(config, config.backend.is_partitioned())?;
    let dir = config.data_dir.as_deref().map(LedgerDir::open).transpose()?;
    let backend: Box<dyn ChainBackend<R>> = match config.backend {
        BackendKind::Document => {
            let db = match &dir {
                Some(dir) => EmbeddedDocumentDb::open(open_log(dir, DOCUMENT_LOG)?)?,
                None => EmbeddedDocumentDb::in_memory(),
            };
            Box::new(DocumentAdapter::owned(Arc::new(db), Arc::clone(&schema)))
        }
        BackendKind::Partitioned => {
            let db = match &dir {
                Some(dir) => EmbeddedKeyRangeDb::open(open_log(dir, KEYRANGE_LOG)?)?,
                None => EmbeddedKeyRangeDb::in_memory(),
            };
            Box::new(KeyRangeAdapter::owned(Arc::new(db), Arc::clone(&schema))?)
        }
    };
    let store = assemble(schema, backend, config, services);
    Ok(match dir {
        Some(dir) => store.with_directory(dir),
        None => store,
    })
}

/// Builds a document store over an existing client. Closing the store
/// leaves the client open.
///
/// # Errors
///
/// Returns a configuration error for an invalid schema or configuration.
pub fn document_store<R: Record>(
    client: Arc<dyn DocumentClient>,
    config: &LedgerConfig,
    services: &SharedServices,
) -> LedgerResult<ChainedStore<R>> {
    let schema = prepare::<R>(config, false)?;
    let backend = Box::new(DocumentAdapter::shared(client, Arc::clone(&schema)));
    Ok(assemble(schema, backend, config, services))
}

/// Builds a partitioned store over an existing client. Closing the store
/// leaves the client open.
///
/// # Errors
///
/// Returns a configuration error for an invalid schema, a schema without a
/// partition key, or an invalid configuration.
pub fn partitioned_store<R: Record>(
    client: Arc<dyn KeyRangeClient>,
    config: &LedgerConfig,
    services: &SharedServices,
) -> LedgerResult<ChainedStore<R>> {
    let schema = prepare::<R>(config, true)?;
    let backend = Box::new(KeyRangeAdapter::shared(client, Arc::clone(&schema))?);
    Ok(assemble(schema, backend, config, services))
}

fn prepare<R: Record>(config: &LedgerConfig, partitioned: bool) -> LedgerResult<Arc<Schema<R>>> {
    if config.default_limit == 0 {
        return Err(LedgerError::configuration("default limit must be positive"));
    }
    let schema = R::schema().build()?;
    if partitioned {
        schema.require_partition()?;
    }
    Ok(Arc::new(schema))
}

fn open_log(dir: &LedgerDir, name: &str) -> LedgerResult<Box<dyn StorageBackend>> {
    Ok(Box::new(FileBackend::open(&dir.log_path(name))?))
}

fn assemble<R: Record>(
    schema: Arc<Schema<R>>,
    backend: Box<dyn ChainBackend<R>>,
    config: &LedgerConfig,
    services: &SharedServices,
) -> ChainedStore<R> {
    let coordinator = Coordinator::new(
        Arc::clone(&services.locks),
        Arc::clone(&services.cache),
        config.lock,
        config.cache_ttl,
    );
    info!(
        backend = %config.backend,
        record = schema.record_name(),
        durable = config.data_dir.is_some(),
        "store ready"
    );
    ChainedStore::new(schema, backend, coordinator, config)
}
