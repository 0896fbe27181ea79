//! Ledger fixtures.
//!
//! Provides ready-made stores over either backend, in memory or backed by
//! a temporary directory that is removed when the fixture drops.

use auditor_core::{new_store, AuditEvent, BackendKind, ChainedStore, LedgerConfig, Store};
use std::path::Path;
use tempfile::TempDir;

/// A test ledger with automatic cleanup.
pub struct TestLedger {
    /// The store instance.
    pub store: ChainedStore<AuditEvent>,
    /// Backend kind.
    pub kind: BackendKind,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: Option<TempDir>,
}

impl TestLedger {
    /// Creates an in-memory ledger.
    pub fn memory(kind: BackendKind) -> Self {
        Self {
            store: new_store(&LedgerConfig::new(kind)).expect("Failed to open in-memory ledger"),
            kind,
            temp_dir: None,
        }
    }

    /// Creates a file-backed ledger in a fresh temporary directory.
    pub fn file(kind: BackendKind) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = new_store(&LedgerConfig::new(kind).data_dir(temp_dir.path()))
            .expect("Failed to open file ledger");
        Self {
            store,
            kind,
            temp_dir: Some(temp_dir),
        }
    }

    /// Data directory if file-backed, None if in-memory.
    pub fn path(&self) -> Option<&Path> {
        self.temp_dir.as_ref().map(TempDir::path)
    }

    /// Closes the store and opens a new one over the same files, as a
    /// restarted process would. In-memory ledgers come back empty.
    pub fn reopen(self) -> Self {
        let TestLedger {
            store,
            kind,
            temp_dir,
        } = self;
        store.close().expect("Failed to close ledger");
        drop(store);

        let mut config = LedgerConfig::new(kind);
        if let Some(dir) = &temp_dir {
            config = config.data_dir(dir.path());
        }
        Self {
            store: new_store(&config).expect("Failed to reopen ledger"),
            kind,
            temp_dir,
        }
    }

    /// Cursor selecting the first page of `customer`'s chain: a partition
    /// for partitioned ledgers, nothing for document ledgers.
    pub fn first_page(&self, customer: &str) -> Option<AuditEvent> {
        self.kind
            .is_partitioned()
            .then(|| AuditEvent::cursor(customer, None))
    }
}

impl std::ops::Deref for TestLedger {
    type Target = ChainedStore<AuditEvent>;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Runs a test with a temporary in-memory ledger.
///
/// # Example
///
/// ```
/// use auditor_core::{BackendKind, Store};
/// use auditor_testkit::with_ledger;
///
/// with_ledger(BackendKind::Partitioned, |store| {
///     assert!(store.read(10, Some(&auditor_core::AuditEvent::cursor("acme", None)))
///         .unwrap()
///         .is_empty());
/// });
/// ```
pub fn with_ledger<F, R>(kind: BackendKind, f: F) -> R
where
    F: FnOnce(&ChainedStore<AuditEvent>) -> R,
{
    let ledger = TestLedger::memory(kind);
    f(&ledger.store)
}

/// Runs a test with a temporary file-backed ledger.
pub fn with_file_ledger<F, R>(kind: BackendKind, f: F) -> R
where
    F: FnOnce(&ChainedStore<AuditEvent>, &Path) -> R,
{
    let ledger = TestLedger::file(kind);
    let path = ledger.path().expect("File ledger should have a path");
    f(&ledger.store, path)
}

/// A deterministic unsaved event.
pub fn sample_event(customer: &str, index: usize) -> AuditEvent {
    AuditEvent::new(customer, "auth", "session", format!("event-{index}"))
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// A ledger holding `per_customer` events for each of `customers`,
    /// appended round-robin.
    pub fn populated_ledger(kind: BackendKind, customers: &[&str], per_customer: usize) -> TestLedger {
        let ledger = TestLedger::memory(kind);
        for i in 0..per_customer {
            for customer in customers {
                let mut event = sample_event(customer, i);
                ledger.save(&mut event).expect("Failed to save event");
            }
        }
        ledger
    }
}
