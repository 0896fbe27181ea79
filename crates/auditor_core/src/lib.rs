//! # Auditor Core
//!
//! Tamper-evident, append-only audit ledger.
//!
//! Every saved record carries the hash of the record saved before it in the
//! same chain, so editing, deleting or reordering stored records breaks a
//! link that [`verify_chain`] detects.
//!
//! This crate provides:
//! - Schema descriptors mapping record fields to ledger roles
//! - Canonical content hashing (SHA-256 over canonical CBOR)
//! - The [`Store`] contract with a document-store adapter (one global
//!   chain) and a partitioned key-range adapter (one chain per partition)
//! - Chain coordination: a local mutex, a cluster lease and a tail cache
//! - Embedded reference engines, in memory or persisted to a frame log
//!
//! ## Usage
//!
//! ```
//! use auditor_core::{new_store, AuditEvent, BackendKind, LedgerConfig, Store};
//!
//! let store = new_store::<AuditEvent>(&LedgerConfig::new(BackendKind::Document)).unwrap();
//!
//! let mut login = AuditEvent::new("acme", "auth", "session", "login");
//! store.save(&mut login).unwrap();
//! assert!(login.previous_hash.is_empty());
//!
//! let mut logout = AuditEvent::new("acme", "auth", "session", "logout");
//! store.save(&mut logout).unwrap();
//! assert_eq!(logout.previous_hash, login.hash);
//!
//! let newest = store.read(10, None).unwrap();
//! assert_eq!(newest, vec![logout, login]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod coord;
mod deadline;
mod dir;
pub mod engine;
mod error;
mod event;
mod hash;
mod provider;
pub mod schema;
mod store;
mod verify;

pub use config::{BackendKind, LedgerConfig};
pub use deadline::Deadline;
pub use dir::{LedgerDir, LOCK_FILE};
pub use error::{LedgerError, LedgerResult};
pub use event::AuditEvent;
pub use hash::{compute_and_set_hash, compute_hash, verify_hash};
pub use provider::{
    document_store, new_store, new_store_with, partitioned_store, SharedServices, DOCUMENT_LOG,
    KEYRANGE_LOG,
};
pub use schema::{Document, FieldKind, Record, Role, Schema, SchemaBuilder};
pub use store::{
    normalize_limit, ChainBackend, ChainedStore, DocumentAdapter, KeyRangeAdapter, Store,
    DEFAULT_LIMIT,
};
pub use verify::{verify_chain, ChainIssue, ChainReport};

pub use auditor_codec::Value;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
