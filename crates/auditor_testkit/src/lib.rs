//! # Auditor Testkit
//!
//! Test utilities for the auditor ledger.
//!
//! This crate provides:
//! - Ledger fixtures over either backend, in memory or in a temp directory
//! - Property-based generators for audit events
//! - Concurrent append stress helpers that verify the resulting chains
//!
//! ## Usage
//!
//! ```
//! use auditor_testkit::prelude::*;
//! use auditor_core::{BackendKind, Store};
//!
//! with_ledger(BackendKind::Document, |store| {
//!     let mut event = sample_event("acme", 0);
//!     store.save(&mut event).unwrap();
//!     assert_eq!(event.previous_hash, "");
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;
