//! # Auditor Storage
//!
//! Byte-level persistence for the auditor ledger's embedded engines.
//!
//! Backends are **opaque append-only byte stores**: they never interpret
//! what they hold. The [`FrameLog`] layered on top splits that byte stream
//! into length-prefixed, CRC32-checked frames, which is all the document and
//! key-range engines need to replay their contents after a restart.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For tests and ephemeral ledgers
//! - [`FileBackend`] - For persistent ledgers using OS file APIs
//!
//! ## Example
//!
//! ```rust
//! use auditor_storage::{FrameLog, InMemoryBackend};
//!
//! let (mut log, replayed) = FrameLog::open(Box::new(InMemoryBackend::new())).unwrap();
//! assert!(replayed.is_empty());
//! log.append(b"first").unwrap();
//! assert_eq!(log.frames().unwrap(), vec![b"first".to_vec()]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod frame;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use frame::{FrameLog, FRAME_OVERHEAD};
pub use memory::InMemoryBackend;
