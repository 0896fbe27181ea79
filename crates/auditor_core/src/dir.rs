//! Data directory ownership.
//!
//! A durable ledger keeps its engine logs in one directory:
//!
//! ```text
//! <data_dir>/
//! ├─ LOCK             # Advisory lock for single-writer
//! ├─ documents.log    # Document engine log
//! └─ keyrange.log     # Key-range engine log
//! ```
//!
//! Engines replay their log once on open and append from memory afterwards,
//! so two processes appending to the same log would each link to a stale
//! tail. The LOCK file makes the directory single-writer.

use crate::error::{LedgerError, LedgerResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

/// Name of the lock file inside the data directory.
pub const LOCK_FILE: &str = "LOCK";

/// An exclusively locked data directory. The lock is released on drop.
#[derive(Debug)]
pub struct LedgerDir {
    path: PathBuf,
    _lock_file: File,
}

impl LedgerDir {
    /// Opens `path`, creating it if missing, and takes the directory lock
    /// without waiting.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryLocked` if another store holds the directory, a
    /// configuration error if `path` is not a directory, or a backend error
    /// on I/O failure.
    pub fn open(path: &Path) -> LedgerResult<Self> {
        if !path.exists() {
            fs::create_dir_all(path).map_err(|e| {
                LedgerError::backend(format!("cannot create {}: {e}", path.display()))
            })?;
        }
        if !path.is_dir() {
            return Err(LedgerError::configuration(format!(
                "data directory is not a directory: {}",
                path.display()
            )));
        }

        let lock_path = path.join(LOCK_FILE);
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| {
                LedgerError::backend(format!("cannot open {}: {e}", lock_path.display()))
            })?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(LedgerError::DirectoryLocked {
                path: path.display().to_string(),
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// The directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the engine log `name` inside the directory.
    #[must_use]
    pub fn log_path(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }
}
