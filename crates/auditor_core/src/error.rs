//! Error types for the ledger core.

use thiserror::Error;

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Errors that can occur in ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The schema or runtime configuration is unusable. Fatal at startup.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the problem.
        message: String,
    },

    /// The record was rejected before any store access.
    #[error("validation failed: {message}")]
    Validation {
        /// Description of the problem.
        message: String,
    },

    /// The backend failed or is unavailable.
    #[error("backend error: {message}")]
    Backend {
        /// Description of the failure.
        message: String,
    },

    /// The cluster lock could not be acquired within the retry budget.
    #[error("lock {key} unavailable after {attempts} attempts")]
    LockUnavailable {
        /// Lock key.
        key: String,
        /// Number of acquisition attempts made.
        attempts: u32,
    },

    /// The tail cache failed.
    #[error("tail cache error: {message}")]
    Cache {
        /// Description of the failure.
        message: String,
    },

    /// A record or cache entry could not be encoded or decoded.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the failure.
        message: String,
    },

    /// The record's sort value does not follow the chain tail.
    #[error("sort value {sort} is not after chain tail {tail}")]
    OutOfOrder {
        /// Sort value supplied with the record.
        sort: String,
        /// Sort value of the current tail.
        tail: String,
    },

    /// A partitioned operation was attempted without a partition value.
    #[error("partition key field '{field}' is required by this backend")]
    MissingPartition {
        /// Name of the partition key field.
        field: String,
    },

    /// The caller's deadline expired.
    #[error("deadline exceeded during {operation}")]
    DeadlineExceeded {
        /// Operation that was in progress.
        operation: String,
    },

    /// Another store holds the data directory.
    #[error("data directory {path} is locked by another store")]
    DirectoryLocked {
        /// The locked directory.
        path: String,
    },

    /// The store has been closed.
    #[error("store is closed")]
    Closed,
}

impl LedgerError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Creates a cache error.
    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache {
            message: message.into(),
        }
    }

    /// Creates a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Creates a deadline error.
    pub fn deadline_exceeded(operation: impl Into<String>) -> Self {
        Self::DeadlineExceeded {
            operation: operation.into(),
        }
    }

    /// Whether retrying the same operation later may succeed.
    ///
    /// Nothing in the core retries on its own; this is for callers.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Backend { .. }
                | Self::LockUnavailable { .. }
                | Self::Cache { .. }
                | Self::DeadlineExceeded { .. }
                | Self::DirectoryLocked { .. }
        )
    }
}

impl From<auditor_storage::StorageError> for LedgerError {
    fn from(err: auditor_storage::StorageError) -> Self {
        Self::backend(err.to_string())
    }
}

impl From<auditor_codec::CodecError> for LedgerError {
    fn from(err: auditor_codec::CodecError) -> Self {
        Self::serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(LedgerError::backend("down").is_retryable());
        assert!(LedgerError::LockUnavailable {
            key: "auditor.lock".into(),
            attempts: 11
        }
        .is_retryable());
        assert!(LedgerError::deadline_exceeded("save").is_retryable());
        assert!(LedgerError::DirectoryLocked {
            path: "/var/lib/auditor".into()
        }
        .is_retryable());
        assert!(!LedgerError::validation("empty event").is_retryable());
        assert!(!LedgerError::Closed.is_retryable());
        assert!(!LedgerError::configuration("bad store").is_retryable());
    }

    #[test]
    fn storage_errors_surface_as_backend() {
        let err: LedgerError = auditor_storage::StorageError::Corrupted("x".into()).into();
        assert!(matches!(err, LedgerError::Backend { .. }));
    }

    #[test]
    fn codec_errors_surface_as_serialization() {
        let err: LedgerError = auditor_codec::CodecError::FloatForbidden.into();
        assert!(matches!(err, LedgerError::Serialization { .. }));
    }
}
