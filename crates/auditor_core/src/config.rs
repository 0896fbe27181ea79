//! Ledger configuration.

use crate::coord::LockOptions;
use crate::error::{LedgerError, LedgerResult};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Environment variable selecting the backend.
pub const ENV_STORE: &str = "AUDITOR_STORE";
/// Environment variable naming the data directory.
pub const ENV_DATA_DIR: &str = "AUDITOR_DATA_DIR";
/// Environment variable for the lease TTL in milliseconds.
pub const ENV_LOCK_TTL_MS: &str = "AUDITOR_LOCK_TTL_MS";
/// Environment variable for the lock retry count.
pub const ENV_LOCK_RETRY_COUNT: &str = "AUDITOR_LOCK_RETRY_COUNT";
/// Environment variable for the lock retry delay in milliseconds.
pub const ENV_LOCK_RETRY_DELAY_MS: &str = "AUDITOR_LOCK_RETRY_DELAY_MS";
/// Environment variable for the tail cache TTL in milliseconds.
pub const ENV_CACHE_TTL_MS: &str = "AUDITOR_CACHE_TTL_MS";
/// Environment variable for the default operation timeout in milliseconds.
pub const ENV_OPERATION_TIMEOUT_MS: &str = "AUDITOR_OPERATION_TIMEOUT_MS";
/// Environment variable for the default page size.
pub const ENV_DEFAULT_LIMIT: &str = "AUDITOR_DEFAULT_LIMIT";

/// Which backend idiom stores the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Document store with secondary indexes; one global chain.
    Document,
    /// Partitioned key-range store; one chain per partition.
    Partitioned,
}

impl BackendKind {
    /// Canonical configuration value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            BackendKind::Document => "document",
            BackendKind::Partitioned => "partitioned",
        }
    }

    /// Whether records must carry a partition value.
    #[must_use]
    pub const fn is_partitioned(self) -> bool {
        matches!(self, BackendKind::Partitioned)
    }
}

impl FromStr for BackendKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "document" | "mongodb" | "cosmosdb" => Ok(BackendKind::Document),
            "partitioned" | "dynamodb" => Ok(BackendKind::Partitioned),
            other => Err(LedgerError::configuration(format!(
                "unknown store '{other}', expected one of: document, mongodb, cosmosdb, partitioned, dynamodb"
            ))),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for building a store.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Backend idiom.
    pub backend: BackendKind,
    /// Directory for durable engine files. `None` keeps everything in memory.
    pub data_dir: Option<PathBuf>,
    /// Cluster lock policy.
    pub lock: LockOptions,
    /// Lifetime of tail cache entries.
    pub cache_ttl: Duration,
    /// Deadline applied by `save`/`read` when none is given.
    pub operation_timeout: Duration,
    /// Page size used when `limit <= 0`.
    pub default_limit: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Document,
            data_dir: None,
            lock: LockOptions::default(),
            cache_ttl: Duration::from_secs(1),
            operation_timeout: Duration::from_secs(5),
            default_limit: 100,
        }
    }
}

impl LedgerConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new(backend: BackendKind) -> Self {
        Self {
            backend,
            ..Self::default()
        }
    }

    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `AUDITOR_STORE` is missing or
    /// unknown, or a numeric variable does not parse.
    pub fn from_env() -> LedgerResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name
    /// to its value.
    ///
    /// # Errors
    ///
    /// Same as [`LedgerConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> LedgerResult<Self> {
        let backend = lookup(ENV_STORE)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| LedgerError::configuration(format!("{ENV_STORE} is not set")))?
            .parse()?;

        let millis = |name: &str| -> LedgerResult<Option<Duration>> {
            parse_var::<u64>(&lookup, name).map(|v| v.map(Duration::from_millis))
        };

        let mut config = Self::new(backend);
        config.data_dir = lookup(ENV_DATA_DIR)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        if let Some(ttl) = millis(ENV_LOCK_TTL_MS)? {
            config.lock.ttl = ttl;
        }
        if let Some(count) = parse_var::<u32>(&lookup, ENV_LOCK_RETRY_COUNT)? {
            config.lock.retry_count = count;
        }
        if let Some(delay) = millis(ENV_LOCK_RETRY_DELAY_MS)? {
            config.lock.retry_delay = delay;
        }
        if let Some(ttl) = millis(ENV_CACHE_TTL_MS)? {
            config.cache_ttl = ttl;
        }
        if let Some(timeout) = millis(ENV_OPERATION_TIMEOUT_MS)? {
            config.operation_timeout = timeout;
        }
        if let Some(limit) = parse_var::<usize>(&lookup, ENV_DEFAULT_LIMIT)? {
            if limit == 0 {
                return Err(LedgerError::configuration(format!(
                    "{ENV_DEFAULT_LIMIT} must be positive"
                )));
            }
            config.default_limit = limit;
        }
        Ok(config)
    }

    /// Sets the data directory.
    #[must_use]
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Sets the cluster lock policy.
    #[must_use]
    pub const fn lock(mut self, options: LockOptions) -> Self {
        self.lock = options;
        self
    }

    /// Sets the tail cache TTL.
    #[must_use]
    pub const fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Sets the default operation timeout.
    #[must_use]
    pub const fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Sets the default page size.
    #[must_use]
    pub const fn default_limit(mut self, limit: usize) -> Self {
        self.default_limit = limit;
        self
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> LedgerResult<Option<T>>
where
    T::Err: fmt::Display,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|e| {
            LedgerError::configuration(format!("{name}={raw:?} is invalid: {e}"))
        }),
    }
}
