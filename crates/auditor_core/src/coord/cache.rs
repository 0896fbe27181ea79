//! Short-lived cache of each chain's tail.

use crate::error::{LedgerError, LedgerResult};
use auditor_codec::{from_cbor, to_canonical_cbor, Value};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

/// A shared key-value cache with per-entry TTL.
pub trait TailCache: Send + Sync {
    /// Returns the unexpired value at `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache is unreachable.
    fn get(&self, key: &str) -> LedgerResult<Option<Vec<u8>>>;

    /// Stores `value` at `key` for `ttl`.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache is unreachable.
    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> LedgerResult<()>;

    /// Removes `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache is unreachable.
    fn invalidate(&self, key: &str) -> LedgerResult<()>;
}

/// The cached tail of a chain: its hash and sort value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailEntry {
    /// Hash of the tail record.
    pub hash: String,
    /// Sort value of the tail record.
    pub sort: Value,
}

impl TailEntry {
    /// Encodes as a canonical CBOR map `{hash, sort}`.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if encoding fails.
    pub fn encode(&self) -> LedgerResult<Vec<u8>> {
        let map = Value::map(vec![
            (Value::text("hash"), Value::text(self.hash.clone())),
            (Value::text("sort"), self.sort.clone()),
        ]);
        Ok(to_canonical_cbor(&map)?)
    }

    /// Decodes an entry written by [`TailEntry::encode`].
    ///
    /// # Errors
    ///
    /// Returns a serialization error for malformed bytes.
    pub fn decode(bytes: &[u8]) -> LedgerResult<Self> {
        let value = from_cbor(bytes)?;
        let hash = value
            .get("hash")
            .and_then(Value::as_text)
            .ok_or_else(|| LedgerError::serialization("tail entry has no hash"))?
            .to_string();
        let sort = value
            .get("sort")
            .cloned()
            .ok_or_else(|| LedgerError::serialization("tail entry has no sort value"))?;
        Ok(Self { hash, sort })
    }
}

/// In-process [`TailCache`]. Share one instance through `Arc` between
/// store instances.
#[derive(Default)]
pub struct MemoryTailCache {
    entries: Mutex<HashMap<String, (Vec<u8>, Instant)>>,
}

impl MemoryTailCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TailCache for MemoryTailCache {
    fn get(&self, key: &str) -> LedgerResult<Option<Vec<u8>>> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some((value, expires_at)) if *expires_at > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> LedgerResult<()> {
        self.entries
            .lock()
            .insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    fn invalidate(&self, key: &str) -> LedgerResult<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

impl fmt::Debug for MemoryTailCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTailCache")
            .field("entries", &self.entries.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn entry_encoding_round_trips() {
        let entry = TailEntry {
            hash: "ab".repeat(32),
            sort: Value::Timestamp(Utc.timestamp_opt(1_700_000_000, 42).unwrap()),
        };
        assert_eq!(TailEntry::decode(&entry.encode().unwrap()).unwrap(), entry);
    }

    #[test]
    fn malformed_entry_rejected() {
        let bytes = to_canonical_cbor(&Value::map(vec![(
            Value::text("sort"),
            Value::Integer(1),
        )]))
        .unwrap();
        assert!(matches!(
            TailEntry::decode(&bytes),
            Err(LedgerError::Serialization { .. })
        ));
        assert!(TailEntry::decode(&[0xff]).is_err());
    }

    #[test]
    fn entries_expire() {
        let cache = MemoryTailCache::new();
        cache
            .set("auditor.previoushash", b"h1".to_vec(), Duration::from_millis(10))
            .unwrap();
        assert_eq!(cache.get("auditor.previoushash").unwrap(), Some(b"h1".to_vec()));
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get("auditor.previoushash").unwrap(), None);
    }

    #[test]
    fn invalidate_removes_entry() {
        let cache = MemoryTailCache::new();
        cache.set("k", b"v".to_vec(), Duration::from_secs(1)).unwrap();
        cache.invalidate("k").unwrap();
        assert_eq!(cache.get("k").unwrap(), None);
    }
}
