//! Database driver boundaries and in-process reference engines.
//!
//! The ledger talks to its backends through two narrow traits shaped after
//! the drivers it targets: [`DocumentClient`] for document stores and
//! [`KeyRangeClient`] for partitioned key-range stores. The embedded
//! implementations keep data in memory and, given a
//! [`StorageBackend`](auditor_storage::StorageBackend), persist every
//! mutation to a frame log that is replayed on open.

mod document;
mod keyrange;

pub use document::{DocumentClient, EmbeddedDocumentDb, Filter, FindQuery, SortOrder};
pub use keyrange::{EmbeddedKeyRangeDb, KeyRangeClient, KeyRangeQuery, PutCondition, TableSpec};

use crate::error::{LedgerError, LedgerResult};
use auditor_codec::{from_cbor, to_canonical_cbor, Value};
use auditor_storage::FrameLog;
use std::cmp::Ordering;

/// A [`Value`] ordered by [`Value::cmp_natural`], for use as a map key.
#[derive(Debug, Clone)]
pub(crate) struct OrderedValue(pub(crate) Value);

impl PartialEq for OrderedValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OrderedValue {}

impl PartialOrd for OrderedValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedValue {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp_natural(&other.0)
    }
}

/// Appends one mutation to the engine's log, if it has one.
pub(crate) fn log_mutation(log: Option<&mut FrameLog>, mutation: &Value) -> LedgerResult<()> {
    if let Some(log) = log {
        let bytes = to_canonical_cbor(mutation)?;
        log.append(&bytes)?;
    }
    Ok(())
}

/// Decodes a logged mutation and returns its `op` name with the map.
pub(crate) fn decode_mutation(frame: &[u8]) -> LedgerResult<(String, Value)> {
    let value = from_cbor(frame)?;
    let op = value
        .get("op")
        .and_then(Value::as_text)
        .ok_or_else(|| LedgerError::backend("logged mutation has no op"))?
        .to_string();
    Ok((op, value))
}

/// Text field `name` of a logged mutation.
pub(crate) fn mutation_text(mutation: &Value, name: &str) -> LedgerResult<String> {
    mutation
        .get(name)
        .and_then(Value::as_text)
        .map(str::to_string)
        .ok_or_else(|| LedgerError::backend(format!("logged mutation has no '{name}'")))
}
