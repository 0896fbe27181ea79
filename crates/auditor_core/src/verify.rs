//! Chain verification.

use crate::deadline::Deadline;
use crate::error::LedgerResult;
use crate::hash::compute_hash;
use crate::schema::{Record, Schema};
use crate::store::{ChainedStore, Store};
use auditor_codec::Value;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

/// Outcome of verifying a chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainReport {
    /// Number of records checked.
    pub checked: usize,
    /// Problems found, oldest first. Empty for an intact chain.
    pub issues: Vec<ChainIssue>,
}

impl ChainReport {
    /// Whether no issues were found.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }
}

/// A problem found while verifying a chain. `position` counts from the
/// oldest record, starting at 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainIssue {
    /// The oldest record links to a predecessor.
    InvalidGenesis {
        /// Record position.
        position: usize,
        /// Previous hash it carries.
        previous_hash: String,
    },
    /// The stored hash does not match the record's content.
    HashMismatch {
        /// Record position.
        position: usize,
        /// Hash stored on the record.
        stored: String,
        /// Hash recomputed from its fields.
        computed: String,
    },
    /// The record does not link to the record before it.
    BrokenLink {
        /// Record position.
        position: usize,
        /// Hash of the preceding record.
        expected_previous: String,
        /// Previous hash carried by the record.
        actual_previous: String,
    },
    /// The sort value does not increase over the preceding record.
    SortRegression {
        /// Record position.
        position: usize,
    },
    /// The same hash appears more than once.
    DuplicateHash {
        /// Record position of the repeat.
        position: usize,
        /// The repeated hash.
        hash: String,
    },
}

impl fmt::Display for ChainIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidGenesis {
                position,
                previous_hash,
            } => write!(f, "invalid genesis at {position}: links to {previous_hash}"),
            Self::HashMismatch {
                position,
                stored,
                computed,
            } => write!(f, "hash mismatch at {position}: stored {stored}, computed {computed}"),
            Self::BrokenLink {
                position,
                expected_previous,
                actual_previous,
            } => write!(
                f,
                "broken link at {position}: expected {expected_previous}, found {actual_previous}"
            ),
            Self::SortRegression { position } => write!(f, "sort regression at {position}"),
            Self::DuplicateHash { position, hash } => {
                write!(f, "duplicate hash {hash} at {position}")
            }
        }
    }
}

fn text_of<R>(schema: &Schema<R>, record: &R, hash_field: bool) -> String {
    let field = if hash_field {
        schema.hash_field()
    } else {
        schema.previous_hash_field()
    };
    field.get(record).as_text().unwrap_or_default().to_string()
}

/// Verifies `records`, given oldest first, as one complete chain.
///
/// # Errors
///
/// Returns a serialization error if a record cannot be hashed.
pub fn verify_chain<R>(schema: &Schema<R>, records: &[R]) -> LedgerResult<ChainReport> {
    let mut report = ChainReport::default();
    let mut seen = HashSet::new();
    let sort = schema.sort_field();

    for (position, record) in records.iter().enumerate() {
        let stored = text_of(schema, record, true);
        let previous = text_of(schema, record, false);

        let computed = compute_hash(schema, record)?;
        if computed != stored {
            report.issues.push(ChainIssue::HashMismatch {
                position,
                stored: stored.clone(),
                computed,
            });
        }
        if !seen.insert(stored.clone()) {
            report.issues.push(ChainIssue::DuplicateHash {
                position,
                hash: stored.clone(),
            });
        }

        match position.checked_sub(1).map(|i| &records[i]) {
            None if !previous.is_empty() => report.issues.push(ChainIssue::InvalidGenesis {
                position,
                previous_hash: previous,
            }),
            None => {}
            Some(before) => {
                let expected = text_of(schema, before, true);
                if previous != expected {
                    report.issues.push(ChainIssue::BrokenLink {
                        position,
                        expected_previous: expected,
                        actual_previous: previous,
                    });
                }
                if sort.get(record).cmp_natural(&sort.get(before)) != Ordering::Greater {
                    report.issues.push(ChainIssue::SortRegression { position });
                }
            }
        }
        report.checked += 1;
    }
    Ok(report)
}

impl<R: Record> ChainedStore<R> {
    /// Reads the whole chain selected by `scope` page by page and verifies
    /// it. `scope` carries the partition for partitioned stores; its sort
    /// value is ignored.
    ///
    /// # Errors
    ///
    /// Returns the first read error, or a serialization error.
    pub fn verify(&self, scope: Option<&R>, page_size: i64, deadline: Deadline) -> LedgerResult<ChainReport> {
        let mut cursor = scope.cloned();
        if let Some(cursor) = cursor.as_mut() {
            self.schema().sort_field().set(cursor, Value::Null);
        }

        let mut newest_first = Vec::new();
        loop {
            let page = self.read_until(page_size, cursor.as_ref(), deadline)?;
            let Some(last) = page.last() else {
                break;
            };
            cursor = Some(last.clone());
            newest_first.extend(page);
        }

        newest_first.reverse();
        verify_chain(self.schema(), &newest_first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::AuditEvent;
    use crate::hash::compute_and_set_hash;
    use chrono::{TimeZone, Utc};

    fn chain(n: i64) -> (Schema<AuditEvent>, Vec<AuditEvent>) {
        let schema = AuditEvent::schema().build().unwrap();
        let mut previous = String::new();
        let mut records = Vec::new();
        for i in 1..=n {
            let mut event = AuditEvent::new("acme", "auth", "session", format!("e{i}"))
                .at(Utc.timestamp_opt(i, 0).unwrap());
            event.previous_hash = previous.clone();
            previous = compute_and_set_hash(&schema, &mut event).unwrap();
            records.push(event);
        }
        (schema, records)
    }

    #[test]
    fn intact_chain_passes() {
        let (schema, records) = chain(4);
        let report = verify_chain(&schema, &records).unwrap();
        assert!(report.is_valid());
        assert_eq!(report.checked, 4);
    }

    #[test]
    fn empty_chain_passes() {
        let (schema, _) = chain(0);
        let report = verify_chain(&schema, &[]).unwrap();
        assert!(report.is_valid());
        assert_eq!(report.checked, 0);
    }

    #[test]
    fn edited_field_is_a_hash_mismatch() {
        let (schema, mut records) = chain(3);
        records[1].event = "tampered".into();
        let report = verify_chain(&schema, &records).unwrap();
        assert_eq!(report.issues.len(), 1);
        assert!(matches!(
            report.issues[0],
            ChainIssue::HashMismatch { position: 1, .. }
        ));
    }

    #[test]
    fn deleted_record_is_a_broken_link() {
        let (schema, mut records) = chain(3);
        records.remove(1);
        let report = verify_chain(&schema, &records).unwrap();
        assert_eq!(report.issues.len(), 1);
        assert!(matches!(
            &report.issues[0],
            ChainIssue::BrokenLink { position: 1, .. }
        ));
        assert!(report.issues[0].to_string().starts_with("broken link at 1"));
    }

    #[test]
    fn truncated_head_is_an_invalid_genesis() {
        let (schema, records) = chain(3);
        let report = verify_chain(&schema, &records[1..]).unwrap();
        assert!(matches!(
            report.issues.as_slice(),
            [ChainIssue::InvalidGenesis { position: 0, .. }]
        ));
    }

    #[test]
    fn reordered_records_are_reported() {
        let (schema, mut records) = chain(3);
        records.swap(1, 2);
        let report = verify_chain(&schema, &records).unwrap();
        assert!(report
            .issues
            .iter()
            .any(|i| matches!(i, ChainIssue::SortRegression { position: 2 })));
        assert!(!report.is_valid());
    }

    #[test]
    fn replayed_record_is_a_duplicate() {
        let (schema, mut records) = chain(2);
        records.push(records[1].clone());
        let report = verify_chain(&schema, &records).unwrap();
        assert!(report
            .issues
            .iter()
            .any(|i| matches!(i, ChainIssue::DuplicateHash { position: 2, .. })));
    }
}
