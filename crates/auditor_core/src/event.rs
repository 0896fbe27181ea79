//! The default audit record.

use crate::error::{LedgerError, LedgerResult};
use crate::schema::{set_text, FieldKind, Record, SchemaBuilder};
use auditor_codec::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One audit event, chained to its predecessor within a customer's chain.
///
/// Wire shape (JSON):
///
/// ```json
/// {
///   "customer": "acme",
///   "timestamp": "2024-05-01T10:00:00.000000000Z",
///   "category": "auth",
///   "subcategory": "session",
///   "event": "login",
///   "hash": "…64 hex chars…",
///   "previous_hash": ""
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Tenant the event belongs to. Partition key of partitioned stores.
    pub customer: String,
    /// When the event happened. Stamped by the store if unset.
    #[serde(default, with = "timestamp_format")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Event category.
    pub category: String,
    /// Event subcategory.
    pub subcategory: String,
    /// Free-text description.
    pub event: String,
    /// Content address, set by the store.
    #[serde(default)]
    pub hash: String,
    /// Hash of the preceding event, set by the store. Empty for the first.
    #[serde(default)]
    pub previous_hash: String,
}

impl AuditEvent {
    /// Creates an unsaved event without a timestamp.
    pub fn new(
        customer: impl Into<String>,
        category: impl Into<String>,
        subcategory: impl Into<String>,
        event: impl Into<String>,
    ) -> Self {
        Self {
            customer: customer.into(),
            category: category.into(),
            subcategory: subcategory.into(),
            event: event.into(),
            ..Self::default()
        }
    }

    /// Sets the timestamp.
    #[must_use]
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// A read cursor: records older than `before`, within `customer`.
    pub fn cursor(customer: impl Into<String>, before: Option<DateTime<Utc>>) -> Self {
        Self {
            customer: customer.into(),
            timestamp: before,
            ..Self::default()
        }
    }

    /// Checks the event before it reaches a store.
    ///
    /// # Errors
    ///
    /// Returns a validation error if a descriptive field is empty or the
    /// caller supplied chain fields.
    pub fn validate(&self) -> LedgerResult<()> {
        let required = [
            ("customer", &self.customer),
            ("category", &self.category),
            ("subcategory", &self.subcategory),
            ("event", &self.event),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(LedgerError::validation(format!("{name} must not be empty")));
            }
        }
        if !self.hash.is_empty() || !self.previous_hash.is_empty() {
            return Err(LedgerError::validation(
                "hash and previous_hash are assigned by the ledger",
            ));
        }
        Ok(())
    }
}

fn set_timestamp(slot: &mut Option<DateTime<Utc>>, value: Value) -> bool {
    match value {
        Value::Timestamp(ts) => {
            *slot = Some(ts);
            true
        }
        Value::Null => {
            *slot = None;
            true
        }
        _ => false,
    }
}

impl Record for AuditEvent {
    fn schema() -> SchemaBuilder<Self> {
        SchemaBuilder::<Self>::new("audit")
            .field(
                "customer",
                FieldKind::Text,
                "partition_key",
                |e| e.customer.as_str().into(),
                |e, v| set_text(&mut e.customer, v),
            )
            .field(
                "timestamp",
                FieldKind::Timestamp,
                "sort,secondary_index",
                |e| e.timestamp.into(),
                |e, v| set_timestamp(&mut e.timestamp, v),
            )
            .field(
                "category",
                FieldKind::Text,
                "secondary_index",
                |e| e.category.as_str().into(),
                |e, v| set_text(&mut e.category, v),
            )
            .field(
                "subcategory",
                FieldKind::Text,
                "secondary_index",
                |e| e.subcategory.as_str().into(),
                |e, v| set_text(&mut e.subcategory, v),
            )
            .field(
                "event",
                FieldKind::Text,
                "",
                |e| e.event.as_str().into(),
                |e, v| set_text(&mut e.event, v),
            )
            .field(
                "hash",
                FieldKind::Text,
                "hash",
                |e| e.hash.as_str().into(),
                |e, v| set_text(&mut e.hash, v),
            )
            .field(
                "previous_hash",
                FieldKind::Text,
                "previoushash",
                |e| e.previous_hash.as_str().into(),
                |e, v| set_text(&mut e.previous_hash, v),
            )
    }
}

/// RFC 3339 with nine fractional digits on output; any offset on input.
mod timestamp_format {
    use auditor_codec::format_timestamp;
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(ts) => serializer.serialize_str(&format_timestamp(ts)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|s| {
                DateTime::parse_from_rfc3339(&s)
                    .map(|ts| ts.with_timezone(&Utc))
                    .map_err(serde::de::Error::custom)
            })
            .transpose()
    }
}
