//! Property-based test generators using proptest.
//!
//! Provides strategies for generating audit events that pass
//! [`AuditEvent::validate`].

use auditor_core::AuditEvent;
use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;

/// Strategy for customer names usable as partition values.
pub fn customer_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9-]{0,15}").expect("Invalid regex")
}

/// Strategy for non-blank descriptive text, including non-ASCII.
pub fn label_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z0-9][A-Za-z0-9 _./:é-]{0,31}").expect("Invalid regex")
}

/// Strategy for timestamps with nanosecond precision between 1970 and 2100.
pub fn timestamp_strategy() -> impl Strategy<Value = DateTime<Utc>> {
    (0i64..4_102_444_800, 0u32..1_000_000_000)
        .prop_filter_map("Timestamp out of range", |(secs, nanos)| {
            Utc.timestamp_opt(secs, nanos).single()
        })
}

/// Strategy for unsaved events without a timestamp, so the store stamps
/// one.
pub fn audit_event_strategy() -> impl Strategy<Value = AuditEvent> {
    (
        customer_strategy(),
        label_strategy(),
        label_strategy(),
        label_strategy(),
    )
        .prop_map(|(customer, category, subcategory, event)| {
            AuditEvent::new(customer, category, subcategory, event)
        })
}

/// Strategy for unsaved events carrying an explicit timestamp.
pub fn timestamped_event_strategy() -> impl Strategy<Value = AuditEvent> {
    (audit_event_strategy(), timestamp_strategy()).prop_map(|(event, ts)| event.at(ts))
}

/// Strategy for a batch of unsaved events.
pub fn event_batch_strategy(min: usize, max: usize) -> impl Strategy<Value = Vec<AuditEvent>> {
    prop::collection::vec(audit_event_strategy(), min..max)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn generated_events_validate(event in audit_event_strategy()) {
            prop_assert!(event.validate().is_ok());
            prop_assert!(event.timestamp.is_none());
        }

        #[test]
        fn timestamped_events_carry_timestamp(event in timestamped_event_strategy()) {
            prop_assert!(event.timestamp.is_some());
        }

        #[test]
        fn batches_respect_bounds(batch in event_batch_strategy(2, 6)) {
            prop_assert!((2..6).contains(&batch.len()));
        }
    }
}
