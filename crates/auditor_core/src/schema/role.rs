//! Field roles and value kinds.

use crate::error::{LedgerError, LedgerResult};
use auditor_codec::Value;
use std::fmt;
use std::str::FromStr;

/// The purpose a field serves in chaining or indexing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Content address of the record.
    Hash,
    /// Content address of the preceding record.
    PreviousHash,
    /// Total order of the chain.
    Sort,
    /// Chain scope for partitioned backends.
    PartitionKey,
    /// Backend index hint.
    SecondaryIndex,
}

impl Role {
    /// All roles, in declaration order.
    pub const ALL: [Role; 5] = [
        Role::Hash,
        Role::PreviousHash,
        Role::Sort,
        Role::PartitionKey,
        Role::SecondaryIndex,
    ];

    /// The tag string that selects this role.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Role::Hash => "hash",
            Role::PreviousHash => "previoushash",
            Role::Sort => "sort",
            Role::PartitionKey => "partition_key",
            Role::SecondaryIndex => "secondary_index",
        }
    }

    /// Parses a comma-separated tag list such as `"sort,secondary_index"`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for unknown or repeated tags.
    pub fn parse_tags(tags: &str) -> LedgerResult<Vec<Role>> {
        let mut roles = Vec::new();
        for tag in tags.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let role: Role = tag.parse()?;
            if roles.contains(&role) {
                return Err(LedgerError::configuration(format!(
                    "role tag '{tag}' repeated"
                )));
            }
            roles.push(role);
        }
        Ok(roles)
    }
}

impl FromStr for Role {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.tag() == s)
            .ok_or_else(|| LedgerError::configuration(format!("unknown role tag '{s}'")))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// The value type a field holds.
///
/// Every kind has a deterministic total order, so any of them may carry the
/// sort role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// UTF-8 text.
    Text,
    /// Signed 64-bit integer.
    Integer,
    /// UTC timestamp with nanosecond precision.
    Timestamp,
}

impl FieldKind {
    /// Whether `value` may be stored in a field of this kind. Null is
    /// always accepted and means "unset".
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (_, Value::Null)
                | (FieldKind::Text, Value::Text(_))
                | (FieldKind::Integer, Value::Integer(_))
                | (FieldKind::Timestamp, Value::Timestamp(_))
        )
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FieldKind::Text => "text",
            FieldKind::Integer => "integer",
            FieldKind::Timestamp => "timestamp",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip_through_parse() {
        for role in Role::ALL {
            assert_eq!(role.tag().parse::<Role>().unwrap(), role);
        }
    }

    #[test]
    fn parse_tag_list() {
        assert_eq!(
            Role::parse_tags("sort, secondary_index").unwrap(),
            vec![Role::Sort, Role::SecondaryIndex]
        );
        assert!(Role::parse_tags("").unwrap().is_empty());
    }

    #[test]
    fn unknown_tag_is_configuration_error() {
        assert!(matches!(
            Role::parse_tags("hash,primary"),
            Err(LedgerError::Configuration { .. })
        ));
        assert!(matches!(
            "previous_hash".parse::<Role>(),
            Err(LedgerError::Configuration { .. })
        ));
    }

    #[test]
    fn repeated_tag_rejected() {
        assert!(Role::parse_tags("sort,sort").is_err());
    }

    #[test]
    fn kinds_accept_null_and_matching_values() {
        assert!(FieldKind::Text.accepts(&Value::Null));
        assert!(FieldKind::Text.accepts(&Value::text("x")));
        assert!(!FieldKind::Text.accepts(&Value::Integer(1)));
        assert!(FieldKind::Integer.accepts(&Value::Integer(1)));
        assert!(!FieldKind::Timestamp.accepts(&Value::text("2024-01-01")));
    }
}
