//! Record schema descriptors.
//!
//! A [`Schema`] tells the rest of the ledger which field of a record plays
//! which [`Role`], and how to read and write each field without knowing the
//! record type. Schemas are declared once per record type through
//! [`SchemaBuilder`] and validated when built; a record type whose schema
//! fails validation cannot be stored.
//!
//! ```
//! use auditor_codec::Value;
//! use auditor_core::{FieldKind, Record, Role, SchemaBuilder};
//!
//! #[derive(Debug, Clone, Default)]
//! struct Entry {
//!     seq: Option<i64>,
//!     note: String,
//!     hash: String,
//!     previous_hash: String,
//! }
//!
//! impl Record for Entry {
//!     fn schema() -> SchemaBuilder<Self> {
//!         SchemaBuilder::<Self>::new("entries")
//!             .field("seq", FieldKind::Integer, "sort",
//!                 |r| r.seq.into(),
//!                 |r, v| match v {
//!                     Value::Integer(n) => { r.seq = Some(n); true }
//!                     Value::Null => { r.seq = None; true }
//!                     _ => false,
//!                 })
//!             .field("note", FieldKind::Text, "",
//!                 |r| r.note.as_str().into(),
//!                 |r, v| auditor_core::schema::set_text(&mut r.note, v))
//!             .field("hash", FieldKind::Text, "hash",
//!                 |r| r.hash.as_str().into(),
//!                 |r, v| auditor_core::schema::set_text(&mut r.hash, v))
//!             .field("previous_hash", FieldKind::Text, "previoushash",
//!                 |r| r.previous_hash.as_str().into(),
//!                 |r, v| auditor_core::schema::set_text(&mut r.previous_hash, v))
//!     }
//! }
//!
//! let schema = Entry::schema().build().unwrap();
//! assert_eq!(schema.sort_field().name(), "seq");
//! assert_eq!(schema.fields_with_role(Role::Hash).len(), 1);
//! ```

mod document;
mod role;

pub use document::Document;
pub use role::{FieldKind, Role};

use crate::error::{LedgerError, LedgerResult};
use auditor_codec::Value;
use std::collections::HashSet;
use std::fmt;

/// Reads a field's value from a record.
pub type Getter<R> = fn(&R) -> Value;

/// Writes a field's value into a record. Returns `false` if the value has
/// the wrong kind.
pub type Setter<R> = fn(&mut R, Value) -> bool;

/// A record type that can be chained and stored.
///
/// Every field declared by the schema must be writable, so a record can be
/// rebuilt from a stored [`Document`].
pub trait Record: Default + Clone + Send + Sync + 'static {
    /// Declares the record's fields and roles.
    fn schema() -> SchemaBuilder<Self>;
}

/// Setter helper for `String` fields. Null clears the field.
pub fn set_text(slot: &mut String, value: Value) -> bool {
    match value {
        Value::Text(s) => {
            *slot = s;
            true
        }
        Value::Null => {
            slot.clear();
            true
        }
        _ => false,
    }
}

/// One field of a record type.
pub struct Field<R> {
    name: String,
    kind: FieldKind,
    roles: Vec<Role>,
    get: Getter<R>,
    set: Setter<R>,
}

impl<R> Field<R> {
    /// Field name as persisted.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Value kind.
    #[must_use]
    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    /// Roles carried by this field.
    #[must_use]
    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    /// Whether the field carries `role`.
    #[must_use]
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Reads this field from `record`.
    pub fn get(&self, record: &R) -> Value {
        (self.get)(record)
    }

    /// Writes `value` into `record`. Returns `false` if the kind does not
    /// match, leaving the record unchanged.
    pub fn set(&self, record: &mut R, value: Value) -> bool {
        self.kind.accepts(&value) && (self.set)(record, value)
    }
}

impl<R> fmt::Debug for Field<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("roles", &self.roles)
            .finish_non_exhaustive()
    }
}

struct PendingField<R> {
    name: String,
    kind: FieldKind,
    tags: String,
    get: Getter<R>,
    set: Setter<R>,
}

/// Declares the fields of a record type.
pub struct SchemaBuilder<R> {
    record_name: String,
    fields: Vec<PendingField<R>>,
}

impl<R> SchemaBuilder<R> {
    /// Starts a schema. `record_name` names the collection or table.
    pub fn new(record_name: impl Into<String>) -> Self {
        Self {
            record_name: record_name.into(),
            fields: Vec::new(),
        }
    }

    /// Adds a field. `tags` is a comma-separated list of role tags
    /// (`hash`, `previoushash`, `sort`, `partition_key`, `secondary_index`),
    /// possibly empty. Declaration order is hash order.
    #[must_use]
    pub fn field(
        mut self,
        name: impl Into<String>,
        kind: FieldKind,
        tags: &str,
        get: Getter<R>,
        set: Setter<R>,
    ) -> Self {
        self.fields.push(PendingField {
            name: name.into(),
            kind,
            tags: tags.to_string(),
            get,
            set,
        });
        self
    }

    /// Validates the declaration and builds the schema.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a tag is unknown, a field name
    /// repeats, there is not exactly one `hash`, `previoushash` and `sort`
    /// field, there is more than one `partition_key` field, or the hash
    /// fields are not text.
    pub fn build(self) -> LedgerResult<Schema<R>> {
        if self.record_name.is_empty() {
            return Err(LedgerError::configuration("record name is empty"));
        }

        let mut names = HashSet::new();
        let mut fields = Vec::with_capacity(self.fields.len());
        for pending in self.fields {
            if pending.name.is_empty() {
                return Err(LedgerError::configuration("field name is empty"));
            }
            if !names.insert(pending.name.clone()) {
                return Err(LedgerError::configuration(format!(
                    "{}: field '{}' declared twice",
                    self.record_name, pending.name
                )));
            }
            let roles = Role::parse_tags(&pending.tags).map_err(|e| {
                LedgerError::configuration(format!(
                    "{}.{}: {e}",
                    self.record_name, pending.name
                ))
            })?;
            fields.push(Field {
                name: pending.name,
                kind: pending.kind,
                roles,
                get: pending.get,
                set: pending.set,
            });
        }

        let record_name = self.record_name;
        let exactly_one = |role: Role| -> LedgerResult<usize> {
            let matches: Vec<usize> = fields
                .iter()
                .enumerate()
                .filter(|(_, f)| f.has_role(role))
                .map(|(i, _)| i)
                .collect();
            match matches.as_slice() {
                [index] => Ok(*index),
                [] => Err(LedgerError::configuration(format!(
                    "{record_name}: no field tagged '{role}'"
                ))),
                _ => Err(LedgerError::configuration(format!(
                    "{record_name}: {} fields tagged '{role}', expected one",
                    matches.len()
                ))),
            }
        };

        let hash = exactly_one(Role::Hash)?;
        let previous_hash = exactly_one(Role::PreviousHash)?;
        let sort = exactly_one(Role::Sort)?;
        let partition = match exactly_one(Role::PartitionKey) {
            Ok(index) => Some(index),
            Err(_) if !fields.iter().any(|f| f.has_role(Role::PartitionKey)) => None,
            Err(e) => return Err(e),
        };

        if hash == previous_hash {
            return Err(LedgerError::configuration(format!(
                "{record_name}: hash and previoushash must be different fields"
            )));
        }
        for index in [hash, previous_hash] {
            let field = &fields[index];
            if field.kind != FieldKind::Text {
                return Err(LedgerError::configuration(format!(
                    "{record_name}.{}: hash fields must be text, found {}",
                    field.name, field.kind
                )));
            }
        }
        if [hash, previous_hash].contains(&sort) {
            return Err(LedgerError::configuration(format!(
                "{record_name}: sort field cannot be a hash field"
            )));
        }

        Ok(Schema {
            record_name,
            fields,
            hash,
            previous_hash,
            sort,
            partition,
        })
    }
}

/// A validated role-to-field mapping for record type `R`.
pub struct Schema<R> {
    record_name: String,
    fields: Vec<Field<R>>,
    hash: usize,
    previous_hash: usize,
    sort: usize,
    partition: Option<usize>,
}

impl<R> Schema<R> {
    /// Name of the collection or table records are stored in.
    #[must_use]
    pub fn record_name(&self) -> &str {
        &self.record_name
    }

    /// All fields in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[Field<R>] {
        &self.fields
    }

    /// Fields carrying `role`, in declaration order.
    #[must_use]
    pub fn fields_with_role(&self, role: Role) -> Vec<&Field<R>> {
        self.fields.iter().filter(|f| f.has_role(role)).collect()
    }

    /// Looks up a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field<R>> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// The field holding the record's own hash.
    #[must_use]
    pub fn hash_field(&self) -> &Field<R> {
        &self.fields[self.hash]
    }

    /// The field holding the preceding record's hash.
    #[must_use]
    pub fn previous_hash_field(&self) -> &Field<R> {
        &self.fields[self.previous_hash]
    }

    /// The field that orders the chain.
    #[must_use]
    pub fn sort_field(&self) -> &Field<R> {
        &self.fields[self.sort]
    }

    /// The partition key field, if declared.
    #[must_use]
    pub fn partition_field(&self) -> Option<&Field<R>> {
        self.partition.map(|i| &self.fields[i])
    }

    /// Returns the partition key field, failing if there is none.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when no field is tagged
    /// `partition_key`.
    pub fn require_partition(&self) -> LedgerResult<&Field<R>> {
        self.partition_field().ok_or_else(|| {
            LedgerError::configuration(format!(
                "{}: partitioned backend requires a field tagged 'partition_key'",
                self.record_name
            ))
        })
    }

    /// Reads field `name` from `record`.
    #[must_use]
    pub fn get_value(&self, record: &R, name: &str) -> Option<Value> {
        self.field(name).map(|f| f.get(record))
    }

    /// Writes field `name` on `record`. Returns `false` for an unknown
    /// field or a value of the wrong kind.
    pub fn set_value(&self, record: &mut R, name: &str, value: Value) -> bool {
        self.field(name).is_some_and(|f| f.set(record, value))
    }

    /// Converts a record to a document in declaration order.
    #[must_use]
    pub fn to_document(&self, record: &R) -> Document {
        self.fields
            .iter()
            .map(|f| (f.name.clone(), f.get(record)))
            .collect()
    }

    /// Hash input: `[[name, value], ...]` in declaration order, without the
    /// hash field.
    #[must_use]
    pub fn hash_input(&self, record: &R) -> Value {
        Value::Array(
            self.fields
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != self.hash)
                .map(|(_, f)| Value::Array(vec![Value::text(f.name.clone()), f.get(record)]))
                .collect(),
        )
    }
}

impl<R: Default> Schema<R> {
    /// Rebuilds a record from a stored document. Absent fields keep their
    /// default value; unknown document fields are ignored.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if a value has the wrong kind.
    pub fn from_document(&self, doc: &Document) -> LedgerResult<R> {
        let mut record = R::default();
        for field in &self.fields {
            if let Some(value) = doc.get(&field.name) {
                if !field.set(&mut record, value.clone()) {
                    return Err(LedgerError::serialization(format!(
                        "{}.{}: expected {}, found {}",
                        self.record_name,
                        field.name,
                        field.kind,
                        value.kind_name()
                    )));
                }
            }
        }
        Ok(record)
    }
}

impl<R> fmt::Debug for Schema<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("record_name", &self.record_name)
            .field("fields", &self.fields)
            .finish()
    }
}
