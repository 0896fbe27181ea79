//! Schemaless documents exchanged with backends.

use crate::error::{LedgerError, LedgerResult};
use auditor_codec::Value;

/// A flat list of named values, in schema order when built from a record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    fields: Vec<(String, Value)>,
}

impl Document {
    /// Creates an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `name` to `value`, replacing any previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Builder form of [`Document::insert`].
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value.into());
        self
    }

    /// Returns the value of `name`, if present.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Iterates `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the document has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Converts to a canonical map value for persistence.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::map(
            self.fields
                .iter()
                .map(|(n, v)| (Value::text(n.clone()), v.clone()))
                .collect(),
        )
    }

    /// Rebuilds a document from a map value with text keys.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if `value` is not such a map.
    pub fn from_value(value: Value) -> LedgerResult<Self> {
        let Value::Map(pairs) = value else {
            return Err(LedgerError::serialization(format!(
                "expected document map, found {}",
                value.kind_name()
            )));
        };
        let mut doc = Document::new();
        for (key, value) in pairs {
            let Value::Text(name) = key else {
                return Err(LedgerError::serialization("document key is not text"));
            };
            doc.insert(name, value);
        }
        Ok(doc)
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut doc = Document::new();
        for (name, value) in iter {
            doc.insert(name, value);
        }
        doc
    }
}
