//! Document-store driver boundary and embedded engine.

use super::{decode_mutation, log_mutation, mutation_text, OrderedValue};
use crate::deadline::Deadline;
use crate::error::{LedgerError, LedgerResult};
use crate::schema::Document;
use auditor_codec::Value;
use auditor_storage::{FrameLog, StorageBackend};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::Bound;
use tracing::debug;

/// Direction of a sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

/// A predicate on one document field.
///
/// Comparisons only match values of the same kind as the operand, so a
/// missing or null field never satisfies `Lt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Field equals the value.
    Eq {
        /// Field name.
        field: String,
        /// Operand.
        value: Value,
    },
    /// Field is strictly less than the value.
    Lt {
        /// Field name.
        field: String,
        /// Operand.
        value: Value,
    },
}

impl Filter {
    /// `field == value`.
    pub fn eq(field: impl Into<String>, value: Value) -> Self {
        Self::Eq {
            field: field.into(),
            value,
        }
    }

    /// `field < value`.
    pub fn lt(field: impl Into<String>, value: Value) -> Self {
        Self::Lt {
            field: field.into(),
            value,
        }
    }

    /// Whether `doc` satisfies the predicate.
    #[must_use]
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::Eq { field, value } => doc.get(field) == Some(value),
            Filter::Lt { field, value } => doc.get(field).is_some_and(|v| {
                v.kind_name() == value.kind_name()
                    && v.cmp_natural(value) == std::cmp::Ordering::Less
            }),
        }
    }
}

/// A find request: filters, an optional sort and a limit (0 = no limit).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindQuery {
    /// Conjunction of predicates.
    pub filters: Vec<Filter>,
    /// Sort field and direction.
    pub sort: Option<(String, SortOrder)>,
    /// Maximum documents returned.
    pub limit: usize,
}

impl FindQuery {
    /// A query matching everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a predicate.
    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Sorts by `field`.
    #[must_use]
    pub fn sort_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort = Some((field.into(), order));
        self
    }

    /// Caps the number of results.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// Operations the ledger needs from a document store.
pub trait DocumentClient: Send + Sync {
    /// Creates an ascending index on `field`. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns a backend error or `DeadlineExceeded`.
    fn ensure_index(&self, collection: &str, field: &str, deadline: Deadline) -> LedgerResult<()>;

    /// Inserts one document.
    ///
    /// # Errors
    ///
    /// Returns a backend error or `DeadlineExceeded`.
    fn insert(&self, collection: &str, doc: &Document, deadline: Deadline) -> LedgerResult<()>;

    /// Finds documents matching `query`.
    ///
    /// # Errors
    ///
    /// Returns a backend error or `DeadlineExceeded`.
    fn find(&self, collection: &str, query: &FindQuery, deadline: Deadline)
        -> LedgerResult<Vec<Document>>;

    /// Ends the session. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns a backend error if shutdown fails.
    fn close(&self) -> LedgerResult<()>;
}

#[derive(Default)]
struct Collection {
    docs: Vec<Document>,
    indexes: HashMap<String, BTreeMap<OrderedValue, Vec<usize>>>,
}

impl Collection {
    fn index_key(doc: &Document, field: &str) -> OrderedValue {
        OrderedValue(doc.get(field).cloned().unwrap_or(Value::Null))
    }

    fn build_index(&mut self, field: &str) {
        if self.indexes.contains_key(field) {
            return;
        }
        let mut index: BTreeMap<OrderedValue, Vec<usize>> = BTreeMap::new();
        for (pos, doc) in self.docs.iter().enumerate() {
            index.entry(Self::index_key(doc, field)).or_default().push(pos);
        }
        self.indexes.insert(field.to_string(), index);
    }

    fn insert(&mut self, doc: Document) {
        let pos = self.docs.len();
        for (field, index) in &mut self.indexes {
            index.entry(Self::index_key(&doc, field)).or_default().push(pos);
        }
        self.docs.push(doc);
    }

    /// Candidate positions in sort order, narrowed by a `Lt` on the sort
    /// field when the index allows it.
    fn ordered_positions(&self, query: &FindQuery) -> Vec<usize> {
        let Some((field, order)) = &query.sort else {
            return (0..self.docs.len()).collect();
        };

        let Some(index) = self.indexes.get(field) else {
            let mut positions: Vec<usize> = (0..self.docs.len()).collect();
            positions.sort_by(|&a, &b| {
                let ord = Self::index_key(&self.docs[a], field)
                    .cmp(&Self::index_key(&self.docs[b], field));
                match order {
                    SortOrder::Ascending => ord,
                    SortOrder::Descending => ord.reverse(),
                }
            });
            return positions;
        };

        let upper = query.filters.iter().find_map(|f| match f {
            Filter::Lt { field: f, value } if f == field => Some(OrderedValue(value.clone())),
            _ => None,
        });
        let range = index.range((
            Bound::Unbounded,
            upper.map_or(Bound::Unbounded, Bound::Excluded),
        ));
        match order {
            SortOrder::Ascending => range.flat_map(|(_, p)| p.iter().copied()).collect(),
            SortOrder::Descending => range
                .rev()
                .flat_map(|(_, p)| p.iter().rev().copied())
                .collect(),
        }
    }

    fn find(&self, query: &FindQuery) -> Vec<Document> {
        let limit = if query.limit == 0 {
            usize::MAX
        } else {
            query.limit
        };
        self.ordered_positions(query)
            .into_iter()
            .map(|pos| &self.docs[pos])
            .filter(|doc| query.filters.iter().all(|f| f.matches(doc)))
            .take(limit)
            .cloned()
            .collect()
    }
}

struct DocState {
    collections: HashMap<String, Collection>,
    log: Option<FrameLog>,
    closed: bool,
}

impl DocState {
    fn apply_index(&mut self, collection: &str, field: &str) {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .build_index(field);
    }

    fn apply_insert(&mut self, collection: &str, doc: Document) {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(doc);
    }

    fn check_open(&self) -> LedgerResult<()> {
        if self.closed {
            Err(LedgerError::backend("document session is closed"))
        } else {
            Ok(())
        }
    }
}

/// An in-process document store.
///
/// Documents are kept in insertion order; each index is an ordered map
/// from field value to document positions. With a storage backend, every
/// insert and index creation is appended to a frame log before it becomes
/// visible.
pub struct EmbeddedDocumentDb {
    state: Mutex<DocState>,
}

impl EmbeddedDocumentDb {
    /// An empty, memory-only store.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            state: Mutex::new(DocState {
                collections: HashMap::new(),
                log: None,
                closed: false,
            }),
        }
    }

    /// Opens a durable store over `backend`, replaying its log.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the log is corrupted or unreadable.
    pub fn open(backend: Box<dyn StorageBackend>) -> LedgerResult<Self> {
        let (log, frames) = FrameLog::open(backend)?;
        let mut state = DocState {
            collections: HashMap::new(),
            log: None,
            closed: false,
        };
        for frame in &frames {
            let (op, mutation) = decode_mutation(frame)?;
            let collection = mutation_text(&mutation, "collection")?;
            match op.as_str() {
                "index" => state.apply_index(&collection, &mutation_text(&mutation, "field")?),
                "insert" => {
                    let doc = mutation
                        .get("doc")
                        .cloned()
                        .ok_or_else(|| LedgerError::backend("logged insert has no doc"))?;
                    state.apply_insert(&collection, Document::from_value(doc)?);
                }
                other => {
                    return Err(LedgerError::backend(format!(
                        "unknown logged mutation '{other}'"
                    )))
                }
            }
        }
        debug!(mutations = frames.len(), "document store replayed");
        state.log = Some(log);
        Ok(Self {
            state: Mutex::new(state),
        })
    }

    /// Number of documents in `collection`.
    #[must_use]
    pub fn count(&self, collection: &str) -> usize {
        self.state
            .lock()
            .collections
            .get(collection)
            .map_or(0, |c| c.docs.len())
    }

    /// Names of the indexed fields of `collection`, sorted.
    #[must_use]
    pub fn indexes(&self, collection: &str) -> Vec<String> {
        let state = self.state.lock();
        let mut fields: Vec<String> = state
            .collections
            .get(collection)
            .map(|c| c.indexes.keys().cloned().collect())
            .unwrap_or_default();
        fields.sort();
        fields
    }
}

impl DocumentClient for EmbeddedDocumentDb {
    fn ensure_index(&self, collection: &str, field: &str, deadline: Deadline) -> LedgerResult<()> {
        let mut state = deadline.lock(&self.state, "ensure index")?;
        state.check_open()?;
        let exists = state
            .collections
            .get(collection)
            .is_some_and(|c| c.indexes.contains_key(field));
        if exists {
            return Ok(());
        }
        let mutation = Value::map(vec![
            (Value::text("op"), Value::text("index")),
            (Value::text("collection"), Value::text(collection)),
            (Value::text("field"), Value::text(field)),
        ]);
        log_mutation(state.log.as_mut(), &mutation)?;
        state.apply_index(collection, field);
        debug!(collection, field, "index created");
        Ok(())
    }

    fn insert(&self, collection: &str, doc: &Document, deadline: Deadline) -> LedgerResult<()> {
        let mut state = deadline.lock(&self.state, "insert")?;
        state.check_open()?;
        deadline.check("insert")?;
        let mutation = Value::map(vec![
            (Value::text("op"), Value::text("insert")),
            (Value::text("collection"), Value::text(collection)),
            (Value::text("doc"), doc.to_value()),
        ]);
        log_mutation(state.log.as_mut(), &mutation)?;
        state.apply_insert(collection, doc.clone());
        Ok(())
    }

    fn find(
        &self,
        collection: &str,
        query: &FindQuery,
        deadline: Deadline,
    ) -> LedgerResult<Vec<Document>> {
        let state = deadline.lock(&self.state, "find")?;
        state.check_open()?;
        Ok(state
            .collections
            .get(collection)
            .map(|c| c.find(query))
            .unwrap_or_default())
    }

    fn close(&self) -> LedgerResult<()> {
        let mut state = self.state.lock();
        state.closed = true;
        state.log = None;
        Ok(())
    }
}

impl fmt::Debug for EmbeddedDocumentDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("EmbeddedDocumentDb")
            .field("collections", &state.collections.len())
            .field("durable", &state.log.is_some())
            .field("closed", &state.closed)
            .finish()
    }
}
