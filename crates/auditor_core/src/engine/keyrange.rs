//! Partitioned key-range driver boundary and embedded engine.

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

/// Table layout: a partition attribute and a sort attribute forming the
/// primary key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    /// Table name.
    pub name: String,
    /// Partition (hash) key attribute.
    pub partition_key: String,
    /// Sort (range) key attribute.
    pub sort_key: String,
}

/// Condition guarding a put.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutCondition {
    /// Overwrite any existing item.
    Always,
    /// Fail if an item with the same primary key exists.
    KeyNotExists,
}

/// A query over one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRangeQuery {
    /// Partition to read.
    pub partition: Value,
    /// Resume after this `(partition, sort)` key, exclusive.
    pub exclusive_start_key: Option<(Value, Value)>,
    /// Ascending sort order when true.
    pub scan_forward: bool,
    /// Maximum items returned (0 = no limit).
    pub limit: usize,
    /// Request read-your-writes consistency.
    pub consistent_read: bool,
}

impl KeyRangeQuery {
    /// Newest-first query over `partition`.
    #[must_use]
    pub fn newest_first(partition: Value) -> Self {
        Self {
            partition,
            exclusive_start_key: None,
            scan_forward: false,
            limit: 0,
            consistent_read: false,
        }
    }

    /// Resumes after `(partition, sort)`.
    #[must_use]
    pub fn start_after(mut self, sort: Value) -> Self {
        self.exclusive_start_key = Some((self.partition.clone(), sort));
        self
    }

    /// Caps the number of results.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Requests a strongly consistent read.
    #[must_use]
    pub const fn consistent(mut self) -> Self {
        self.consistent_read = true;
        self
    }
}

/// Operations the ledger needs from a partitioned key-range store.
pub trait KeyRangeClient: Send + Sync {
    /// Creates the table if absent. Idempotent for an identical spec.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a table of that name exists with a
    /// different key layout, or a backend error.
    fn create_table(&self, spec: &TableSpec, deadline: Deadline) -> LedgerResult<()>;

    /// Writes one item.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the condition fails, the item lacks a key
    /// attribute, or the table does not exist.
    fn put_item(
        &self,
        table: &str,
        item: &Document,
        condition: PutCondition,
        deadline: Deadline,
    ) -> LedgerResult<()>;

    /// Reads items of one partition in sort order.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the table does not exist or the start key
    /// names another partition.
    fn query(
        &self,
        table: &str,
        query: &KeyRangeQuery,
        deadline: Deadline,
    ) -> LedgerResult<Vec<Document>>;

    /// Ends the session. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns a backend error if shutdown fails.
    fn close(&self) -> LedgerResult<()>;
}

struct Table {
    spec: TableSpec,
    partitions: BTreeMap<OrderedValue, BTreeMap<OrderedValue, Document>>,
}

impl Table {
    fn key_of(&self, item: &Document) -> LedgerResult<(OrderedValue, OrderedValue)> {
        let attr = |name: &str| {
            item.get(name)
                .filter(|v| !v.is_null())
                .cloned()
                .map(OrderedValue)
                .ok_or_else(|| {
                    LedgerError::backend(format!(
                        "{}: item is missing key attribute '{name}'",
                        self.spec.name
                    ))
                })
        };
        Ok((attr(&self.spec.partition_key)?, attr(&self.spec.sort_key)?))
    }

    fn put(&mut self, item: Document, condition: PutCondition) -> LedgerResult<()> {
        let (partition, sort) = self.key_of(&item)?;
        let rows = self.partitions.entry(partition).or_default();
        if condition == PutCondition::KeyNotExists && rows.contains_key(&sort) {
            return Err(LedgerError::backend(format!(
                "{}: conditional check failed, key {} already exists",
                self.spec.name, sort.0
            )));
        }
        rows.insert(sort, item);
        Ok(())
    }

    fn query(&self, query: &KeyRangeQuery) -> LedgerResult<Vec<Document>> {
        let start = match &query.exclusive_start_key {
            Some((partition, sort)) => {
                if partition != &query.partition {
                    return Err(LedgerError::backend(format!(
                        "{}: exclusive start key is in partition {partition}, query is for {}",
                        self.spec.name, query.partition
                    )));
                }
                Some(OrderedValue(sort.clone()))
            }
            None => None,
        };
        let Some(rows) = self.partitions.get(&OrderedValue(query.partition.clone())) else {
            return Ok(Vec::new());
        };

        let limit = if query.limit == 0 {
            usize::MAX
        } else {
            query.limit
        };
        let items = if query.scan_forward {
            let lower = start.map_or(Bound::Unbounded, Bound::Excluded);
            rows.range((lower, Bound::Unbounded))
                .take(limit)
                .map(|(_, item)| item.clone())
                .collect()
        } else {
            let upper = start.map_or(Bound::Unbounded, Bound::Excluded);
            rows.range((Bound::Unbounded, upper))
                .rev()
                .take(limit)
                .map(|(_, item)| item.clone())
                .collect()
        };
        Ok(items)
    }
}

struct KeyRangeState {
    tables: HashMap<String, Table>,
    log: Option<FrameLog>,
    closed: bool,
}

impl KeyRangeState {
    fn check_open(&self) -> LedgerResult<()> {
        if self.closed {
            Err(LedgerError::backend("key-range session is closed"))
        } else {
            Ok(())
        }
    }

    fn table_mut(&mut self, name: &str) -> LedgerResult<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| LedgerError::backend(format!("table '{name}' does not exist")))
    }

    fn apply_create(&mut self, spec: TableSpec) -> LedgerResult<()> {
        match self.tables.get(&spec.name) {
            Some(existing) if existing.spec == spec => Ok(()),
            Some(existing) => Err(layout_mismatch(&existing.spec, &spec)),
            None => {
                self.tables.insert(
                    spec.name.clone(),
                    Table {
                        spec,
                        partitions: BTreeMap::new(),
                    },
                );
                Ok(())
            }
        }
    }
}

fn layout_mismatch(existing: &TableSpec, requested: &TableSpec) -> LedgerError {
    LedgerError::configuration(format!(
        "table '{}' exists with key ({}, {}), requested ({}, {})",
        existing.name,
        existing.partition_key,
        existing.sort_key,
        requested.partition_key,
        requested.sort_key
    ))
}

fn spec_to_value(spec: &TableSpec) -> Value {
    Value::map(vec![
        (Value::text("op"), Value::text("table")),
        (Value::text("table"), Value::text(spec.name.clone())),
        (Value::text("partition_key"), Value::text(spec.partition_key.clone())),
        (Value::text("sort_key"), Value::text(spec.sort_key.clone())),
    ])
}

/// An in-process partitioned key-range store.
///
/// Each table maps partition value to an ordered map of sort value to item.
/// Reads are always consistent. With a storage backend, table creation and
/// puts are appended to a frame log before they become visible.
pub struct EmbeddedKeyRangeDb {
    state: Mutex<KeyRangeState>,
}

impl EmbeddedKeyRangeDb {
    /// An empty, memory-only store.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            state: Mutex::new(KeyRangeState {
                tables: HashMap::new(),
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
        let mut state = KeyRangeState {
            tables: HashMap::new(),
            log: None,
            closed: false,
        };
        for frame in &frames {
            let (op, mutation) = decode_mutation(frame)?;
            let table = mutation_text(&mutation, "table")?;
            match op.as_str() {
                "table" => {
                    state.apply_create(TableSpec {
                        name: table,
                        partition_key: mutation_text(&mutation, "partition_key")?,
                        sort_key: mutation_text(&mutation, "sort_key")?,
                    })?;
                }
                "put" => {
                    let item = mutation
                        .get("item")
                        .cloned()
                        .ok_or_else(|| LedgerError::backend("logged put has no item"))?;
                    state
                        .table_mut(&table)?
                        .put(Document::from_value(item)?, PutCondition::Always)?;
                }
                other => {
                    return Err(LedgerError::backend(format!(
                        "unknown logged mutation '{other}'"
                    )))
                }
            }
        }
        debug!(mutations = frames.len(), "key-range store replayed");
        state.log = Some(log);
        Ok(Self {
            state: Mutex::new(state),
        })
    }

    /// Number of items in `table` across all partitions.
    #[must_use]
    pub fn count(&self, table: &str) -> usize {
        self.state
            .lock()
            .tables
            .get(table)
            .map_or(0, |t| t.partitions.values().map(BTreeMap::len).sum())
    }
}

impl KeyRangeClient for EmbeddedKeyRangeDb {
    fn create_table(&self, spec: &TableSpec, deadline: Deadline) -> LedgerResult<()> {
        let mut state = deadline.lock(&self.state, "create table")?;
        state.check_open()?;
        match state.tables.get(&spec.name) {
            Some(existing) if existing.spec == *spec => return Ok(()),
            Some(existing) => return Err(layout_mismatch(&existing.spec, spec)),
            None => {}
        }
        log_mutation(state.log.as_mut(), &spec_to_value(spec))?;
        state.apply_create(spec.clone())?;
        debug!(table = %spec.name, "table created");
        Ok(())
    }

    fn put_item(
        &self,
        table: &str,
        item: &Document,
        condition: PutCondition,
        deadline: Deadline,
    ) -> LedgerResult<()> {
        let mut state = deadline.lock(&self.state, "put item")?;
        state.check_open()?;
        deadline.check("put item")?;
        {
            let target = state.table_mut(table)?;
            let (partition, sort) = target.key_of(item)?;
            let exists = target
                .partitions
                .get(&partition)
                .is_some_and(|rows| rows.contains_key(&sort));
            if condition == PutCondition::KeyNotExists && exists {
                return Err(LedgerError::backend(format!(
                    "{table}: conditional check failed, key {} already exists",
                    sort.0
                )));
            }
        }
        let mutation = Value::map(vec![
            (Value::text("op"), Value::text("put")),
            (Value::text("table"), Value::text(table)),
            (Value::text("item"), item.to_value()),
        ]);
        log_mutation(state.log.as_mut(), &mutation)?;
        state.table_mut(table)?.put(item.clone(), condition)
    }

    fn query(
        &self,
        table: &str,
        query: &KeyRangeQuery,
        deadline: Deadline,
    ) -> LedgerResult<Vec<Document>> {
        let state = deadline.lock(&self.state, "query")?;
        state.check_open()?;
        let target = state
            .tables
            .get(table)
            .ok_or_else(|| LedgerError::backend(format!("table '{table}' does not exist")))?;
        target.query(query)
    }

    fn close(&self) -> LedgerResult<()> {
        let mut state = self.state.lock();
        state.closed = true;
        state.log = None;
        Ok(())
    }
}

impl fmt::Debug for EmbeddedKeyRangeDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("EmbeddedKeyRangeDb")
            .field("tables", &state.tables.len())
            .field("durable", &state.log.is_some())
            .field("closed", &state.closed)
            .finish()
    }
}
