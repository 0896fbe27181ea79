//! Chain backend over a partitioned key-range store.

use super::ChainBackend;
use crate::deadline::Deadline;
use crate::engine::{KeyRangeClient, KeyRangeQuery, PutCondition, TableSpec};
use crate::error::{LedgerError, LedgerResult};
use crate::schema::{Record, Schema};
use auditor_codec::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Stores records in a table keyed by `(partition, sort)`, with one chain
/// per partition value.
pub struct KeyRangeAdapter<R> {
    client: Arc<dyn KeyRangeClient>,
    schema: Arc<Schema<R>>,
    table: TableSpec,
    owns_client: bool,
    created: AtomicBool,
}

impl<R: Record> KeyRangeAdapter<R> {
    /// Adapter over a client shared with other stores.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the schema has no partition key.
    pub fn shared(client: Arc<dyn KeyRangeClient>, schema: Arc<Schema<R>>) -> LedgerResult<Self> {
        let table = TableSpec {
            name: schema.record_name().to_string(),
            partition_key: schema.require_partition()?.name().to_string(),
            sort_key: schema.sort_field().name().to_string(),
        };
        Ok(Self {
            client,
            schema,
            table,
            owns_client: false,
            created: AtomicBool::new(false),
        })
    }

    /// Adapter that closes its client when the store closes.
    ///
    /// # Errors
    ///
    /// Same as [`KeyRangeAdapter::shared`].
    pub fn owned(client: Arc<dyn KeyRangeClient>, schema: Arc<Schema<R>>) -> LedgerResult<Self> {
        Ok(Self {
            owns_client: true,
            ..Self::shared(client, schema)?
        })
    }

    /// Table layout used by this adapter.
    #[must_use]
    pub fn table(&self) -> &TableSpec {
        &self.table
    }

    fn ensure_table(&self, deadline: Deadline) -> LedgerResult<()> {
        if self.created.load(Ordering::Acquire) {
            return Ok(());
        }
        self.client.create_table(&self.table, deadline)?;
        self.created.store(true, Ordering::Release);
        debug!(table = %self.table.name, "table ensured");
        Ok(())
    }

    /// The record's partition value. Null and empty text count as absent.
    fn partition_of(&self, record: &R) -> LedgerResult<Value> {
        let value = self
            .schema
            .field(&self.table.partition_key)
            .map(|f| f.get(record))
            .unwrap_or(Value::Null);
        if value.is_null() || value.as_text() == Some("") {
            Err(LedgerError::MissingPartition {
                field: self.table.partition_key.clone(),
            })
        } else {
            Ok(value)
        }
    }

    fn run(&self, query: &KeyRangeQuery, deadline: Deadline) -> LedgerResult<Vec<R>> {
        self.ensure_table(deadline)?;
        self.client
            .query(&self.table.name, query, deadline)?
            .iter()
            .map(|item| self.schema.from_document(item))
            .collect()
    }
}

impl<R: Record> ChainBackend<R> for KeyRangeAdapter<R> {
    fn chain_scope(&self, record: &R) -> LedgerResult<Option<String>> {
        self.partition_of(record).map(|p| Some(p.to_string()))
    }

    fn tail(&self, record: &R, deadline: Deadline) -> LedgerResult<Option<R>> {
        let query = KeyRangeQuery::newest_first(self.partition_of(record)?)
            .limit(1)
            .consistent();
        Ok(self.run(&query, deadline)?.into_iter().next())
    }

    fn insert(&self, record: &R, deadline: Deadline) -> LedgerResult<()> {
        self.ensure_table(deadline)?;
        self.client.put_item(
            &self.table.name,
            &self.schema.to_document(record),
            PutCondition::KeyNotExists,
            deadline,
        )
    }

    fn query(&self, limit: usize, cursor: Option<&R>, deadline: Deadline) -> LedgerResult<Vec<R>> {
        let cursor = cursor.ok_or_else(|| LedgerError::MissingPartition {
            field: self.table.partition_key.clone(),
        })?;
        let mut query = KeyRangeQuery::newest_first(self.partition_of(cursor)?).limit(limit);
        let bound = self.schema.sort_field().get(cursor);
        if !bound.is_null() {
            query = query.start_after(bound);
        }
        self.run(&query, deadline)
    }

    fn close(&self) -> LedgerResult<()> {
        if self.owns_client {
            self.client.close()
        } else {
            Ok(())
        }
    }
}
