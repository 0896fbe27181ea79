//! Chain backend over a document store.

use super::ChainBackend;
use crate::deadline::Deadline;
use crate::engine::{DocumentClient, Filter, FindQuery, SortOrder};
use crate::error::LedgerResult;
use crate::schema::{Record, Role, Schema};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Stores every record in one collection named after the record type,
/// forming a single global chain.
///
/// Indexes on the sort field and every `secondary_index` field are created
/// on first use. Reads page with a strict `sort < cursor` filter in
/// descending sort order.
pub struct DocumentAdapter<R> {
    client: Arc<dyn DocumentClient>,
    schema: Arc<Schema<R>>,
    owns_client: bool,
    indexed: AtomicBool,
}

impl<R: Record> DocumentAdapter<R> {
    /// Adapter over a client shared with other stores. [`ChainBackend::close`]
    /// leaves the client open.
    pub fn shared(client: Arc<dyn DocumentClient>, schema: Arc<Schema<R>>) -> Self {
        Self {
            client,
            schema,
            owns_client: false,
            indexed: AtomicBool::new(false),
        }
    }

    /// Adapter that closes its client when the store closes.
    pub fn owned(client: Arc<dyn DocumentClient>, schema: Arc<Schema<R>>) -> Self {
        Self {
            owns_client: true,
            ..Self::shared(client, schema)
        }
    }

    /// Fields that get an index: the sort field first, then secondary
    /// indexes in declaration order.
    fn indexed_fields(&self) -> Vec<&str> {
        let mut names = vec![self.schema.sort_field().name()];
        for field in self.schema.fields_with_role(Role::SecondaryIndex) {
            if !names.contains(&field.name()) {
                names.push(field.name());
            }
        }
        names
    }

    fn ensure_indexes(&self, deadline: Deadline) -> LedgerResult<()> {
        if self.indexed.load(Ordering::Acquire) {
            return Ok(());
        }
        let collection = self.schema.record_name();
        for field in self.indexed_fields() {
            self.client.ensure_index(collection, field, deadline)?;
        }
        self.indexed.store(true, Ordering::Release);
        debug!(collection, "indexes ensured");
        Ok(())
    }

    fn find(&self, limit: usize, cursor: Option<&R>, deadline: Deadline) -> LedgerResult<Vec<R>> {
        let sort = self.schema.sort_field();
        let mut query = FindQuery::new()
            .sort_by(sort.name(), SortOrder::Descending)
            .limit(limit);
        if let Some(cursor) = cursor {
            let bound = sort.get(cursor);
            if !bound.is_null() {
                query = query.filter(Filter::lt(sort.name(), bound));
            }
        }
        self.client
            .find(self.schema.record_name(), &query, deadline)?
            .iter()
            .map(|doc| self.schema.from_document(doc))
            .collect()
    }
}

impl<R: Record> ChainBackend<R> for DocumentAdapter<R> {
    fn chain_scope(&self, _record: &R) -> LedgerResult<Option<String>> {
        Ok(None)
    }

    fn tail(&self, _record: &R, deadline: Deadline) -> LedgerResult<Option<R>> {
        Ok(self.find(1, None, deadline)?.into_iter().next())
    }

    fn insert(&self, record: &R, deadline: Deadline) -> LedgerResult<()> {
        self.ensure_indexes(deadline)?;
        self.client.insert(
            self.schema.record_name(),
            &self.schema.to_document(record),
            deadline,
        )
    }

    fn query(&self, limit: usize, cursor: Option<&R>, deadline: Deadline) -> LedgerResult<Vec<R>> {
        self.find(limit, cursor, deadline)
    }

    fn close(&self) -> LedgerResult<()> {
        if self.owns_client {
            self.client.close()
        } else {
            Ok(())
        }
    }
}
