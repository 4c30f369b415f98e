/// Backend: the store primitives this crate consumes
///
/// A backend speaks to one partitioned table service. It only has to offer
/// four round trips: create-table-if-absent, one filtered query segment,
/// insert-entity and delete-entity-by-handle. Everything else (segment
/// walking, lookup-then-delete) is composed on top in `store`.

use crate::error::Result;
use crate::filter::Filter;
use crate::record::Record;
use async_trait::async_trait;
use std::sync::Arc;

/// Handle to a table known to exist in the backing store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    name: String,
}

impl Table {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Opaque store cursor: where the next segment of a query starts.
/// How the key pair is interpreted is up to the backend that issued it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationToken {
    next_partition_key: String,
    next_row_key: String,
}

impl ContinuationToken {
    pub fn new(next_partition_key: impl Into<String>, next_row_key: impl Into<String>) -> Self {
        Self {
            next_partition_key: next_partition_key.into(),
            next_row_key: next_row_key.into(),
        }
    }

    pub fn next_partition_key(&self) -> &str {
        &self.next_partition_key
    }

    pub fn next_row_key(&self) -> &str {
        &self.next_row_key
    }
}

/// One page of query results. `continuation == None` marks the last page.
#[derive(Debug, Clone, Default)]
pub struct ResultSegment {
    pub records: Vec<Record>,
    pub continuation: Option<ContinuationToken>,
}

impl ResultSegment {
    pub fn last(records: Vec<Record>) -> Self {
        Self {
            records,
            continuation: None,
        }
    }

    pub fn is_last(&self) -> bool {
        self.continuation.is_none()
    }
}

pub const STATUS_NO_CONTENT: u16 = 204;
pub const STATUS_BAD_REQUEST: u16 = 400;
pub const STATUS_NOT_FOUND: u16 = 404;
pub const STATUS_CONFLICT: u16 = 409;
pub const STATUS_PRECONDITION_FAILED: u16 = 412;

pub fn is_success_status(status: u16) -> bool {
    (200..=299).contains(&status)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    Insert,
    Delete,
}

/// Statuses a mutation reports as an ordinary outcome rather than a failure:
/// conflict or illegal key on insert, row gone or replaced on delete.
/// Anything else (auth, throttling, server errors) is `None`.
pub fn outcome_status(op: Mutation, status: u16) -> Option<u16> {
    match (op, status) {
        (_, s) if is_success_status(s) => Some(s),
        (Mutation::Insert, STATUS_CONFLICT | STATUS_BAD_REQUEST) => Some(status),
        (Mutation::Delete, STATUS_NOT_FOUND | STATUS_PRECONDITION_FAILED) => Some(status),
        _ => None,
    }
}

#[async_trait]
pub trait TableBackend: Send + Sync {
    /// Create the table unless it already exists. Existing tables are not an error.
    async fn create_table_if_not_exists(&self, name: &str) -> Result<()>;

    /// Execute `filter` and return one segment, starting at `continuation`
    /// when resuming a previous segment.
    async fn query_segment(
        &self,
        table: &Table,
        filter: &Filter,
        continuation: Option<&ContinuationToken>,
    ) -> Result<ResultSegment>;

    /// Insert a new entity and return the store's status code (409 on conflict).
    /// Only transport failures are errors.
    async fn insert_entity(&self, table: &Table, record: &Record) -> Result<u16>;

    /// Delete the entity identified by a handle previously read from the store.
    /// The record's etag, when present, guards the delete.
    async fn delete_entity(&self, table: &Table, record: &Record) -> Result<u16>;
}

#[async_trait]
impl<T: TableBackend + ?Sized> TableBackend for Arc<T> {
    async fn create_table_if_not_exists(&self, name: &str) -> Result<()> {
        (**self).create_table_if_not_exists(name).await
    }

    async fn query_segment(
        &self,
        table: &Table,
        filter: &Filter,
        continuation: Option<&ContinuationToken>,
    ) -> Result<ResultSegment> {
        (**self).query_segment(table, filter, continuation).await
    }

    async fn insert_entity(&self, table: &Table, record: &Record) -> Result<u16> {
        (**self).insert_entity(table, record).await
    }

    async fn delete_entity(&self, table: &Table, record: &Record) -> Result<u16> {
        (**self).delete_entity(table, record).await
    }
}
