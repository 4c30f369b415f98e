/// PartitionedTableStore: the access layer callers use
///
/// Composes the backend primitives into the operations an API layer needs:
/// - resolve: get-or-create a table by name
/// - query_all / query_one: walk every result segment of an equality query
/// - insert: single-row create, conflict reported as `false`
/// - delete: lookup by (PartitionKey, RowKey), then delete by handle
///
/// Nothing is cached between calls. Presence outcomes (inserted or
/// conflicted, found or absent) are plain return values; only transport
/// failures come back as errors.

use crate::backend::{is_success_status, ContinuationToken, Table, TableBackend};
use crate::error::{Result, TableStoreError};
use crate::filter::Filter;
use crate::record::Record;
use crate::sanitize;
use futures::stream::{self, Stream, TryStreamExt};
use tracing::{debug, info, warn};

pub struct PartitionedTableStore<B> {
    backend: B,
}

impl<B: TableBackend> PartitionedTableStore<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Strip characters the store rejects in key fields.
    ///
    /// Never applied implicitly: callers passing user-controlled identifiers
    /// as keys must sanitize them first.
    pub fn sanitize_key(&self, raw: &str) -> String {
        sanitize::sanitize_key(raw)
    }

    /// Get a handle to `name`, creating the table if it does not exist
    pub async fn resolve(&self, name: &str) -> Result<Table> {
        self.backend.create_table_if_not_exists(name).await?;
        debug!("Resolved table {}", name);
        Ok(Table::new(name))
    }

    /// Start a sequential walk over the results of `filter`
    pub fn scan(&self, table: &Table, filter: Filter) -> PartitionScan<'_, B> {
        PartitionScan::new(&self.backend, table.clone(), filter)
    }

    /// All rows of a partition, in store order
    pub async fn query_all(&self, table: &Table, partition_key: &str) -> Result<Vec<Record>> {
        let records = self
            .scan(table, Filter::partition(partition_key))
            .collect_all()
            .await?;

        debug!(
            "QUERY: {} rows in partition {} of {}",
            records.len(),
            partition_key,
            table.name()
        );
        Ok(records)
    }

    /// The row with this (PartitionKey, RowKey), if any.
    ///
    /// Relies on the pair being unique within the table. If the store
    /// returns more than one row this fails with `AmbiguousKey`.
    pub async fn query_one(
        &self,
        table: &Table,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<Record>> {
        let mut records = self
            .scan(table, Filter::key(partition_key, row_key))
            .collect_all()
            .await?;

        match records.len() {
            0 => Ok(None),
            1 => Ok(records.pop()),
            matches => {
                warn!(
                    "QUERY: key ({}, {}) matched {} rows in {}",
                    partition_key,
                    row_key,
                    matches,
                    table.name()
                );
                Err(TableStoreError::AmbiguousKey {
                    partition_key: partition_key.to_string(),
                    row_key: row_key.to_string(),
                    matches,
                })
            }
        }
    }

    /// Insert into an already resolved table. `false` when the store refuses
    /// the row, e.g. a row with the same keys exists.
    pub async fn insert_record(&self, table: &Table, record: &Record) -> Result<bool> {
        let status = self.backend.insert_entity(table, record).await?;

        if is_success_status(status) {
            info!(
                "INSERT: ({}, {}) into {}",
                record.partition_key(),
                record.row_key(),
                table.name()
            );
            Ok(true)
        } else {
            warn!(
                "INSERT: ({}, {}) into {} refused with status {}",
                record.partition_key(),
                record.row_key(),
                table.name(),
                status
            );
            Ok(false)
        }
    }

    pub async fn get_all(&self, table_name: &str, partition_key: &str) -> Result<Vec<Record>> {
        let table = self.resolve(table_name).await?;
        self.query_all(&table, partition_key).await
    }

    pub async fn get_one(
        &self,
        table_name: &str,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<Record>> {
        let table = self.resolve(table_name).await?;
        self.query_one(&table, partition_key, row_key).await
    }

    pub async fn insert(&self, table_name: &str, record: &Record) -> Result<bool> {
        let table = self.resolve(table_name).await?;
        self.insert_record(&table, record).await
    }

    /// Delete the row with this (PartitionKey, RowKey).
    ///
    /// The store deletes by entity handle, so the row is looked up first and
    /// the handle read back is deleted. The two steps are not atomic: if
    /// another caller removes the row in between, the delete is refused by
    /// the store and this returns `false`. An absent row also returns `false`.
    pub async fn delete(&self, table_name: &str, partition_key: &str, row_key: &str) -> Result<bool> {
        let table = self.resolve(table_name).await?;

        let Some(record) = self.query_one(&table, partition_key, row_key).await? else {
            debug!(
                "DELETE: ({}, {}) not found in {}",
                partition_key, row_key, table_name
            );
            return Ok(false);
        };

        let status = self.backend.delete_entity(&table, &record).await?;
        if is_success_status(status) {
            info!("DELETE: ({}, {}) from {}", partition_key, row_key, table_name);
            Ok(true)
        } else {
            warn!(
                "DELETE: ({}, {}) from {} refused with status {}, row changed since lookup",
                partition_key, row_key, table_name, status
            );
            Ok(false)
        }
    }
}

enum ScanState {
    Start,
    Resume(ContinuationToken),
    Done,
}

/// A sequential walk over every segment of one query.
///
/// Each segment is fetched only after the previous one's continuation token
/// is known. The walk ends when the store returns a segment without a token;
/// a store that never does so is walked forever. Scans are not shared:
/// starting over means creating a new scan.
pub struct PartitionScan<'a, B: ?Sized> {
    backend: &'a B,
    table: Table,
    filter: Filter,
    state: ScanState,
    segments_fetched: usize,
}

impl<'a, B: TableBackend + ?Sized> PartitionScan<'a, B> {
    pub fn new(backend: &'a B, table: Table, filter: Filter) -> Self {
        Self {
            backend,
            table,
            filter,
            state: ScanState::Start,
            segments_fetched: 0,
        }
    }

    pub fn segments_fetched(&self) -> usize {
        self.segments_fetched
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, ScanState::Done)
    }

    /// Fetch the next segment, `None` once the last one has been returned
    pub async fn next_segment(&mut self) -> Result<Option<Vec<Record>>> {
        let continuation = match &self.state {
            ScanState::Done => return Ok(None),
            ScanState::Start => None,
            ScanState::Resume(token) => Some(token.clone()),
        };

        let segment = self
            .backend
            .query_segment(&self.table, &self.filter, continuation.as_ref())
            .await?;
        self.segments_fetched += 1;

        debug!(
            "Segment {} of {} on {}: {} rows",
            self.segments_fetched,
            self.filter,
            self.table.name(),
            segment.records.len()
        );

        self.state = match segment.continuation {
            Some(token) => ScanState::Resume(token),
            None => ScanState::Done,
        };
        Ok(Some(segment.records))
    }

    /// Drive the scan to the end, concatenating segments in order
    pub async fn collect_all(mut self) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        while let Some(segment) = self.next_segment().await? {
            records.extend(segment);
        }
        Ok(records)
    }

    /// The scan as a stream of rows; segments are still fetched one at a time
    pub fn into_stream(self) -> impl Stream<Item = Result<Record>> + 'a {
        stream::try_unfold(self, |mut scan| async move {
            let segment = scan.next_segment().await?;
            Ok::<_, TableStoreError>(segment.map(|records| {
                let rows = stream::iter(records.into_iter().map(Ok::<Record, TableStoreError>));
                (rows, scan)
            }))
        })
        .try_flatten()
    }
}
