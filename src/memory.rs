/// MemoryBackend: in-process partitioned table store
///
/// Behaves like the remote table service as far as this crate can observe:
/// rows are ordered by (PartitionKey, RowKey), queries return bounded
/// segments chained by continuation tokens, inserts conflict on duplicate
/// keys, deletes are guarded by etags, and illegal key characters are
/// rejected. Used by tests and the local demo.

use crate::backend::{
    ContinuationToken, ResultSegment, Table, TableBackend, STATUS_BAD_REQUEST, STATUS_CONFLICT,
    STATUS_NOT_FOUND, STATUS_NO_CONTENT, STATUS_PRECONDITION_FAILED,
};
use crate::config::DEFAULT_SEGMENT_SIZE;
use crate::error::{Result, TableStoreError};
use crate::filter::Filter;
use crate::record::Record;
use crate::sanitize::is_valid_key;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

type EntityKey = (String, String);

pub struct MemoryBackend {
    tables: DashMap<String, BTreeMap<EntityKey, Record>>,
    segment_size: usize,
    next_etag: RwLock<u64>,
    stats: RwLock<MemoryBackendStats>,
    offline: AtomicBool,
}

/// Round trips served, per primitive
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryBackendStats {
    pub tables_created: usize,
    pub segment_fetches: usize,
    pub inserts: usize,
    pub deletes: usize,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_segment_size(DEFAULT_SEGMENT_SIZE)
    }

    /// A backend returning at most `segment_size` rows per query segment
    pub fn with_segment_size(segment_size: usize) -> Self {
        Self {
            tables: DashMap::new(),
            segment_size: segment_size.max(1),
            next_etag: RwLock::new(0),
            stats: RwLock::new(MemoryBackendStats::default()),
            offline: AtomicBool::new(false),
        }
    }

    pub fn segment_size(&self) -> usize {
        self.segment_size
    }

    /// Simulate the store becoming unreachable (or reachable again)
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn stats(&self) -> MemoryBackendStats {
        self.stats.read().clone()
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Number of rows in a table, 0 if the table does not exist
    pub fn row_count(&self, name: &str) -> usize {
        self.tables.get(name).map(|t| t.len()).unwrap_or(0)
    }

    fn ensure_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(TableStoreError::unavailable("memory backend is offline"));
        }
        Ok(())
    }

    fn issue_etag(&self) -> String {
        let mut next = self.next_etag.write();
        *next += 1;
        format!("W/\"{}\"", *next)
    }
}

#[async_trait]
impl TableBackend for MemoryBackend {
    async fn create_table_if_not_exists(&self, name: &str) -> Result<()> {
        self.ensure_online()?;

        if !self.tables.contains_key(name) {
            self.tables.entry(name.to_string()).or_default();
            self.stats.write().tables_created += 1;
            debug!("Memory backend created table {}", name);
        }
        Ok(())
    }

    async fn query_segment(
        &self,
        table: &Table,
        filter: &Filter,
        continuation: Option<&ContinuationToken>,
    ) -> Result<ResultSegment> {
        self.ensure_online()?;
        self.stats.write().segment_fetches += 1;

        if !filter.has_valid_keys() {
            return Err(TableStoreError::MalformedFilter {
                filter: filter.to_odata(),
            });
        }

        let rows = self
            .tables
            .get(table.name())
            .ok_or_else(|| TableStoreError::unavailable(format!("table {} does not exist", table.name())))?;

        let start = continuation
            .map(|c| (c.next_partition_key().to_string(), c.next_row_key().to_string()))
            .unwrap_or_default();

        let mut matching = rows.range(start..).map(|(_, r)| r).filter(|r| filter.matches(r));

        let records: Vec<Record> = matching.by_ref().take(self.segment_size).cloned().collect();
        let continuation = matching
            .next()
            .map(|next| ContinuationToken::new(next.partition_key(), next.row_key()));

        debug!(
            "Memory backend served {} rows from {} (more: {})",
            records.len(),
            table.name(),
            continuation.is_some()
        );

        Ok(ResultSegment {
            records,
            continuation,
        })
    }

    async fn insert_entity(&self, table: &Table, record: &Record) -> Result<u16> {
        self.ensure_online()?;
        self.stats.write().inserts += 1;

        if !is_valid_key(record.partition_key()) || !is_valid_key(record.row_key()) {
            return Ok(STATUS_BAD_REQUEST);
        }

        let Some(mut rows) = self.tables.get_mut(table.name()) else {
            return Ok(STATUS_NOT_FOUND);
        };

        let key = (record.partition_key().to_string(), record.row_key().to_string());
        if rows.contains_key(&key) {
            return Ok(STATUS_CONFLICT);
        }

        let stored = record.clone().with_etag(self.issue_etag());
        rows.insert(key, stored);
        Ok(STATUS_NO_CONTENT)
    }

    async fn delete_entity(&self, table: &Table, record: &Record) -> Result<u16> {
        self.ensure_online()?;
        self.stats.write().deletes += 1;

        let Some(mut rows) = self.tables.get_mut(table.name()) else {
            return Ok(STATUS_NOT_FOUND);
        };

        let key = (record.partition_key().to_string(), record.row_key().to_string());
        let Some(existing) = rows.get(&key) else {
            return Ok(STATUS_NOT_FOUND);
        };

        if let Some(etag) = record.etag() {
            if existing.etag() != Some(etag) {
                return Ok(STATUS_PRECONDITION_FAILED);
            }
        }

        rows.remove(&key);
        Ok(STATUS_NO_CONTENT)
    }
}
