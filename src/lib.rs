/// Partition Table Store - access layer over a partitioned key-value table service
///
/// Exposes insert, delete, fetch-all-in-partition and fetch-by-key over a
/// store that pages query results with continuation tokens.
///
/// Architecture:
/// 1. TableBackend: the four store round trips (create table, query segment, insert, delete)
/// 2. MemoryBackend / AzureTableBackend: in-process and Azure Table Storage backends
/// 3. PartitionScan: walks query segments sequentially into one ordered result
/// 4. PartitionedTableStore: table resolution, reads, insert and lookup-then-delete

pub mod error;
pub mod config;
pub mod record;
pub mod sanitize;
pub mod filter;
pub mod backend;
pub mod memory;
#[cfg(feature = "azure")]
pub mod azure;
pub mod store;

pub use backend::{ContinuationToken, ResultSegment, Table, TableBackend};
pub use config::{StorageAccount, StoreConfig};
pub use error::{Result, TableStoreError};
pub use filter::{Filter, KeyField};
pub use memory::{MemoryBackend, MemoryBackendStats};
pub use record::{FieldValue, Record};
pub use sanitize::sanitize_key;
pub use store::{PartitionScan, PartitionedTableStore};

#[cfg(feature = "azure")]
pub use azure::AzureTableBackend;
