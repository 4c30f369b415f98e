/// Integration tests for the complete partition table store
///
/// These exercise the public operations end to end against the in-memory
/// backend, plus scripted backends that control segment boundaries and
/// interleave competing writers.

use async_trait::async_trait;
use parking_lot::Mutex;
use partition_table_store::backend::{STATUS_CONFLICT, STATUS_NO_CONTENT};
use partition_table_store::{
    ContinuationToken, FieldValue, Filter, MemoryBackend, PartitionedTableStore, Record,
    ResultSegment, Table, TableBackend, TableStoreError,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

/// Serves a fixed list of segments, chaining them with tokens that carry
/// the index of the next segment.
struct ScriptedBackend {
    segments: Vec<Vec<Record>>,
    calls: Mutex<Vec<(String, Option<ContinuationToken>)>>,
}

impl ScriptedBackend {
    fn new(sizes: &[usize]) -> Self {
        let mut next = 0;
        let segments = sizes
            .iter()
            .map(|&size| {
                (0..size)
                    .map(|_| {
                        next += 1;
                        Record::new("p", format!("row-{:03}", next))
                    })
                    .collect()
            })
            .collect();

        Self::from_segments(segments)
    }

    fn from_segments(segments: Vec<Vec<Record>>) -> Self {
        Self {
            segments,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<(String, Option<ContinuationToken>)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl TableBackend for ScriptedBackend {
    async fn create_table_if_not_exists(&self, _name: &str) -> partition_table_store::Result<()> {
        Ok(())
    }

    async fn query_segment(
        &self,
        _table: &Table,
        filter: &Filter,
        continuation: Option<&ContinuationToken>,
    ) -> partition_table_store::Result<ResultSegment> {
        self.calls
            .lock()
            .push((filter.to_odata(), continuation.cloned()));

        let index = match continuation {
            Some(token) => token.next_row_key().parse::<usize>().unwrap(),
            None => 0,
        };
        let records = self.segments.get(index).cloned().unwrap_or_default();
        let continuation = if index + 1 < self.segments.len() {
            Some(ContinuationToken::new("segment", (index + 1).to_string()))
        } else {
            None
        };

        Ok(ResultSegment {
            records,
            continuation,
        })
    }

    async fn insert_entity(&self, _table: &Table, _record: &Record) -> partition_table_store::Result<u16> {
        Ok(STATUS_NO_CONTENT)
    }

    async fn delete_entity(&self, _table: &Table, _record: &Record) -> partition_table_store::Result<u16> {
        Ok(STATUS_NO_CONTENT)
    }
}

/// Removes the row itself right before forwarding a delete, as if another
/// caller won the race between lookup and delete.
struct RacingBackend {
    inner: Arc<MemoryBackend>,
}

#[async_trait]
impl TableBackend for RacingBackend {
    async fn create_table_if_not_exists(&self, name: &str) -> partition_table_store::Result<()> {
        self.inner.create_table_if_not_exists(name).await
    }

    async fn query_segment(
        &self,
        table: &Table,
        filter: &Filter,
        continuation: Option<&ContinuationToken>,
    ) -> partition_table_store::Result<ResultSegment> {
        self.inner.query_segment(table, filter, continuation).await
    }

    async fn insert_entity(&self, table: &Table, record: &Record) -> partition_table_store::Result<u16> {
        self.inner.insert_entity(table, record).await
    }

    async fn delete_entity(&self, table: &Table, record: &Record) -> partition_table_store::Result<u16> {
        assert_eq!(self.inner.delete_entity(table, record).await?, STATUS_NO_CONTENT);
        self.inner.delete_entity(table, record).await
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Expense {
    #[serde(rename = "PartitionKey")]
    account: String,
    #[serde(rename = "RowKey")]
    id: String,
    payee: String,
    amount: f64,
    tags: String,
}

fn expense(account: &str, id: &str, amount: f64) -> Expense {
    Expense {
        account: account.to_string(),
        id: id.to_string(),
        payee: "Corner Shop".to_string(),
        amount,
        tags: "food,weekly".to_string(),
    }
}

#[tokio::test]
async fn test_pagination_flattens_segments_in_order() {
    for sizes in [vec![5], vec![3, 3, 3], vec![1, 4, 2, 7], vec![2, 0, 3], vec![0, 0, 1]] {
        let total: usize = sizes.iter().sum();
        let store = PartitionedTableStore::new(ScriptedBackend::new(&sizes));
        let table = store.resolve("t").await.unwrap();

        let rows = store.query_all(&table, "p").await.unwrap();
        assert_eq!(rows.len(), total, "sizes {:?}", sizes);

        let keys: Vec<String> = rows.iter().map(|r| r.row_key().to_string()).collect();
        let expected: Vec<String> = (1..=total).map(|i| format!("row-{:03}", i)).collect();
        assert_eq!(keys, expected, "sizes {:?}", sizes);

        // One fetch per segment, each resuming from the previous token
        let calls = store.backend().calls();
        assert_eq!(calls.len(), sizes.len());
        assert!(calls[0].1.is_none());
        for (i, (filter, token)) in calls.iter().enumerate().skip(1) {
            assert_eq!(filter, "PartitionKey eq 'p'");
            assert_eq!(token.as_ref().unwrap().next_row_key(), i.to_string());
        }
    }
}

#[tokio::test]
async fn test_scans_are_independent() {
    let store = PartitionedTableStore::new(ScriptedBackend::new(&[2, 2]));
    let table = store.resolve("t").await.unwrap();

    let first = store.query_all(&table, "p").await.unwrap();
    let second = store.query_all(&table, "p").await.unwrap();
    assert_eq!(first, second);

    let calls = store.backend().calls();
    assert_eq!(calls.len(), 4);
    assert!(calls[2].1.is_none());
}

#[tokio::test]
async fn test_memory_pagination_matches_unpaged() {
    let paged = PartitionedTableStore::new(MemoryBackend::with_segment_size(7));
    let unpaged = PartitionedTableStore::new(MemoryBackend::new());

    for store in [&paged, &unpaged] {
        for i in 0..50 {
            let record = Record::new("acct", format!("{:05}", i)).with_field("n", i as i64);
            assert!(store.insert("ledger", &record).await.unwrap());
        }
    }

    let a = paged.get_all("ledger", "acct").await.unwrap();
    let b = unpaged.get_all("ledger", "acct").await.unwrap();
    assert_eq!(a.len(), 50);
    let keys_a: Vec<&str> = a.iter().map(|r| r.row_key()).collect();
    let keys_b: Vec<&str> = b.iter().map(|r| r.row_key()).collect();
    assert_eq!(keys_a, keys_b);
    assert_eq!(paged.backend().stats().segment_fetches, 8);
}

#[tokio::test]
async fn test_empty_partition() {
    let store = PartitionedTableStore::new(MemoryBackend::with_segment_size(2));
    assert!(store.insert("ledger", &Record::new("other", "1")).await.unwrap());

    let rows = assert_ok!(store.get_all("ledger", "nobody").await);
    assert!(rows.is_empty());

    let scripted = PartitionedTableStore::new(ScriptedBackend::new(&[0]));
    assert!(scripted.get_all("t", "p").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_insert_read_round_trip() {
    let store = PartitionedTableStore::new(MemoryBackend::new());
    let original = expense("checking", "e-17", 12.75);

    let record = Record::from_entity(&original).unwrap();
    assert!(store.insert("expenses", &record).await.unwrap());

    let row = store
        .get_one("expenses", "checking", "e-17")
        .await
        .unwrap()
        .expect("row should exist");
    assert_eq!(row.fields(), record.fields());
    assert!(row.etag().is_some());

    let back: Expense = row.to_entity().unwrap();
    assert_eq!(back, original);
}

#[tokio::test]
async fn test_duplicate_insert_conflicts() {
    let store = PartitionedTableStore::new(MemoryBackend::new());
    let record = Record::new("P", "R").with_field("payee", "first");

    assert!(store.insert("T", &record).await.unwrap());
    assert!(!store.insert("T", &record.clone().with_field("payee", "second")).await.unwrap());

    let table = store.resolve("T").await.unwrap();
    assert_eq!(
        store.backend().insert_entity(&table, &record).await.unwrap(),
        STATUS_CONFLICT
    );

    let row = store.get_one("T", "P", "R").await.unwrap().unwrap();
    assert_eq!(row.get("payee"), Some(&FieldValue::String("first".into())));
}

#[tokio::test]
async fn test_delete_idempotence() {
    let store = PartitionedTableStore::new(MemoryBackend::new());

    assert!(!store.delete("T", "P", "R").await.unwrap());

    assert!(store.insert("T", &Record::new("P", "R")).await.unwrap());
    assert!(store.delete("T", "P", "R").await.unwrap());
    assert!(store.get_one("T", "P", "R").await.unwrap().is_none());
    assert!(!store.delete("T", "P", "R").await.unwrap());

    // Lookup plus delete for the hit, lookup only for the misses
    assert_eq!(store.backend().stats().deletes, 1);
}

#[tokio::test]
async fn test_delete_after_reinsert() {
    let store = PartitionedTableStore::new(MemoryBackend::new());
    let record = Record::new("P", "R").with_field("v", 1);

    assert!(store.insert("T", &record).await.unwrap());
    assert!(store.delete("T", "P", "R").await.unwrap());
    assert!(store.insert("T", &record.clone().with_field("v", 2)).await.unwrap());

    let row = store.get_one("T", "P", "R").await.unwrap().unwrap();
    assert_eq!(row.get("v"), Some(&FieldValue::Int(2)));
}

#[tokio::test]
async fn test_composite_filter_requires_both_keys() {
    let store = PartitionedTableStore::new(MemoryBackend::with_segment_size(1));
    for (pk, rk) in [("A", "1"), ("A", "2"), ("B", "1"), ("B", "2")] {
        assert!(store.insert("T", &Record::new(pk, rk)).await.unwrap());
    }

    let row = store.get_one("T", "B", "1").await.unwrap().unwrap();
    assert_eq!((row.partition_key(), row.row_key()), ("B", "1"));

    assert!(store.get_one("T", "A", "3").await.unwrap().is_none());
    assert!(store.get_one("T", "C", "1").await.unwrap().is_none());

    assert!(store.delete("T", "A", "1").await.unwrap());
    let remaining: Vec<String> = store
        .get_all("T", "B")
        .await
        .unwrap()
        .iter()
        .map(|r| r.row_key().to_string())
        .collect();
    assert_eq!(remaining, vec!["1", "2"]);
}

#[tokio::test]
async fn test_ambiguous_key_fails_fast() {
    let backend = ScriptedBackend::from_segments(vec![
        vec![Record::new("p", "dup")],
        vec![Record::new("p", "dup")],
    ]);
    let store = PartitionedTableStore::new(backend);

    let err = assert_err!(store.get_one("t", "p", "dup").await);
    assert!(matches!(err, TableStoreError::AmbiguousKey { matches: 2, .. }));
    assert_eq!(
        store.backend().calls()[0].0,
        "(PartitionKey eq 'p') and (RowKey eq 'dup')"
    );
}

#[tokio::test]
async fn test_row_vanishing_before_delete_returns_false() {
    let inner = Arc::new(MemoryBackend::new());
    let store = PartitionedTableStore::new(RacingBackend {
        inner: Arc::clone(&inner),
    });

    assert!(store.insert("T", &Record::new("P", "R")).await.unwrap());
    assert!(!store.delete("T", "P", "R").await.unwrap());
    assert_eq!(inner.row_count("T"), 0);
}

#[tokio::test]
async fn test_unavailable_store_propagates() {
    let store = PartitionedTableStore::new(MemoryBackend::new());
    assert!(store.insert("T", &Record::new("P", "R")).await.unwrap());

    store.backend().set_offline(true);
    assert!(store.get_all("T", "P").await.unwrap_err().is_unavailable());
    assert!(store.get_one("T", "P", "R").await.unwrap_err().is_unavailable());
    assert!(store.insert("T", &Record::new("P", "S")).await.unwrap_err().is_unavailable());
    assert!(store.delete("T", "P", "R").await.unwrap_err().is_unavailable());

    store.backend().set_offline(false);
    assert_eq!(store.get_all("T", "P").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_unsanitized_keys_are_caller_responsibility() {
    let store = PartitionedTableStore::new(MemoryBackend::new());
    let raw = "bob@example.com/savings?x";

    // Reads do not sanitize on the caller's behalf
    let err = assert_err!(store.get_all("T", raw).await);
    assert!(matches!(err, TableStoreError::MalformedFilter { .. }));
    assert!(!store.insert("T", &Record::new(raw, "1")).await.unwrap());

    let key = store.sanitize_key(raw);
    assert_eq!(key, "bob@example.comsavingsx");
    assert!(store.insert("T", &Record::new(key.as_str(), "1")).await.unwrap());
    assert_eq!(store.get_all("T", &key).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_concurrent_conflicting_inserts() {
    use tokio::task;

    let store = Arc::new(PartitionedTableStore::new(MemoryBackend::new()));
    let mut handles = vec![];

    for i in 0..10 {
        let store_clone = Arc::clone(&store);
        handles.push(task::spawn(async move {
            let record = Record::new("P", "contested").with_field("writer", i);
            store_clone.insert("T", &record).await.unwrap()
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }

    assert_eq!(winners, 1);
    assert_eq!(store.get_all("T", "P").await.unwrap().len(), 1);
}
