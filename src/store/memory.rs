//! In-process adapters for embedding and tests

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use super::{SummaryStore, TransactionFilter, TransactionSource};
use crate::services::day::DateWindow;
use crate::types::{DailySummary, LedgerdayError, ObjectId, Result, Transaction};

/// Transaction collection held in memory
#[derive(Debug, Default)]
pub struct MemoryTransactionSource {
    rows: RwLock<Vec<Transaction>>,
}

impl MemoryTransactionSource {
    pub fn new(rows: Vec<Transaction>) -> Self {
        Self {
            rows: RwLock::new(rows),
        }
    }

    pub async fn push(&self, tx: Transaction) {
        self.rows.write().await.push(tx);
    }

    pub async fn extend(&self, txs: impl IntoIterator<Item = Transaction>) {
        self.rows.write().await.extend(txs);
    }
}

#[async_trait]
impl TransactionSource for MemoryTransactionSource {
    async fn distinct_user_ids(&self, window: DateWindow) -> Result<Vec<serde_json::Value>> {
        let rows = self.rows.read().await;
        let mut seen: HashSet<ObjectId> = HashSet::new();
        let mut ids = Vec::new();
        for tx in rows.iter() {
            if tx.is_deleted() || !window.contains(tx.date) {
                continue;
            }
            if seen.insert(tx.user_id) {
                ids.push(serde_json::Value::String(tx.user_id.to_hex()));
            }
        }
        Ok(ids)
    }

    async fn find(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
        let rows = self.rows.read().await;
        Ok(rows.iter().filter(|tx| filter.matches(tx)).cloned().collect())
    }
}

/// Summary collection held in memory, keyed by its unique index
#[derive(Debug, Default)]
pub struct MemorySummaryStore {
    docs: RwLock<BTreeMap<(ObjectId, DateTime<Utc>), DailySummary>>,
    indexed: AtomicBool,
}

impl MemorySummaryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored summary, ordered by (user, date)
    pub async fn all(&self) -> Vec<DailySummary> {
        self.docs.read().await.values().cloned().collect()
    }

    pub async fn get(&self, user_id: ObjectId, day: DateTime<Utc>) -> Option<DailySummary> {
        self.docs.read().await.get(&(user_id, day)).cloned()
    }

    pub async fn len(&self) -> usize {
        self.docs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.docs.read().await.is_empty()
    }

    /// Whether `ensure_indexes` has run against this store
    pub fn is_indexed(&self) -> bool {
        self.indexed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SummaryStore for MemorySummaryStore {
    async fn insert_many(&self, docs: Vec<DailySummary>) -> Result<()> {
        let mut stored = self.docs.write().await;

        // validate the whole batch first so a conflict writes nothing
        let mut incoming: HashSet<(ObjectId, DateTime<Utc>)> = HashSet::new();
        for doc in &docs {
            let key = doc.key();
            if stored.contains_key(&key) || !incoming.insert(key) {
                return Err(LedgerdayError::DuplicateSummary {
                    user_id: doc.user_id,
                    date: doc.date,
                });
            }
        }

        for doc in docs {
            stored.insert(doc.key(), doc);
        }
        Ok(())
    }

    async fn delete_many_from(&self, start: DateTime<Utc>) -> Result<u64> {
        let mut stored = self.docs.write().await;
        let before = stored.len();
        stored.retain(|(_, date), _| *date < start);
        Ok((before - stored.len()) as u64)
    }

    async fn delete_one(&self, user_id: ObjectId, day: DateTime<Utc>) -> Result<bool> {
        Ok(self.docs.write().await.remove(&(user_id, day)).is_some())
    }

    async fn find_range(&self, user_id: ObjectId, window: DateWindow) -> Result<Vec<DailySummary>> {
        if window.is_empty() {
            return Ok(Vec::new());
        }
        let stored = self.docs.read().await;
        Ok(stored
            .range((user_id, window.start)..(user_id, window.end))
            .map(|(_, doc)| doc.clone())
            .collect())
    }

    async fn ensure_indexes(&self) -> Result<()> {
        self.indexed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransactionType;
    use chrono::TimeZone;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, d, 0, 0, 0).unwrap()
    }

    fn make_summary(user: u8, d: u32, income: f64) -> DailySummary {
        DailySummary {
            id: ObjectId::new(),
            user_id: ObjectId::from_bytes([user; 12]),
            date: day(d),
            total_income: income,
            total_expense: 0.0,
            category_breakdown: Vec::new(),
            pocket_breakdown: Vec::new(),
            platform_breakdown: Vec::new(),
            created_at: Utc::now(),
        }
    }

    fn make_tx(user: u8, d: u32, deleted: bool) -> Transaction {
        Transaction {
            id: None,
            user_id: ObjectId::from_bytes([user; 12]),
            kind: TransactionType::Income,
            amount: 1.0,
            date: day(d) + chrono::Duration::hours(6),
            category_id: None,
            pocket_from_id: None,
            pocket_to_id: None,
            platform_from_id: None,
            platform_to_id: None,
            deleted_at: deleted.then(Utc::now),
        }
    }

    #[tokio::test]
    async fn test_insert_rejects_existing_key_and_writes_nothing() {
        let store = MemorySummaryStore::new();
        store.insert_many(vec![make_summary(1, 10, 1.0)]).await.unwrap();

        let err = store
            .insert_many(vec![make_summary(1, 11, 2.0), make_summary(1, 10, 3.0)])
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerdayError::DuplicateSummary { .. }));
        assert_eq!(store.len().await, 1);
        assert!(store.get(ObjectId::from_bytes([1; 12]), day(11)).await.is_none());
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_within_batch() {
        let store = MemorySummaryStore::new();
        let err = store
            .insert_many(vec![make_summary(1, 10, 1.0), make_summary(1, 10, 2.0)])
            .await
            .unwrap_err();
        assert!(err.is_write_failure());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_delete_many_from_spans_users() {
        let store = MemorySummaryStore::new();
        store
            .insert_many(vec![
                make_summary(1, 9, 1.0),
                make_summary(1, 10, 1.0),
                make_summary(2, 11, 1.0),
            ])
            .await
            .unwrap();

        let removed = store.delete_many_from(day(10)).await.unwrap();

        assert_eq!(removed, 2);
        let left = store.all().await;
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].date, day(9));
    }

    #[tokio::test]
    async fn test_delete_one() {
        let store = MemorySummaryStore::new();
        store.insert_many(vec![make_summary(1, 10, 1.0)]).await.unwrap();

        let user = ObjectId::from_bytes([1; 12]);
        assert!(store.delete_one(user, day(10)).await.unwrap());
        assert!(!store.delete_one(user, day(10)).await.unwrap());
    }

    #[tokio::test]
    async fn test_find_range_ascending_and_scoped_to_user() {
        let store = MemorySummaryStore::new();
        store
            .insert_many(vec![
                make_summary(1, 12, 3.0),
                make_summary(1, 10, 1.0),
                make_summary(2, 11, 9.0),
                make_summary(1, 11, 2.0),
                make_summary(1, 13, 4.0),
            ])
            .await
            .unwrap();

        let found = store
            .find_range(ObjectId::from_bytes([1; 12]), DateWindow::new(day(10), day(13)))
            .await
            .unwrap();

        let dates: Vec<_> = found.iter().map(|s| s.date).collect();
        assert_eq!(dates, vec![day(10), day(11), day(12)]);
    }

    #[tokio::test]
    async fn test_find_range_empty_window() {
        let store = MemorySummaryStore::new();
        store.insert_many(vec![make_summary(1, 10, 1.0)]).await.unwrap();
        let found = store
            .find_range(ObjectId::from_bytes([1; 12]), DateWindow::new(day(12), day(10)))
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_ensure_indexes_is_idempotent() {
        let store = MemorySummaryStore::new();
        assert!(!store.is_indexed());
        store.ensure_indexes().await.unwrap();
        store.ensure_indexes().await.unwrap();
        assert!(store.is_indexed());
    }

    #[tokio::test]
    async fn test_source_distinct_skips_deleted_and_out_of_window() {
        let source = MemoryTransactionSource::new(vec![
            make_tx(1, 10, false),
            make_tx(1, 11, false),
            make_tx(2, 10, true),
            make_tx(3, 20, false),
        ]);

        let ids = source
            .distinct_user_ids(DateWindow::new(day(10), day(12)))
            .await
            .unwrap();

        assert_eq!(ids, vec![serde_json::json!(ObjectId::from_bytes([1; 12]).to_hex())]);
    }

    #[tokio::test]
    async fn test_source_find_applies_filter() {
        let source = MemoryTransactionSource::default();
        source
            .extend(vec![make_tx(1, 10, false), make_tx(2, 10, false), make_tx(1, 10, true)])
            .await;
        source.push(make_tx(1, 15, false)).await;

        let filter = TransactionFilter::new(
            vec![ObjectId::from_bytes([1; 12])],
            DateWindow::new(day(10), day(11)),
        );
        let found = source.find(&filter).await.unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].user_id, ObjectId::from_bytes([1; 12]));
    }
}
