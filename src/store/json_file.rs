//! File-backed summary store
//!
//! Keeps every materialized summary in one JSON document. Reads take a
//! shared lock and read-modify-write cycles take an exclusive lock on a
//! sidecar lock file; the document itself is replaced by temp file + rename.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use directories::BaseDirs;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use super::{SummaryStore, SUMMARY_INDEX_NAME};
use crate::services::day::DateWindow;
use crate::types::{DailySummary, LedgerdayError, ObjectId, Result};

const STORE_VERSION: u32 = 1;

/// Index definition recorded by `ensure_indexes`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    /// (field, direction) pairs; 1 ascending, -1 descending
    pub keys: Vec<(String, i32)>,
    pub unique: bool,
}

impl IndexSpec {
    fn summary_unique() -> Self {
        Self {
            name: SUMMARY_INDEX_NAME.to_string(),
            keys: vec![("user_id".to_string(), 1), ("date".to_string(), -1)],
            unique: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SummaryFile {
    pub version: u32,
    pub updated_at: i64,
    #[serde(default)]
    pub indexes: Vec<IndexSpec>,
    pub summaries: Vec<DailySummary>,
}

impl Default for SummaryFile {
    fn default() -> Self {
        Self {
            version: STORE_VERSION,
            updated_at: 0,
            indexes: Vec::new(),
            summaries: Vec::new(),
        }
    }
}

pub struct JsonFileSummaryStore {
    path: PathBuf,
}

impl JsonFileSummaryStore {
    /// Store at `~/.ledgerday/summaries.json`
    pub fn new() -> Result<Self> {
        let base_dirs = BaseDirs::new()
            .ok_or_else(|| LedgerdayError::Config("Cannot determine home directory".into()))?;
        let path = base_dirs.home_dir().join(".ledgerday").join("summaries.json");
        Ok(Self::with_path(path))
    }

    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(path: &Path) -> PathBuf {
        path.with_extension("json.lock")
    }

    /// Run a closure on a blocking thread, mapping join failures to `map_err`
    async fn blocking<T, F>(&self, map_err: fn(String) -> LedgerdayError, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(PathBuf) -> Result<T> + Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || f(path))
            .await
            .map_err(|e| map_err(format!("store task failed: {}", e)))?
    }

    /// Read the current document under a shared lock
    async fn read(&self) -> Result<SummaryFile> {
        self.blocking(LedgerdayError::StoreRead, |path| {
            let lock = open_lock(&path).map_err(read_err)?;
            lock.lock_shared()
                .map_err(|e| LedgerdayError::StoreRead(format!("Failed to acquire read lock: {}", e)))?;
            let result = load(&path);
            let _ = lock.unlock();
            result
        })
        .await
    }

    /// Read-modify-write under an exclusive lock.
    ///
    /// If the caller drops the returned future before the save begins, the
    /// blocking task skips the save and leaves the document untouched.
    async fn update<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut SummaryFile) -> Result<T> + Send + 'static,
    {
        let ticket = WriteTicket::new();
        let state = ticket.state();
        self.blocking(LedgerdayError::StoreWrite, move |path| {
            let lock = open_lock(&path).map_err(write_err)?;
            lock.lock_exclusive().map_err(|e| {
                LedgerdayError::StoreWrite(format!("Failed to acquire write lock: {}", e))
            })?;
            let result = load(&path).and_then(|mut file| {
                let value = f(&mut file)?;
                WriteTicket::begin_commit(&state)?;
                save(&path, &mut file)?;
                Ok(value)
            });
            let _ = lock.unlock();
            result
        })
        .await
        // ticket drops here, after the blocking task has finished
    }
}

const WRITE_PENDING: u8 = 0;
const WRITE_COMMITTING: u8 = 1;
const WRITE_ABANDONED: u8 = 2;

/// Links an in-flight write to the future awaiting it.
///
/// Dropping the ticket while the write is pending marks it abandoned; the
/// blocking task must win the pending -> committing transition to save.
struct WriteTicket(Arc<AtomicU8>);

impl WriteTicket {
    fn new() -> Self {
        Self(Arc::new(AtomicU8::new(WRITE_PENDING)))
    }

    fn state(&self) -> Arc<AtomicU8> {
        Arc::clone(&self.0)
    }

    fn begin_commit(state: &AtomicU8) -> Result<()> {
        state
            .compare_exchange(WRITE_PENDING, WRITE_COMMITTING, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(|_| LedgerdayError::Cancelled)
    }
}

impl Drop for WriteTicket {
    fn drop(&mut self) {
        let _ = self.0.compare_exchange(
            WRITE_PENDING,
            WRITE_ABANDONED,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }
}

fn read_err(e: std::io::Error) -> LedgerdayError {
    LedgerdayError::StoreRead(e.to_string())
}

fn write_err(e: std::io::Error) -> LedgerdayError {
    LedgerdayError::StoreWrite(e.to_string())
}

fn open_lock(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(JsonFileSummaryStore::lock_path(path))
}

/// Load the document; a missing file is an empty store
fn load(path: &Path) -> Result<SummaryFile> {
    if !path.exists() {
        return Ok(SummaryFile::default());
    }

    let mut content = String::new();
    File::open(path)
        .and_then(|f| std::io::BufReader::new(f).read_to_string(&mut content))
        .map_err(|e| LedgerdayError::StoreRead(format!("Failed to read store: {}", e)))?;

    let file: SummaryFile = serde_json::from_str(&content)
        .map_err(|e| LedgerdayError::StoreRead(format!("Corrupted store file: {}", e)))?;

    if file.version != STORE_VERSION {
        return Err(LedgerdayError::StoreRead(format!(
            "Unsupported store version {} (expected {})",
            file.version, STORE_VERSION
        )));
    }
    Ok(file)
}

/// Atomic write (temp file + rename). Caller holds the exclusive lock.
fn save(path: &Path, file: &mut SummaryFile) -> Result<()> {
    file.updated_at = Utc::now().timestamp();

    let content = serde_json::to_string_pretty(file)
        .map_err(|e| LedgerdayError::StoreWrite(format!("Serialization failed: {}", e)))?;

    let temp_path = path.with_extension("json.tmp");
    {
        let mut tmp = File::create(&temp_path)
            .map_err(|e| LedgerdayError::StoreWrite(format!("Failed to create temp file: {}", e)))?;
        tmp.write_all(content.as_bytes())
            .map_err(|e| LedgerdayError::StoreWrite(format!("Failed to write temp file: {}", e)))?;
        tmp.sync_all()
            .map_err(|e| LedgerdayError::StoreWrite(format!("Failed to sync temp file: {}", e)))?;
    }

    fs::rename(&temp_path, path)
        .map_err(|e| LedgerdayError::StoreWrite(format!("Failed to rename temp file: {}", e)))?;
    Ok(())
}

#[async_trait]
impl SummaryStore for JsonFileSummaryStore {
    async fn insert_many(&self, docs: Vec<DailySummary>) -> Result<()> {
        if docs.is_empty() {
            return Ok(());
        }
        self.update(move |file| {
            let mut keys: HashSet<(ObjectId, DateTime<Utc>)> =
                file.summaries.iter().map(|s| s.key()).collect();
            for doc in &docs {
                if !keys.insert(doc.key()) {
                    return Err(LedgerdayError::DuplicateSummary {
                        user_id: doc.user_id,
                        date: doc.date,
                    });
                }
            }
            file.summaries.extend(docs);
            Ok(())
        })
        .await
    }

    async fn delete_many_from(&self, start: DateTime<Utc>) -> Result<u64> {
        self.update(move |file| {
            let before = file.summaries.len();
            file.summaries.retain(|s| s.date < start);
            Ok((before - file.summaries.len()) as u64)
        })
        .await
    }

    async fn delete_one(&self, user_id: ObjectId, day: DateTime<Utc>) -> Result<bool> {
        self.update(move |file| {
            let before = file.summaries.len();
            file.summaries.retain(|s| s.key() != (user_id, day));
            Ok(file.summaries.len() != before)
        })
        .await
    }

    async fn find_range(&self, user_id: ObjectId, window: DateWindow) -> Result<Vec<DailySummary>> {
        let file = self.read().await?;
        let mut found: Vec<DailySummary> = file
            .summaries
            .into_iter()
            .filter(|s| s.user_id == user_id && window.contains(s.date))
            .collect();
        found.sort_by_key(|s| s.date);
        Ok(found)
    }

    async fn ensure_indexes(&self) -> Result<()> {
        self.update(|file| {
            let spec = IndexSpec::summary_unique();
            if !file.indexes.iter().any(|i| i.name == spec.name) {
                file.indexes.push(spec);
            }
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

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

    fn create_test_store() -> (JsonFileSummaryStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonFileSummaryStore::with_path(temp_dir.path().join("summaries.json"));
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_missing_file_is_empty_store() {
        let (store, _temp) = create_test_store();
        let found = store
            .find_range(ObjectId::from_bytes([1; 12]), DateWindow::new(day(1), day(31)))
            .await
            .unwrap();
        assert!(found.is_empty());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_insert_persists_across_instances() {
        let (store, temp) = create_test_store();
        store
            .insert_many(vec![make_summary(1, 10, 5.0), make_summary(1, 11, 6.0)])
            .await
            .unwrap();

        let reopened = JsonFileSummaryStore::with_path(temp.path().join("summaries.json"));
        let found = reopened
            .find_range(ObjectId::from_bytes([1; 12]), DateWindow::new(day(10), day(12)))
            .await
            .unwrap();

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].total_income, 5.0);
        assert_eq!(found[1].total_income, 6.0);
    }

    #[tokio::test]
    async fn test_insert_conflict_leaves_file_untouched() {
        let (store, _temp) = create_test_store();
        store.insert_many(vec![make_summary(1, 10, 5.0)]).await.unwrap();

        let err = store
            .insert_many(vec![make_summary(2, 10, 1.0), make_summary(1, 10, 7.0)])
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerdayError::DuplicateSummary { .. }));

        let content: SummaryFile =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(content.summaries.len(), 1);
        assert_eq!(content.summaries[0].total_income, 5.0);
    }

    #[tokio::test]
    async fn test_delete_many_from_and_delete_one() {
        let (store, _temp) = create_test_store();
        store
            .insert_many(vec![
                make_summary(1, 9, 1.0),
                make_summary(1, 10, 1.0),
                make_summary(2, 12, 1.0),
            ])
            .await
            .unwrap();

        assert_eq!(store.delete_many_from(day(10)).await.unwrap(), 2);
        assert!(store.delete_one(ObjectId::from_bytes([1; 12]), day(9)).await.unwrap());
        assert!(!store.delete_one(ObjectId::from_bytes([1; 12]), day(9)).await.unwrap());

        let content: SummaryFile =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert!(content.summaries.is_empty());
    }

    #[tokio::test]
    async fn test_find_range_sorted_ascending() {
        let (store, _temp) = create_test_store();
        store
            .insert_many(vec![
                make_summary(1, 20, 3.0),
                make_summary(1, 5, 1.0),
                make_summary(1, 12, 2.0),
            ])
            .await
            .unwrap();

        let found = store
            .find_range(ObjectId::from_bytes([1; 12]), DateWindow::new(day(1), day(31)))
            .await
            .unwrap();
        let dates: Vec<_> = found.iter().map(|s| s.date).collect();
        assert_eq!(dates, vec![day(5), day(12), day(20)]);
    }

    #[tokio::test]
    async fn test_ensure_indexes_records_once() {
        let (store, _temp) = create_test_store();
        store.ensure_indexes().await.unwrap();
        store.ensure_indexes().await.unwrap();

        let content: SummaryFile =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(content.indexes.len(), 1);
        assert_eq!(content.indexes[0].name, "user_id_1_date_-1");
        assert!(content.indexes[0].unique);
        assert_eq!(content.indexes[0].keys[1], ("date".to_string(), -1));
    }

    #[tokio::test]
    async fn test_corrupted_file_is_read_error() {
        let (store, _temp) = create_test_store();
        fs::write(store.path(), "not valid json {{{").unwrap();

        let err = store
            .find_range(ObjectId::from_bytes([1; 12]), DateWindow::new(day(1), day(31)))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerdayError::StoreRead(_)));
    }

    #[tokio::test]
    async fn test_abandoned_write_is_not_saved() {
        let (store, _temp) = create_test_store();
        let store = Arc::new(store);

        // hold the exclusive lock so the write blocks before it can save
        let lock = open_lock(store.path()).unwrap();
        lock.lock_exclusive().unwrap();

        let token = crate::store::CancellationToken::new();
        let ctx = crate::store::Context::background().with_cancel(token.clone());
        let writer = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                ctx.guard(store.insert_many(vec![make_summary(1, 10, 5.0)]))
                    .await
            })
        };

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        token.cancel();
        let result = writer.await.unwrap();
        assert!(matches!(result, Err(LedgerdayError::Cancelled)));

        lock.unlock().unwrap();
        // let the released blocking task run to its commit check
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;

        let found = store
            .find_range(ObjectId::from_bytes([1; 12]), DateWindow::new(day(1), day(31)))
            .await
            .unwrap();
        assert!(found.is_empty());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_committed_write_reports_success_past_deadline() {
        let (store, _temp) = create_test_store();
        let docs: Vec<DailySummary> = (1..=28).map(|d| make_summary(1, d, 1.0)).collect();
        let ctx = crate::store::Context::background()
            .with_timeout(std::time::Duration::from_millis(200));

        ctx.commit(async {
            tokio::time::sleep(std::time::Duration::from_millis(300)).await;
            store.insert_many(docs).await
        })
        .await
        .unwrap();
        assert!(ctx.check().is_err());

        let found = store
            .find_range(ObjectId::from_bytes([1; 12]), DateWindow::new(day(1), day(31)))
            .await
            .unwrap();
        assert_eq!(found.len(), 28);
    }

    #[tokio::test]
    async fn test_no_temp_file_left_behind() {
        let (store, temp) = create_test_store();
        store.insert_many(vec![make_summary(1, 10, 1.0)]).await.unwrap();
        assert!(!temp.path().join("summaries.json.tmp").exists());
    }
}
