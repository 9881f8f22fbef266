//! JSONL transaction source
//!
//! Reads ledger exports laid out as `**/*.jsonl`, one transaction document
//! per line. Files are parsed in parallel and each query's predicate is
//! applied per line, so only matching rows are kept in memory. Grouping
//! stays in the engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::{TransactionFilter, TransactionSource};
use crate::services::day::DateWindow;
use crate::types::{LedgerdayError, ObjectId, Result, Transaction};

/// Just enough of a row to evaluate the live/window predicate
#[derive(Deserialize)]
struct RowHeader {
    user_id: serde_json::Value,
    date: DateTime<Utc>,
    #[serde(default)]
    deleted_at: Option<DateTime<Utc>>,
}

impl RowHeader {
    fn is_live_in(&self, window: &DateWindow) -> bool {
        self.deleted_at.is_none() && window.contains(self.date)
    }
}

/// One parsed line handed to a query's selector
struct Line<'a> {
    path: &'a Path,
    number: usize,
    header: RowHeader,
    doc: serde_json::Value,
}

impl Line<'_> {
    fn origin(&self) -> String {
        format!("{}:{}", self.path.display(), self.number)
    }
}

pub struct JsonlTransactionSource {
    data_dir: PathBuf,
}

impl JsonlTransactionSource {
    /// Source with default data directory (~/.ledgerday/transactions/)
    pub fn new() -> Result<Self> {
        let base_dirs = directories::BaseDirs::new()
            .ok_or_else(|| LedgerdayError::Config("Cannot determine home directory".into()))?;
        Ok(Self::with_data_dir(
            base_dirs.home_dir().join(".ledgerday").join("transactions"),
        ))
    }

    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Glob pattern for transaction files
    pub fn file_pattern(&self) -> &str {
        "**/*.jsonl"
    }

    /// Collect all files matching the glob pattern, sorted for stable order
    pub fn collect_files(&self) -> Vec<PathBuf> {
        let pattern = self.data_dir.join(self.file_pattern());
        let mut files: Vec<PathBuf> = glob::glob(&pattern.to_string_lossy())
            .map(|paths| paths.filter_map(|e| e.ok()).collect())
            .unwrap_or_default();
        files.sort();
        files
    }

    /// Parse a single file, keeping what `select` returns for each line.
    /// Any malformed line fails the whole read.
    fn parse_file<T, F>(path: &Path, select: &F) -> Result<Vec<T>>
    where
        F: Fn(Line<'_>) -> Result<Option<T>>,
    {
        let content = std::fs::read(path).map_err(|e| {
            LedgerdayError::StoreRead(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let mut kept = Vec::new();
        for (idx, raw) in content.split(|&b| b == b'\n').enumerate() {
            if raw.iter().all(|b| b.is_ascii_whitespace()) {
                continue;
            }
            let number = idx + 1;

            let mut buf = raw.to_vec();
            let doc: serde_json::Value = simd_json::from_slice(&mut buf).map_err(|e| {
                LedgerdayError::StoreRead(format!("{}:{}: invalid JSON: {}", path.display(), number, e))
            })?;
            let header = RowHeader::deserialize(&doc).map_err(|e| {
                LedgerdayError::StoreRead(format!("{}:{}: invalid row: {}", path.display(), number, e))
            })?;

            let line = Line {
                path,
                number,
                header,
                doc,
            };
            if let Some(item) = select(line)? {
                kept.push(item);
            }
        }
        Ok(kept)
    }

    /// Scan every file in parallel on a blocking thread
    async fn scan<T, F>(&self, select: F) -> Result<Vec<T>>
    where
        T: Send + 'static,
        F: Fn(Line<'_>) -> Result<Option<T>> + Send + Sync + 'static,
    {
        let files = self.collect_files();
        tokio::task::spawn_blocking(move || {
            let per_file: Vec<Vec<T>> = files
                .par_iter()
                .map(|f| Self::parse_file(f, &select))
                .collect::<Result<_>>()?;
            Ok(per_file.into_iter().flatten().collect())
        })
        .await
        .map_err(|e| LedgerdayError::StoreRead(format!("source task failed: {}", e)))?
    }
}

#[async_trait]
impl TransactionSource for JsonlTransactionSource {
    async fn distinct_user_ids(&self, window: DateWindow) -> Result<Vec<serde_json::Value>> {
        let values = self
            .scan(move |line| {
                Ok(line
                    .header
                    .is_live_in(&window)
                    .then_some(line.header.user_id))
            })
            .await?;

        let mut seen: HashSet<String> = HashSet::new();
        let mut ids = Vec::new();
        for value in values {
            // dedupe on the canonical JSON text so non-string ids survive too
            if seen.insert(value.to_string()) {
                ids.push(value);
            }
        }
        Ok(ids)
    }

    async fn find(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
        let users: HashSet<ObjectId> = filter.user_ids.iter().copied().collect();
        let window = filter.window;

        self.scan(move |line| {
            if !line.header.is_live_in(&window) {
                return Ok(None);
            }
            // rows whose user_id is not an object id cannot match the filter
            let Some(user_id) = ObjectId::from_value(&line.header.user_id) else {
                return Ok(None);
            };
            if !users.contains(&user_id) {
                return Ok(None);
            }

            let origin = line.origin();
            let mut doc = line.doc;
            if let Some(obj) = doc.as_object_mut() {
                obj.insert("user_id".into(), serde_json::Value::String(user_id.to_hex()));
            }
            let tx: Transaction = serde_json::from_value(doc).map_err(|e| {
                LedgerdayError::StoreRead(format!("{}: invalid transaction: {}", origin, e))
            })?;
            Ok(Some(tx))
        })
        .await
    }
}
