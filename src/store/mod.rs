//! Transaction source and summary store interfaces, plus reference adapters
//!
//! The engine never talks to a database directly. It reads ledger rows
//! through [`TransactionSource`] and writes materialized days through
//! [`SummaryStore`]; every call on either is an I/O boundary under the
//! caller's [`Context`]. Reads may be abandoned mid-flight with
//! [`Context::guard`]; writes go through [`Context::commit`] and always
//! report their real outcome.

mod context;
mod json_file;
mod jsonl;
mod memory;

pub use context::{CancellationToken, Context};
pub use json_file::JsonFileSummaryStore;
pub use jsonl::JsonlTransactionSource;
pub use memory::{MemorySummaryStore, MemoryTransactionSource};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::services::day::DateWindow;
use crate::types::{DailySummary, ObjectId, Result, Transaction};

/// Name of the unique compound index on summaries
pub const SUMMARY_INDEX_NAME: &str = "user_id_1_date_-1";

/// Selects non-deleted transactions of some users inside a window
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionFilter {
    pub user_ids: Vec<ObjectId>,
    pub window: DateWindow,
}

impl TransactionFilter {
    pub fn new(user_ids: Vec<ObjectId>, window: DateWindow) -> Self {
        Self { user_ids, window }
    }

    /// True when `tx` is live, belongs to a selected user and falls in the window
    pub fn matches(&self, tx: &Transaction) -> bool {
        !tx.is_deleted() && self.window.contains(tx.date) && self.user_ids.contains(&tx.user_id)
    }
}

/// Read side: the ledger's transaction collection
#[async_trait]
pub trait TransactionSource: Send + Sync {
    /// Distinct raw `user_id` values of non-deleted rows with date in `window`.
    ///
    /// Values are returned uncoerced; the engine decides what a valid id is.
    async fn distinct_user_ids(&self, window: DateWindow) -> Result<Vec<serde_json::Value>>;

    /// Non-deleted transactions matching `filter`, in source order
    async fn find(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>>;
}

/// Write side: materialized daily summaries, unique on (user_id, date)
#[async_trait]
pub trait SummaryStore: Send + Sync {
    /// Insert all documents, or none if any collides with the unique index
    async fn insert_many(&self, docs: Vec<DailySummary>) -> Result<()>;

    /// Remove every summary with `date >= start`, across all users.
    /// Returns the number removed.
    async fn delete_many_from(&self, start: DateTime<Utc>) -> Result<u64>;

    /// Remove the summary of `(user_id, day)` if present
    async fn delete_one(&self, user_id: ObjectId, day: DateTime<Utc>) -> Result<bool>;

    /// Summaries of `user_id` with date in `window`, ascending by date
    async fn find_range(&self, user_id: ObjectId, window: DateWindow) -> Result<Vec<DailySummary>>;

    /// Create the unique (user_id asc, date desc) index if missing
    async fn ensure_indexes(&self) -> Result<()>;
}
