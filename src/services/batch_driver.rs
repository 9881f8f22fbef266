//! Bulk backfill over every active user in a window

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info};

use super::day::DateWindow;
use super::group_table::GroupTable;
use crate::store::{Context, SummaryStore, TransactionFilter, TransactionSource};
use crate::types::{DimensionNames, LedgerdayError, ObjectId, Result};

/// Users per batch. Tuning only; results do not depend on it.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// What one backfill run materialized
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    pub users: usize,
    pub batches: usize,
    pub summaries: usize,
}

/// Coerce the source's distinct user values into ids.
///
/// A value that is not an object id means the source is corrupt; the whole
/// run aborts rather than skipping the user. Duplicates are collapsed.
pub fn coerce_user_ids(raw: Vec<serde_json::Value>) -> Result<Vec<ObjectId>> {
    let mut seen: HashSet<ObjectId> = HashSet::new();
    let mut ids = Vec::with_capacity(raw.len());
    for value in raw {
        let id = ObjectId::from_value(&value).ok_or_else(|| {
            LedgerdayError::InvariantViolated(format!(
                "distinct user_id value is not an object id: {}",
                value
            ))
        })?;
        if seen.insert(id) {
            ids.push(id);
        }
    }
    Ok(ids)
}

/// Drives grouping and insertion batch by batch.
///
/// Never deletes: replacing existing summaries is the caller's job (sync
/// pre-cleans the whole window once). Colliding with a summary that is still
/// present fails the insert of that batch.
pub struct BatchDriver<'a> {
    source: &'a dyn TransactionSource,
    store: &'a dyn SummaryStore,
    names: &'a DimensionNames,
    batch_size: usize,
}

impl<'a> BatchDriver<'a> {
    pub fn new(
        source: &'a dyn TransactionSource,
        store: &'a dyn SummaryStore,
        names: &'a DimensionNames,
    ) -> Self {
        Self {
            source,
            store,
            names,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Materialize every (user, day) in `window`, stamping `created_at`.
    ///
    /// Batches already inserted stay in place if a later batch fails.
    pub async fn run(
        &self,
        ctx: &Context,
        window: DateWindow,
        created_at: DateTime<Utc>,
    ) -> Result<BackfillReport> {
        let mut report = BackfillReport::default();
        if window.is_empty() {
            debug!(start = %window.start, end = %window.end, "empty backfill window");
            return Ok(report);
        }

        let raw = ctx.guard(self.source.distinct_user_ids(window)).await?;
        let users = coerce_user_ids(raw)?;
        report.users = users.len();
        if users.is_empty() {
            info!(start = %window.start, "no active users in window");
            return Ok(report);
        }

        for batch in users.chunks(self.batch_size) {
            let filter = TransactionFilter::new(batch.to_vec(), window);
            let transactions = ctx.guard(self.source.find(&filter)).await?;

            let mut table = GroupTable::new();
            for tx in &transactions {
                table.add(tx);
            }

            let summaries = table.into_summaries(self.names, created_at);
            let emitted = summaries.len();
            if emitted > 0 {
                ctx.commit(self.store.insert_many(summaries)).await?;
            }

            report.batches += 1;
            report.summaries += emitted;
            debug!(
                batch = report.batches,
                users = batch.len(),
                transactions = transactions.len(),
                summaries = emitted,
                "batch materialized"
            );
        }

        Ok(report)
    }
}
