//! Public engine surface: point regeneration, backfill, sync and history

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::accumulator::BreakdownAccumulator;
use super::batch_driver::{BackfillReport, BatchDriver, DEFAULT_BATCH_SIZE};
use super::day::{bucketize, Clock, DateWindow, SystemClock};
use super::historical::merge_history;
use crate::store::{Context, SummaryStore, TransactionFilter, TransactionSource};
use crate::types::{DailySummary, DimensionNames, HistoricalSummary, ObjectId, Result};

/// Outcome of a sync: the pre-clean plus the rebuild
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub deleted: u64,
    pub backfill: BackfillReport,
}

/// Daily summary materialization engine.
///
/// Holds no state between calls; every entry point is a one-shot
/// computation against the injected source and store.
pub struct DailySummaryService {
    source: Arc<dyn TransactionSource>,
    store: Arc<dyn SummaryStore>,
    clock: Arc<dyn Clock>,
    names: DimensionNames,
    batch_size: usize,
}

impl DailySummaryService {
    pub fn new(source: Arc<dyn TransactionSource>, store: Arc<dyn SummaryStore>) -> Self {
        Self {
            source,
            store,
            clock: Arc::new(SystemClock),
            names: DimensionNames::default(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_names(mut self, names: DimensionNames) -> Self {
        self.names = names;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Rebuild the summary of one user's day.
    ///
    /// Deletes any existing summary for the day before inserting, so it is
    /// safe to re-run. A day with no income or expense is cleared and nothing
    /// is inserted, matching backfill, which never emits empty groups; the
    /// regenerate-then-read round trip then holds vacuously. Returns None in
    /// that case.
    pub async fn generate_daily_summary(
        &self,
        ctx: &Context,
        user_id: ObjectId,
        date: DateTime<Utc>,
    ) -> Result<Option<DailySummary>> {
        let window = DateWindow::day_of(date);
        info!(user = %user_id, day = %window.start, "regenerating daily summary");

        let filter = TransactionFilter::new(vec![user_id], window);
        let transactions = ctx.guard(self.source.find(&filter)).await?;

        let mut acc = BreakdownAccumulator::new();
        for tx in transactions.iter().filter(|tx| tx.user_id == user_id) {
            acc.add(tx);
        }

        ctx.commit(self.store.delete_one(user_id, window.start)).await?;

        if acc.is_empty() {
            info!(user = %user_id, day = %window.start, "no income or expense, summary cleared");
            return Ok(None);
        }

        let summary = acc
            .freeze(&self.names)
            .into_summary(user_id, window.start, self.clock.now());
        ctx.commit(self.store.insert_many(vec![summary.clone()])).await?;

        Ok(Some(summary))
    }

    /// Backfill every active user from `start` through yesterday (UTC).
    ///
    /// Does not clean first; a second run over the same window fails on the
    /// unique index. Use [`Self::sync_daily_summaries`] to retry.
    pub async fn generate_daily_summaries_for_all_users(
        &self,
        ctx: &Context,
        start: DateTime<Utc>,
    ) -> Result<BackfillReport> {
        let now = self.clock.now();
        let window = DateWindow::backfill(start, now);
        if window.is_empty() {
            info!(start = %window.start, cutoff = %window.end, "start is not before cutoff, nothing to backfill");
            return Ok(BackfillReport::default());
        }

        info!(start = %window.start, cutoff = %window.end, "backfilling daily summaries");
        let report = BatchDriver::new(self.source.as_ref(), self.store.as_ref(), &self.names)
            .with_batch_size(self.batch_size)
            .run(ctx, window, now)
            .await?;

        info!(
            users = report.users,
            batches = report.batches,
            summaries = report.summaries,
            "backfill complete"
        );
        Ok(report)
    }

    /// Delete every summary dated on or after `start` (all users), then backfill.
    ///
    /// Idempotent: the single wide delete is the only pre-clean.
    pub async fn sync_daily_summaries(&self, ctx: &Context, start: DateTime<Utc>) -> Result<SyncReport> {
        let from = bucketize(start);
        let deleted = ctx.commit(self.store.delete_many_from(from)).await?;
        info!(from = %from, deleted, "cleared summaries for sync");

        let backfill = self
            .generate_daily_summaries_for_all_users(ctx, from)
            .await
            .inspect_err(|e| warn!(error = %e, "sync backfill failed, rerun sync to reconcile"))?;

        Ok(SyncReport { deleted, backfill })
    }

    /// Totals and merged category breakdown of `user_id` over `[start, end)`
    pub async fn get_historical_summary(
        &self,
        ctx: &Context,
        user_id: ObjectId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<HistoricalSummary> {
        let window = DateWindow::new(start, end);
        let summaries = ctx.guard(self.store.find_range(user_id, window)).await?;
        Ok(merge_history(&summaries))
    }

    pub async fn ensure_indexes(&self, ctx: &Context) -> Result<()> {
        ctx.commit(self.store.ensure_indexes()).await?;
        info!("summary indexes ensured");
        Ok(())
    }
}
