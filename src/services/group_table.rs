//! (user, day) -> accumulator table for one batch

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use super::accumulator::BreakdownAccumulator;
use super::day::bucketize;
use crate::types::{DailySummary, DimensionNames, ObjectId, Transaction};

/// Groups a batch's transactions by user and UTC day.
///
/// Owned by a single batch iteration and dropped once its summaries are
/// emitted, so memory is bounded by the distinct pairs in one batch.
#[derive(Debug, Default)]
pub struct GroupTable {
    groups: HashMap<(ObjectId, DateTime<Utc>), BreakdownAccumulator>,
}

impl GroupTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route an income or expense transaction to its group.
    /// Other types never create a group.
    pub fn add(&mut self, tx: &Transaction) {
        if tx.kind.entry_type().is_none() {
            return;
        }
        let key = (tx.user_id, bucketize(tx.date));
        self.groups.entry(key).or_default().add(tx);
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Freeze every group into a summary document
    pub fn into_summaries(
        self,
        names: &DimensionNames,
        created_at: DateTime<Utc>,
    ) -> Vec<DailySummary> {
        self.groups
            .into_iter()
            .map(|((user_id, day), acc)| acc.freeze(names).into_summary(user_id, day, created_at))
            .collect()
    }
}
