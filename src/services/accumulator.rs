//! Per-(user, day) accumulation of totals and breakdowns

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::types::{
    BreakdownLine, DailySummary, Dimension, DimensionNames, EntryType, ObjectId, Transaction,
};

/// Breakdown map key. `None` is the uncategorized bucket.
type LineKey = (EntryType, Option<ObjectId>);

/// Id a transaction is attributed to within `dimension`.
///
/// Categories attribute regardless of direction (None = uncategorized).
/// Pockets and platforms use the destination for income and the source for
/// expense; a missing id means the line is dropped.
pub fn attribution(dimension: Dimension, entry_type: EntryType, tx: &Transaction) -> Option<ObjectId> {
    match (dimension, entry_type) {
        (Dimension::Category, _) => tx.category_id,
        (Dimension::Pocket, EntryType::Income) => tx.pocket_to_id,
        (Dimension::Pocket, EntryType::Expense) => tx.pocket_from_id,
        (Dimension::Platform, EntryType::Income) => tx.platform_to_id,
        (Dimension::Platform, EntryType::Expense) => tx.platform_from_id,
    }
}

/// Frozen accumulator output
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FrozenBreakdown {
    pub total_income: f64,
    pub total_expense: f64,
    pub category_breakdown: Vec<BreakdownLine>,
    pub pocket_breakdown: Vec<BreakdownLine>,
    pub platform_breakdown: Vec<BreakdownLine>,
}

impl FrozenBreakdown {
    /// Stamp the breakdown as the summary of `(user_id, date)`
    pub fn into_summary(
        self,
        user_id: ObjectId,
        date: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> DailySummary {
        DailySummary {
            id: ObjectId::new(),
            user_id,
            date,
            total_income: self.total_income,
            total_expense: self.total_expense,
            category_breakdown: self.category_breakdown,
            pocket_breakdown: self.pocket_breakdown,
            platform_breakdown: self.platform_breakdown,
            created_at,
        }
    }
}

/// Running totals plus category, pocket and platform breakdowns for one group
#[derive(Debug, Clone, Default)]
pub struct BreakdownAccumulator {
    total_income: f64,
    total_expense: f64,
    categories: HashMap<LineKey, f64>,
    pockets: HashMap<LineKey, f64>,
    platforms: HashMap<LineKey, f64>,
    count: u64,
}

impl BreakdownAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one transaction in. Transfers and unknown types are ignored.
    pub fn add(&mut self, tx: &Transaction) {
        let Some(entry_type) = tx.kind.entry_type() else {
            return;
        };

        match entry_type {
            EntryType::Income => self.total_income += tx.amount,
            EntryType::Expense => self.total_expense += tx.amount,
        }

        // category always lands, None is the uncategorized bucket
        let category = attribution(Dimension::Category, entry_type, tx);
        *self.categories.entry((entry_type, category)).or_insert(0.0) += tx.amount;

        if let Some(pocket) = attribution(Dimension::Pocket, entry_type, tx) {
            *self.pockets.entry((entry_type, Some(pocket))).or_insert(0.0) += tx.amount;
        }
        if let Some(platform) = attribution(Dimension::Platform, entry_type, tx) {
            *self.platforms.entry((entry_type, Some(platform))).or_insert(0.0) += tx.amount;
        }

        self.count = self.count.saturating_add(1);
    }

    /// Number of transactions folded in so far
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn total_income(&self) -> f64 {
        self.total_income
    }

    pub fn total_expense(&self) -> f64 {
        self.total_expense
    }

    /// Emit totals and breakdown lines. Line order is unspecified.
    pub fn freeze(&self, names: &DimensionNames) -> FrozenBreakdown {
        FrozenBreakdown {
            total_income: self.total_income,
            total_expense: self.total_expense,
            category_breakdown: lines(&self.categories, Dimension::Category, names),
            pocket_breakdown: lines(&self.pockets, Dimension::Pocket, names),
            platform_breakdown: lines(&self.platforms, Dimension::Platform, names),
        }
    }
}

fn lines(
    map: &HashMap<LineKey, f64>,
    dimension: Dimension,
    names: &DimensionNames,
) -> Vec<BreakdownLine> {
    map.iter()
        .map(|(&(entry_type, dimension_id), &amount)| BreakdownLine {
            dimension_id,
            dimension_name: names.resolve(dimension, dimension_id),
            entry_type,
            amount,
        })
        .collect()
}
