//! Materialized summary types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{EntryType, ObjectId};

/// Display name for the category bucket of transactions without a category
pub const UNCATEGORIZED_NAME: &str = "Uncategorized";

/// One line of a category, pocket or platform breakdown.
///
/// `dimension_id == None` is the uncategorized bucket; only category
/// breakdowns ever carry it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakdownLine {
    pub dimension_id: Option<ObjectId>,
    pub dimension_name: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub amount: f64,
}

impl BreakdownLine {
    /// Composite key identifying the line within its breakdown
    pub fn key(&self) -> (EntryType, Option<ObjectId>) {
        (self.entry_type, self.dimension_id)
    }
}

/// Precomputed totals and breakdowns for one (user, UTC day)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub id: ObjectId,
    pub user_id: ObjectId,
    /// UTC midnight of the summarized day
    pub date: DateTime<Utc>,
    pub total_income: f64,
    pub total_expense: f64,
    pub category_breakdown: Vec<BreakdownLine>,
    pub pocket_breakdown: Vec<BreakdownLine>,
    pub platform_breakdown: Vec<BreakdownLine>,
    pub created_at: DateTime<Utc>,
}

impl DailySummary {
    /// Unique index key
    pub fn key(&self) -> (ObjectId, DateTime<Utc>) {
        (self.user_id, self.date)
    }
}

/// Category history collapsed over a date range
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HistoricalSummary {
    pub total_income: f64,
    pub total_expense: f64,
    pub category_breakdown: Vec<BreakdownLine>,
}

/// The three breakdown dimensions of a daily summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    Category,
    Pocket,
    Platform,
}

/// Read-only id -> display name directory for breakdown lines.
///
/// Master data lives elsewhere; this is a snapshot handed to the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DimensionNames {
    #[serde(default)]
    pub categories: HashMap<ObjectId, String>,
    #[serde(default)]
    pub pockets: HashMap<ObjectId, String>,
    #[serde(default)]
    pub platforms: HashMap<ObjectId, String>,
}

impl DimensionNames {
    /// Resolve a line name; unknown ids get an empty name
    pub fn resolve(&self, dimension: Dimension, id: Option<ObjectId>) -> String {
        let Some(id) = id else {
            return match dimension {
                Dimension::Category => UNCATEGORIZED_NAME.to_string(),
                Dimension::Pocket | Dimension::Platform => String::new(),
            };
        };
        let map = match dimension {
            Dimension::Category => &self.categories,
            Dimension::Pocket => &self.pockets,
            Dimension::Platform => &self.platforms,
        };
        map.get(&id).cloned().unwrap_or_default()
    }
}
