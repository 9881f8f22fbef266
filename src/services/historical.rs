//! Collapse stored daily summaries into one range-level category history

use std::collections::HashMap;

use crate::types::{DailySummary, EntryType, HistoricalSummary, ObjectId};

/// Sum totals and merge category lines by (type, category) across days.
///
/// Pocket and platform breakdowns are deliberately left out: range history
/// only surfaces categories. Lines keep the order their key was first seen.
pub fn merge_history(summaries: &[DailySummary]) -> HistoricalSummary {
    let mut result = HistoricalSummary::default();
    let mut index: HashMap<(EntryType, Option<ObjectId>), usize> = HashMap::new();

    for summary in summaries {
        result.total_income += summary.total_income;
        result.total_expense += summary.total_expense;

        for line in &summary.category_breakdown {
            match index.get(&line.key()) {
                Some(&pos) => result.category_breakdown[pos].amount += line.amount,
                None => {
                    index.insert(line.key(), result.category_breakdown.len());
                    result.category_breakdown.push(line.clone());
                }
            }
        }
    }

    result
}
