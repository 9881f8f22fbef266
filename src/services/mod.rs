//! Services for grouping transactions and materializing daily summaries

pub mod accumulator;
pub mod batch_driver;
pub mod day;
pub mod group_table;
pub mod historical;
pub mod summary_service;

pub use accumulator::BreakdownAccumulator;
pub use batch_driver::{BackfillReport, BatchDriver, DEFAULT_BATCH_SIZE};
pub use day::{bucketize, cutoff, Clock, DateWindow, FixedClock, SystemClock};
pub use group_table::GroupTable;
pub use historical::merge_history;
pub use summary_service::{DailySummaryService, SyncReport};
