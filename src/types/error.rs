use chrono::{DateTime, Utc};
use thiserror::Error;

use super::ObjectId;

/// ledgerday error types
#[derive(Error, Debug)]
pub enum LedgerdayError {
    /// Failed reading transactions or summaries
    #[error("store read error: {0}")]
    StoreRead(String),

    /// Failed deleting or inserting summaries
    #[error("store write error: {0}")]
    StoreWrite(String),

    /// Unique (user_id, date) index rejected an insert
    #[error("store write error: summary for user {user_id} on {date} already exists")]
    DuplicateSummary {
        user_id: ObjectId,
        date: DateTime<Utc>,
    },

    /// Caller's deadline or cancellation fired
    #[error("operation cancelled")]
    Cancelled,

    /// Source data broke an engine invariant
    #[error("invariant violated: {0}")]
    InvariantViolated(String),

    /// Failed to parse an id, date or record
    #[error("parse error: {0}")]
    Parse(String),

    /// File I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),
}

impl LedgerdayError {
    /// True for every failure the store raised while writing, uniqueness included
    pub fn is_write_failure(&self) -> bool {
        matches!(
            self,
            LedgerdayError::StoreWrite(_) | LedgerdayError::DuplicateSummary { .. }
        )
    }
}

/// Result type alias for ledgerday
pub type Result<T> = std::result::Result<T, LedgerdayError>;
