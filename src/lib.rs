//! ledgerday: materialized daily income/expense summaries for a
//! personal-finance ledger.

pub mod cli;
pub mod config;
pub mod services;
pub mod store;
pub mod types;
