//! Type definitions for ledgerday

mod error;
mod ledger;
mod summary;

pub use error::*;
pub use ledger::*;
pub use summary::*;
