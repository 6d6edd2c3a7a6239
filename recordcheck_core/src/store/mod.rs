//! Operational store: client queue, sync ledger, processing attempts and reports.

pub mod memory;
pub mod sqlite;
pub mod traits;
