//! Synchronization of loan applications into the operational store.
//!
//! One run:
//! - Reserves the next run number for the process name
//! - Pulls source records for an inclusive date range (via a `SourceExtractor`)
//! - Inserts each record as a `Pending` client, counting duplicates and errors independently
//! - Appends exactly one `SyncRun` row to the audit ledger, even when extraction failed

pub mod engine;
pub mod models;
pub mod schedule;
pub mod traits;
