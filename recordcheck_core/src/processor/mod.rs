//! Record Processor: drains the `Pending` client queue through the public-records lookup.
//!
//! One cycle:
//! - Picks the oldest `Pending` client (at most one)
//! - Builds the search name; a client with no usable name becomes `Error`
//! - Marks it `Processing` and opens a `ProcessRecord`
//! - Classifies the lookup as results / no results / API error
//! - Stores a report for the first two and marks the client `Processed`; an API error requeues it
//!
//! Between cycles the worker waits a fixed interval while watching for a stop signal.

pub mod engine;
pub mod lookup;
pub mod models;
pub mod queue;
pub mod search_name;
pub mod traits;
