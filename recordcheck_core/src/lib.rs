//! recordcheck core library: loan-application sync, client queue processing and shared models.

pub mod config;
pub mod error;
pub mod models;
pub mod o11y;
pub mod processor;
pub mod store;
pub mod sync;

#[cfg(test)]
mod test_support;

pub use config::{
    AppConfig, LookupConfig, ProcessorConfig, ReportConfig, ScheduleConfig, SourceDbConfig,
};
pub use error::{Error, Result};
pub use models::{
    ClientId, ClientRecord, ConsultationStatus, JobId, NewClient, PartyIdentity, ProcessId,
    ReportId, SourceRecord,
};
pub use processor::engine::RecordProcessor;
pub use processor::lookup::PaginatedLookup;
pub use processor::models::{
    CaseRecord, ClientMetadata, ControlResponse, CycleOutcome, LookupOutcome, ProcessRecord,
    ProcessStatus, ProcessorState, ProcessorStatus, ReportRecord,
};
pub use processor::queue::{QueueStats, queue_stats, requeue_client};
pub use processor::traits::{
    LookupService, PageFetcher, RenderedReport, ReportRenderer, ReportRequest,
};
pub use store::memory::MemoryOperationalDb;
pub use store::sqlite::SqliteOperationalDb;
pub use store::traits::OperationalDb;
pub use sync::engine::SyncEngine;
pub use sync::models::{SyncCounts, SyncResult, SyncRun, SyncStatus};
pub use sync::schedule::{DailySyncScheduler, ScheduledRun, SchedulerStatus};
pub use sync::traits::SourceExtractor;
