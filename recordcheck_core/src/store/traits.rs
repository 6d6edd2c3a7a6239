use crate::Result;
use crate::models::{ClientId, ClientRecord, ConsultationStatus, JobId, NewClient, ProcessId};
use crate::processor::models::{NewReport, ProcessFinish, ProcessRecord, ReportRecord};
use crate::sync::models::SyncRun;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Persistence seam shared by the synchronization engine and the record processor.
///
/// Every method is its own short unit of work; no implementation may hold a
/// transaction open across calls. Nothing is ever deleted.
#[async_trait]
pub trait OperationalDb: Send + Sync {
    // Clients (the status column is the work queue).

    /// Insert a `Pending` client. A clash on `external_id` must surface as `Error::DuplicateKey`.
    async fn insert_client(&self, client: &NewClient) -> Result<ClientId>;
    async fn get_client(&self, id: ClientId) -> Result<Option<ClientRecord>>;
    /// Oldest `Pending` client by creation time (ties broken by id), if any.
    async fn next_pending_client(&self) -> Result<Option<ClientRecord>>;
    /// Set the status and stamp `last_consulted_at`. Unknown ids are `Error::NotFound`.
    async fn set_consultation_status(&self, id: ClientId, status: ConsultationStatus)
    -> Result<()>;
    async fn count_clients_by_status(&self) -> Result<BTreeMap<ConsultationStatus, u64>>;
    /// Return every `Processing` client to `Pending`. Returns the number of rows moved.
    ///
    /// Only safe while no worker is mid-cycle, i.e. before the single worker starts.
    async fn requeue_in_flight(&self) -> Result<u64>;

    // Sync audit ledger.

    /// `1 + max(run_number)` for the process name, or 1 when none exist.
    async fn next_sync_run_number(&self, process_name: &str) -> Result<i64>;
    /// A clash on `(process_name, run_number)` must surface as `Error::DuplicateKey`.
    async fn append_sync_run(&self, run: &SyncRun) -> Result<()>;
    /// Newest run first.
    async fn list_sync_runs(&self, process_name: &str, limit: usize) -> Result<Vec<SyncRun>>;

    // Processing attempts.

    async fn create_process(&self, client_id: ClientId, job_id: &JobId) -> Result<ProcessRecord>;
    /// `finish.status` must be terminal; `Pending` is `Error::InvalidInput`.
    async fn finish_process(&self, id: ProcessId, finish: &ProcessFinish) -> Result<()>;
    async fn get_process(&self, id: ProcessId) -> Result<Option<ProcessRecord>>;
    async fn list_processes_for_client(&self, client_id: ClientId) -> Result<Vec<ProcessRecord>>;

    // Reports.

    async fn create_report(&self, report: &NewReport) -> Result<ReportRecord>;
    async fn list_reports_for_process(&self, process_id: ProcessId) -> Result<Vec<ReportRecord>>;
    /// Most recent report generated under `job_id`, if any.
    async fn find_report_by_job(&self, job_id: &JobId) -> Result<Option<ReportRecord>>;
}
