use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::traits::OperationalDb;
use crate::models::{
    ClientId, ClientRecord, ConsultationStatus, JobId, NewClient, ProcessId, ReportId,
};
use crate::processor::models::{
    NewReport, ProcessFinish, ProcessRecord, ProcessStatus, ReportRecord,
};
use crate::sync::models::SyncRun;
use crate::{Error, Result};

#[derive(Default)]
struct State {
    clients: Vec<ClientRecord>,
    sync_runs: Vec<SyncRun>,
    processes: Vec<ProcessRecord>,
    reports: Vec<ReportRecord>,
}

/// In-memory OperationalDb for local development and unit tests.
///
/// Enforces the same uniqueness rules as the SQLite store (external id, run
/// number per process name, job id).
#[derive(Clone, Default)]
pub struct MemoryOperationalDb {
    state: Arc<Mutex<State>>,
}

impl MemoryOperationalDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all clients (primarily for tests).
    pub async fn all_clients(&self) -> Vec<ClientRecord> {
        self.state.lock().await.clients.clone()
    }

    /// Snapshot of all reports (primarily for tests).
    pub async fn all_reports(&self) -> Vec<ReportRecord> {
        self.state.lock().await.reports.clone()
    }
}

#[async_trait]
impl OperationalDb for MemoryOperationalDb {
    async fn insert_client(&self, client: &NewClient) -> Result<ClientId> {
        let mut state = self.state.lock().await;
        if let Some(ext) = client.external_id {
            if state.clients.iter().any(|c| c.external_id == Some(ext)) {
                return Err(Error::DuplicateKey(format!("client external_id {ext}")));
            }
        }
        let id = ClientId(state.clients.len() as i64 + 1);
        state.clients.push(ClientRecord {
            id,
            external_id: client.external_id,
            submitted_on: client.submitted_on,
            status_code: client.status_code.clone(),
            branch: client.branch.clone(),
            product_id: client.product_id,
            product: client.product.clone(),
            applicant: client.applicant.clone(),
            marital_status: client.marital_status.clone(),
            spouse: client.spouse.clone(),
            co_signer: client.co_signer.clone(),
            consultation_status: ConsultationStatus::Pending,
            created_at: Utc::now(),
            last_consulted_at: None,
        });
        Ok(id)
    }

    async fn get_client(&self, id: ClientId) -> Result<Option<ClientRecord>> {
        let state = self.state.lock().await;
        Ok(state.clients.iter().find(|c| c.id == id).cloned())
    }

    async fn next_pending_client(&self) -> Result<Option<ClientRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .clients
            .iter()
            .filter(|c| c.consultation_status == ConsultationStatus::Pending)
            .min_by_key(|c| (c.created_at, c.id))
            .cloned())
    }

    async fn set_consultation_status(
        &self,
        id: ClientId,
        status: ConsultationStatus,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let client = state
            .clients
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| Error::NotFound(format!("client {id}")))?;
        client.consultation_status = status;
        client.last_consulted_at = Some(Utc::now());
        Ok(())
    }

    async fn count_clients_by_status(&self) -> Result<BTreeMap<ConsultationStatus, u64>> {
        let state = self.state.lock().await;
        let mut out = BTreeMap::new();
        for c in &state.clients {
            *out.entry(c.consultation_status).or_insert(0) += 1;
        }
        Ok(out)
    }

    async fn requeue_in_flight(&self) -> Result<u64> {
        let mut state = self.state.lock().await;
        let mut moved = 0;
        for c in state
            .clients
            .iter_mut()
            .filter(|c| c.consultation_status == ConsultationStatus::Processing)
        {
            c.consultation_status = ConsultationStatus::Pending;
            moved += 1;
        }
        Ok(moved)
    }

    async fn next_sync_run_number(&self, process_name: &str) -> Result<i64> {
        let state = self.state.lock().await;
        Ok(state
            .sync_runs
            .iter()
            .filter(|r| r.process_name == process_name)
            .map(|r| r.run_number)
            .max()
            .unwrap_or(0)
            + 1)
    }

    async fn append_sync_run(&self, run: &SyncRun) -> Result<()> {
        let mut state = self.state.lock().await;
        if state
            .sync_runs
            .iter()
            .any(|r| r.process_name == run.process_name && r.run_number == run.run_number)
        {
            return Err(Error::DuplicateKey(format!(
                "sync run {}#{}",
                run.process_name, run.run_number
            )));
        }
        state.sync_runs.push(run.clone());
        Ok(())
    }

    async fn list_sync_runs(&self, process_name: &str, limit: usize) -> Result<Vec<SyncRun>> {
        let state = self.state.lock().await;
        let mut runs: Vec<SyncRun> = state
            .sync_runs
            .iter()
            .filter(|r| r.process_name == process_name)
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.run_number.cmp(&a.run_number));
        runs.truncate(limit);
        Ok(runs)
    }

    async fn create_process(&self, client_id: ClientId, job_id: &JobId) -> Result<ProcessRecord> {
        let mut state = self.state.lock().await;
        if !state.clients.iter().any(|c| c.id == client_id) {
            return Err(Error::NotFound(format!("client {client_id}")));
        }
        if state.processes.iter().any(|p| &p.job_id == job_id) {
            return Err(Error::DuplicateKey(format!("process job_id {job_id}")));
        }
        let record = ProcessRecord {
            id: ProcessId(state.processes.len() as i64 + 1),
            client_id,
            job_id: job_id.clone(),
            status: ProcessStatus::Pending,
            pages_requested: 1,
            pages_successful: 0,
            error_message: None,
            created_at: Utc::now(),
            finished_at: None,
        };
        state.processes.push(record.clone());
        Ok(record)
    }

    async fn finish_process(&self, id: ProcessId, finish: &ProcessFinish) -> Result<()> {
        if !finish.status.is_terminal() {
            return Err(Error::InvalidInput(format!(
                "process {id} cannot finish as {}",
                finish.status
            )));
        }
        let mut state = self.state.lock().await;
        let process = state
            .processes
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| Error::NotFound(format!("process {id}")))?;
        process.status = finish.status;
        process.pages_successful = finish.pages_successful;
        process.error_message = finish.error_message.clone();
        process.finished_at = Some(Utc::now());
        Ok(())
    }

    async fn get_process(&self, id: ProcessId) -> Result<Option<ProcessRecord>> {
        let state = self.state.lock().await;
        Ok(state.processes.iter().find(|p| p.id == id).cloned())
    }

    async fn list_processes_for_client(&self, client_id: ClientId) -> Result<Vec<ProcessRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .processes
            .iter()
            .filter(|p| p.client_id == client_id)
            .cloned()
            .collect())
    }

    async fn create_report(&self, report: &NewReport) -> Result<ReportRecord> {
        let mut state = self.state.lock().await;
        if !state.processes.iter().any(|p| p.id == report.process_id) {
            return Err(Error::NotFound(format!("process {}", report.process_id)));
        }
        let record = ReportRecord {
            id: ReportId(state.reports.len() as i64 + 1),
            job_id: report.job_id.clone(),
            client_id: report.client_id,
            process_id: report.process_id,
            file_name: report.file_name.clone(),
            file_path: report.file_path.clone(),
            size_bytes: report.size_bytes,
            file_kind: report.file_kind.clone(),
            generated_ok: report.generated_ok,
            items_found: report.items_found,
            pages: report.pages,
            alert_kind: report.alert_kind.clone(),
            generated_at: Utc::now(),
        };
        state.reports.push(record.clone());
        Ok(record)
    }

    async fn list_reports_for_process(&self, process_id: ProcessId) -> Result<Vec<ReportRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .reports
            .iter()
            .filter(|r| r.process_id == process_id)
            .cloned()
            .collect())
    }

    async fn find_report_by_job(&self, job_id: &JobId) -> Result<Option<ReportRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .reports
            .iter()
            .rev()
            .find(|r| &r.job_id == job_id)
            .cloned())
    }
}
