#![cfg(test)]

use crate::models::{
    ClientId, ClientRecord, ConsultationStatus, JobId, NewClient, PartyIdentity, ProcessId,
    SourceRecord,
};
use crate::processor::models::{
    CaseRecord, LookupOutcome, NewReport, ProcessFinish, ProcessRecord, ProcessStatus,
    ReportRecord,
};
use crate::processor::traits::{
    LookupService, PageFetcher, RenderedReport, ReportRenderer, ReportRequest,
};
use crate::store::memory::MemoryOperationalDb;
use crate::store::traits::OperationalDb;
use crate::sync::models::{SyncCounts, SyncRun, SyncStatus};
use crate::sync::traits::SourceExtractor;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub(crate) fn source_record(external_id: i64, last: &str, first: &str) -> SourceRecord {
    SourceRecord {
        external_id: Some(external_id),
        submitted_on: NaiveDate::from_ymd_opt(2025, 9, 29),
        status_code: Some("T".to_string()),
        branch: Some("MATRIZ".to_string()),
        product_id: Some(3),
        product: Some("CONSUMO".to_string()),
        applicant: PartyIdentity::new(
            Some(format!("17{external_id:08}")),
            Some(first.to_string()),
            Some(last.to_string()),
        ),
        marital_status: Some("CASADO".to_string()),
        spouse: PartyIdentity::new(
            Some("0912345678".to_string()),
            Some("MARIA".to_string()),
            Some("TORRES".to_string()),
        ),
        co_signer: PartyIdentity::default(),
    }
}

pub(crate) fn sync_run(process_name: &str, run_number: i64) -> SyncRun {
    let now = Utc::now();
    SyncRun {
        process_name: process_name.to_string(),
        run_number,
        started_at: now,
        finished_at: now,
        duration_seconds: 0,
        counts: SyncCounts::default(),
        status: SyncStatus::Success,
        message: "no records in range".to_string(),
        min_submission_date: None,
        max_submission_date: None,
        created_at: now,
    }
}

pub(crate) fn case(id: &str) -> CaseRecord {
    CaseRecord {
        case_id: id.to_string(),
        filed_at: Some("2025-11-17T00:00:00Z".to_string()),
        offense: Some("ESTAFA".to_string()),
        raw: serde_json::json!({ "idJuicio": id }),
    }
}

/// Extractor returning a fixed batch (or a fixed failure) and recording calls.
pub(crate) struct StaticExtractor {
    records: Vec<SourceRecord>,
    failure: Option<String>,
    ranges: Mutex<Vec<(NaiveDate, NaiveDate)>>,
}

impl StaticExtractor {
    pub(crate) fn new(records: Vec<SourceRecord>) -> Self {
        Self {
            records,
            failure: None,
            ranges: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing(message: &str) -> Self {
        Self {
            records: Vec::new(),
            failure: Some(message.to_string()),
            ranges: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.ranges.lock().unwrap().len()
    }

    pub(crate) fn ranges(&self) -> Vec<(NaiveDate, NaiveDate)> {
        self.ranges.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceExtractor for StaticExtractor {
    fn id(&self) -> &'static str {
        "static"
    }

    async fn fetch(&self, date_from: NaiveDate, date_to: NaiveDate) -> Result<Vec<SourceRecord>> {
        self.ranges.lock().unwrap().push((date_from, date_to));
        match &self.failure {
            Some(msg) => Err(Error::BackendMessage(msg.clone())),
            None => Ok(self.records.clone()),
        }
    }
}

/// Page fetcher replaying scripted pages; pages past the script are empty.
pub(crate) struct ScriptedPages {
    pages: Mutex<VecDeque<Result<Vec<CaseRecord>>>>,
    requested: Mutex<Vec<u32>>,
}

impl ScriptedPages {
    pub(crate) fn new(pages: Vec<Result<Vec<CaseRecord>>>) -> Self {
        Self {
            pages: Mutex::new(pages.into()),
            requested: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn requested_pages(&self) -> Vec<u32> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for ScriptedPages {
    async fn fetch_page(&self, _name: &str, page: u32) -> Result<Vec<CaseRecord>> {
        self.requested.lock().unwrap().push(page);
        self.pages.lock().unwrap().pop_front().unwrap_or(Ok(Vec::new()))
    }
}

/// Lookup replaying queued outcomes; `NoResults` once the queue is empty.
#[derive(Default)]
pub(crate) struct ScriptedLookup {
    outcomes: Mutex<VecDeque<LookupOutcome>>,
    names: Mutex<Vec<String>>,
}

impl ScriptedLookup {
    pub(crate) fn push(&self, outcome: LookupOutcome) {
        self.outcomes.lock().unwrap().push_back(outcome);
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.names.lock().unwrap().clone()
    }
}

#[async_trait]
impl LookupService for ScriptedLookup {
    async fn lookup(&self, name: &str) -> LookupOutcome {
        self.names.lock().unwrap().push(name.to_string());
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(LookupOutcome::NoResults)
    }
}

/// Lookup that panics mid-cycle, after the client and process have been claimed.
pub(crate) struct PanickingLookup;

#[async_trait]
impl LookupService for PanickingLookup {
    async fn lookup(&self, name: &str) -> LookupOutcome {
        panic!("lookup blew up for {name}");
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RenderCall {
    pub job_id: JobId,
    pub search_name: String,
    pub items_found: usize,
}

/// Renderer that writes nothing and records what it was asked to render.
#[derive(Default)]
pub(crate) struct RecordingRenderer {
    calls: Mutex<Vec<RenderCall>>,
    fail_next: AtomicBool,
}

impl RecordingRenderer {
    pub(crate) fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub(crate) fn requests(&self) -> Vec<RenderCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReportRenderer for RecordingRenderer {
    async fn render(&self, request: &ReportRequest<'_>) -> Result<RenderedReport> {
        self.calls.lock().unwrap().push(RenderCall {
            job_id: request.job_id.clone(),
            search_name: request.search_name.to_string(),
            items_found: request.outcome.items_found(),
        });
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(Error::BackendMessage("disk full".to_string()));
        }
        Ok(RenderedReport {
            path: PathBuf::from(format!("/reports/report_{}.txt", request.job_id)),
            size_bytes: 256,
            file_kind: "TXT".to_string(),
        })
    }
}

/// Store wrapper that injects failures into selected operations.
pub(crate) struct FaultyDb {
    inner: MemoryOperationalDb,
    fail_create_process: AtomicBool,
    fail_finish_completed: AtomicBool,
    fail_append_sync_run: AtomicBool,
    steal_next_run_number: AtomicBool,
    fail_inserts: Mutex<HashSet<i64>>,
    fail_next_pending: AtomicBool,
    pending_polls: AtomicUsize,
}

impl FaultyDb {
    pub(crate) fn new(inner: MemoryOperationalDb) -> Self {
        Self {
            inner,
            fail_create_process: AtomicBool::new(false),
            fail_finish_completed: AtomicBool::new(false),
            fail_append_sync_run: AtomicBool::new(false),
            steal_next_run_number: AtomicBool::new(false),
            fail_inserts: Mutex::new(HashSet::new()),
            fail_next_pending: AtomicBool::new(false),
            pending_polls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn fail_create_process(&self, on: bool) {
        self.fail_create_process.store(on, Ordering::SeqCst);
    }

    /// Fail `finish_process` when it would mark the process `Completed`.
    pub(crate) fn fail_finish_completed(&self, on: bool) {
        self.fail_finish_completed.store(on, Ordering::SeqCst);
    }

    pub(crate) fn fail_append_sync_run(&self, on: bool) {
        self.fail_append_sync_run.store(on, Ordering::SeqCst);
    }

    /// Simulate a concurrent run taking the next run number just before the ledger write.
    pub(crate) fn steal_next_run_number(&self, on: bool) {
        self.steal_next_run_number.store(on, Ordering::SeqCst);
    }

    pub(crate) fn fail_insert_for(&self, external_id: i64) {
        self.fail_inserts.lock().unwrap().insert(external_id);
    }

    /// Make every `next_pending_client` call fail, as if the queue were unreadable.
    pub(crate) fn fail_next_pending(&self, on: bool) {
        self.fail_next_pending.store(on, Ordering::SeqCst);
    }

    /// Number of `next_pending_client` calls so far (one per cycle).
    pub(crate) fn pending_polls(&self) -> usize {
        self.pending_polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OperationalDb for FaultyDb {
    async fn insert_client(&self, client: &NewClient) -> Result<ClientId> {
        let fail = client
            .external_id
            .map(|id| self.fail_inserts.lock().unwrap().contains(&id))
            .unwrap_or(false);
        if fail {
            return Err(Error::BackendMessage("value too long for column".to_string()));
        }
        self.inner.insert_client(client).await
    }

    async fn get_client(&self, id: ClientId) -> Result<Option<ClientRecord>> {
        self.inner.get_client(id).await
    }

    async fn next_pending_client(&self) -> Result<Option<ClientRecord>> {
        self.pending_polls.fetch_add(1, Ordering::SeqCst);
        if self.fail_next_pending.load(Ordering::SeqCst) {
            return Err(Error::BackendMessage("database is locked".to_string()));
        }
        self.inner.next_pending_client().await
    }

    async fn set_consultation_status(
        &self,
        id: ClientId,
        status: ConsultationStatus,
    ) -> Result<()> {
        self.inner.set_consultation_status(id, status).await
    }

    async fn count_clients_by_status(&self) -> Result<BTreeMap<ConsultationStatus, u64>> {
        self.inner.count_clients_by_status().await
    }

    async fn requeue_in_flight(&self) -> Result<u64> {
        self.inner.requeue_in_flight().await
    }

    async fn next_sync_run_number(&self, process_name: &str) -> Result<i64> {
        self.inner.next_sync_run_number(process_name).await
    }

    async fn append_sync_run(&self, run: &SyncRun) -> Result<()> {
        if self.fail_append_sync_run.load(Ordering::SeqCst) {
            return Err(Error::BackendMessage("database is locked".to_string()));
        }
        if self.steal_next_run_number.swap(false, Ordering::SeqCst) {
            self.inner
                .append_sync_run(&sync_run(&run.process_name, run.run_number))
                .await?;
        }
        self.inner.append_sync_run(run).await
    }

    async fn list_sync_runs(&self, process_name: &str, limit: usize) -> Result<Vec<SyncRun>> {
        self.inner.list_sync_runs(process_name, limit).await
    }

    async fn create_process(&self, client_id: ClientId, job_id: &JobId) -> Result<ProcessRecord> {
        if self.fail_create_process.load(Ordering::SeqCst) {
            return Err(Error::BackendMessage("connection reset".to_string()));
        }
        self.inner.create_process(client_id, job_id).await
    }

    async fn finish_process(&self, id: ProcessId, finish: &ProcessFinish) -> Result<()> {
        if finish.status == ProcessStatus::Completed
            && self.fail_finish_completed.load(Ordering::SeqCst)
        {
            return Err(Error::BackendMessage("disk I/O error".to_string()));
        }
        self.inner.finish_process(id, finish).await
    }

    async fn get_process(&self, id: ProcessId) -> Result<Option<ProcessRecord>> {
        self.inner.get_process(id).await
    }

    async fn list_processes_for_client(&self, client_id: ClientId) -> Result<Vec<ProcessRecord>> {
        self.inner.list_processes_for_client(client_id).await
    }

    async fn create_report(&self, report: &NewReport) -> Result<ReportRecord> {
        self.inner.create_report(report).await
    }

    async fn list_reports_for_process(&self, process_id: ProcessId) -> Result<Vec<ReportRecord>> {
        self.inner.list_reports_for_process(process_id).await
    }

    async fn find_report_by_job(&self, job_id: &JobId) -> Result<Option<ReportRecord>> {
        self.inner.find_report_by_job(job_id).await
    }
}
