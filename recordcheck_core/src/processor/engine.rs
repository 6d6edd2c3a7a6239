use crate::Result;
use crate::config::ProcessorConfig;
use crate::models::{ClientId, ClientRecord, ConsultationStatus, JobId, ProcessId, ReportId};
use crate::processor::models::{
    ClientMetadata, ControlResponse, CycleOutcome, LookupOutcome, NewReport, ProcessFinish,
    ProcessRecord, ProcessorState, ProcessorStatus,
};
use crate::processor::search_name::build_search_name;
use crate::processor::traits::{LookupService, ReportRenderer, ReportRequest};
use crate::store::traits::OperationalDb;
use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Default)]
struct Control {
    running: bool,
    stop_tx: Option<watch::Sender<bool>>,
    worker: Option<JoinHandle<()>>,
}

/// What the current cycle has claimed, so a panicking cycle can be undone.
#[derive(Debug, Copy, Clone)]
struct InFlight {
    client_id: ClientId,
    process_id: Option<ProcessId>,
}

/// Single background worker draining the `Pending` client queue one record at a time.
///
/// The control mutex guards only the running flag and worker handle; cycle
/// bodies never run under it.
pub struct RecordProcessor {
    db: Arc<dyn OperationalDb>,
    lookup: Arc<dyn LookupService>,
    renderer: Arc<dyn ReportRenderer>,
    config: ProcessorConfig,
    control: Mutex<Control>,
    in_flight: Mutex<Option<InFlight>>,
}

impl RecordProcessor {
    #[tracing::instrument(level = "debug", skip(db, lookup, renderer))]
    pub fn new(
        db: Arc<dyn OperationalDb>,
        lookup: Arc<dyn LookupService>,
        renderer: Arc<dyn ReportRenderer>,
        config: ProcessorConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            db,
            lookup,
            renderer,
            config,
            control: Mutex::new(Control::default()),
            in_flight: Mutex::new(None),
        })
    }

    fn control(&self) -> MutexGuard<'_, Control> {
        // The guarded state stays consistent even if a holder panicked.
        self.control
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn in_flight(&self) -> MutexGuard<'_, Option<InFlight>> {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start the worker. Fails without side effects if already running.
    ///
    /// A worker left over from a previous `stop()` is awaited before the new
    /// one begins, so at most one cycle is ever in flight. Clients left
    /// `Processing` by an interrupted run are returned to `Pending` first.
    #[tracing::instrument(level = "info", skip(self))]
    pub fn start(self: &Arc<Self>) -> ControlResponse {
        let mut control = self.control();
        if control.running {
            return ControlResponse {
                success: false,
                message: "processor already running".to_string(),
                state: ProcessorState::Running,
            };
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let previous = control.worker.take();
        let this = Arc::clone(self);
        control.worker = Some(tokio::spawn(async move {
            if let Some(previous) = previous {
                if let Err(e) = previous.await {
                    tracing::error!(error = %e, "previous record processor worker ended abnormally");
                }
            }
            this.worker_loop(stop_rx).await;
        }));
        control.stop_tx = Some(stop_tx);
        control.running = true;

        tracing::info!("record processor started");
        ControlResponse {
            success: true,
            message: "processor started".to_string(),
            state: ProcessorState::Running,
        }
    }

    /// Signal the worker to stop. An in-flight cycle finishes; no new cycle starts.
    #[tracing::instrument(level = "info", skip(self))]
    pub fn stop(&self) -> ControlResponse {
        let mut control = self.control();
        if !control.running {
            return ControlResponse {
                success: false,
                message: "processor not running".to_string(),
                state: ProcessorState::Stopped,
            };
        }

        if let Some(tx) = control.stop_tx.take() {
            let _ = tx.send(true);
        }
        control.running = false;

        tracing::info!("record processor stop requested");
        ControlResponse {
            success: true,
            message: "processor stopped".to_string(),
            state: ProcessorState::Stopped,
        }
    }

    pub fn status(&self) -> ProcessorStatus {
        let control = self.control();
        ProcessorStatus {
            running: control.running,
            worker_alive: control
                .worker
                .as_ref()
                .map(|h| !h.is_finished())
                .unwrap_or(false),
            timestamp: Utc::now(),
        }
    }

    /// Wait for the current worker task to exit. Call after `stop()`.
    pub async fn join(&self) {
        let worker = self.control().worker.take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "record processor worker ended abnormally");
            }
        }
    }

    async fn worker_loop(self: Arc<Self>, mut stop_rx: watch::Receiver<bool>) {
        tracing::info!("record processor worker running");
        match self.db.requeue_in_flight().await {
            Ok(0) => {}
            Ok(requeued) => tracing::warn!(requeued, "interrupted clients returned to Pending"),
            Err(e) => tracing::error!(error = %e, "could not requeue interrupted clients"),
        }
        while !*stop_rx.borrow() {
            // Each cycle runs in its own task so a panic is contained like any other failure.
            let this = Arc::clone(&self);
            let pause = match tokio::spawn(async move { this.run_cycle().await }).await {
                Ok(Ok(outcome)) => {
                    log_outcome(&outcome);
                    self.config.cycle_interval
                }
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "processor cycle failed; backing off");
                    self.config.error_backoff
                }
                Err(e) => {
                    tracing::error!(error = %e, "processor cycle panicked; backing off");
                    self.release_abandoned().await;
                    self.config.error_backoff
                }
            };
            if self.pause(pause, &mut stop_rx).await {
                break;
            }
        }
        tracing::info!("record processor worker exited");
    }

    /// Undo the claim of a cycle that never returned: requeue its client and
    /// close its process as `Error_Total`.
    async fn release_abandoned(&self) {
        let Some(claim) = self.in_flight().take() else {
            return;
        };
        self.requeue(claim.client_id).await;
        if let Some(process_id) = claim.process_id {
            if let Err(e) = self
                .db
                .finish_process(process_id, &ProcessFinish::failed("cycle panicked"))
                .await
            {
                tracing::error!(%process_id, error = %e, "could not mark process Error_Total");
            }
        }
    }

    /// Sleep for `total`, re-checking the stop flag at least every `stop_poll`.
    /// Returns `true` when stop was requested.
    async fn pause(&self, total: Duration, stop_rx: &mut watch::Receiver<bool>) -> bool {
        let deadline = Instant::now() + total;
        loop {
            if *stop_rx.borrow() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let step = self.config.stop_poll.min(deadline - now);
            tokio::select! {
                changed = stop_rx.changed() => {
                    if changed.is_err() {
                        return true;
                    }
                }
                _ = tokio::time::sleep(step) => {}
            }
        }
    }

    /// Process at most one pending client.
    ///
    /// Per-record failures are reported as `CycleOutcome` values; `Err` is
    /// returned only when the queue itself could not be read or updated.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        let outcome = self.cycle().await;
        *self.in_flight() = None;
        outcome
    }

    async fn cycle(&self) -> Result<CycleOutcome> {
        let Some(client) = self.db.next_pending_client().await? else {
            return Ok(CycleOutcome::Idle);
        };
        let client_id = client.id;

        let Some(search_name) = build_search_name(
            client.applicant.last_names.as_deref(),
            client.applicant.first_names.as_deref(),
        ) else {
            self.db
                .set_consultation_status(client_id, ConsultationStatus::Error)
                .await?;
            return Ok(CycleOutcome::InvalidIdentity { client_id });
        };

        self.db
            .set_consultation_status(client_id, ConsultationStatus::Processing)
            .await?;
        *self.in_flight() = Some(InFlight {
            client_id,
            process_id: None,
        });

        let job_id = JobId::generate();
        let process = match self.db.create_process(client_id, &job_id).await {
            Ok(process) => {
                *self.in_flight() = Some(InFlight {
                    client_id,
                    process_id: Some(process.id),
                });
                process
            }
            Err(e) => {
                tracing::warn!(%client_id, error = %e, "could not create process record");
                self.requeue(client_id).await;
                return Ok(CycleOutcome::Deferred {
                    client_id,
                    reason: e.to_string(),
                });
            }
        };

        match self.consult(&client, &search_name, &process).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                tracing::error!(%client_id, job_id = %process.job_id, error = ?e, "processing failed");
                self.requeue(client_id).await;
                let reason = e.to_string();
                if let Err(e) = self
                    .db
                    .finish_process(process.id, &ProcessFinish::failed(reason.clone()))
                    .await
                {
                    tracing::error!(process_id = %process.id, error = %e, "could not mark process Error_Total");
                }
                Ok(CycleOutcome::Failed {
                    client_id,
                    process_id: process.id,
                    reason,
                })
            }
        }
    }

    #[tracing::instrument(level = "info", skip(self, client, process), fields(client_id = %client.id, job_id = %process.job_id))]
    async fn consult(
        &self,
        client: &ClientRecord,
        search_name: &str,
        process: &ProcessRecord,
    ) -> Result<CycleOutcome> {
        let consulted_at = Utc::now();
        let outcome = self.lookup.lookup(search_name).await;

        if let LookupOutcome::ApiError { reason } = &outcome {
            self.db
                .set_consultation_status(client.id, ConsultationStatus::Pending)
                .await?;
            self.db
                .finish_process(process.id, &ProcessFinish::api_error(reason.clone()))
                .await?;
            return Ok(CycleOutcome::RetryScheduled {
                client_id: client.id,
                process_id: process.id,
                reason: reason.clone(),
            });
        }

        let report_id = self
            .save_report(client, search_name, process, &outcome, consulted_at)
            .await;
        self.db
            .finish_process(process.id, &ProcessFinish::completed())
            .await?;
        self.db
            .set_consultation_status(client.id, ConsultationStatus::Processed)
            .await?;

        Ok(CycleOutcome::Processed {
            client_id: client.id,
            process_id: process.id,
            items_found: outcome.items_found(),
            report_id,
        })
    }

    /// Render and record the report. Failures are logged and never change the outcome.
    async fn save_report(
        &self,
        client: &ClientRecord,
        search_name: &str,
        process: &ProcessRecord,
        outcome: &LookupOutcome,
        consulted_at: chrono::DateTime<Utc>,
    ) -> Option<ReportId> {
        let metadata = ClientMetadata::from_client(client, search_name);
        let request = ReportRequest {
            job_id: &process.job_id,
            search_name,
            outcome,
            client: &metadata,
            consulted_at,
        };
        let rendered = match self.renderer.render(&request).await {
            Ok(rendered) => rendered,
            Err(e) => {
                tracing::warn!(error = %e, "report rendering failed");
                return None;
            }
        };

        let report = NewReport {
            job_id: process.job_id.clone(),
            client_id: client.id,
            process_id: process.id,
            file_name: rendered.file_name(),
            file_path: rendered.path.to_string_lossy().into_owned(),
            size_bytes: rendered.size_bytes,
            file_kind: rendered.file_kind.clone(),
            generated_ok: true,
            items_found: u32::try_from(outcome.items_found()).unwrap_or(u32::MAX),
            pages: outcome.pages(),
            alert_kind: outcome.alert_kind().to_string(),
        };
        match self.db.create_report(&report).await {
            Ok(record) => Some(record.id),
            Err(e) => {
                tracing::warn!(path = %report.file_path, error = %e, "report metadata not recorded");
                None
            }
        }
    }

    async fn requeue(&self, client_id: ClientId) {
        if let Err(e) = self
            .db
            .set_consultation_status(client_id, ConsultationStatus::Pending)
            .await
        {
            tracing::error!(%client_id, error = %e, "could not return client to Pending");
        }
    }
}

fn log_outcome(outcome: &CycleOutcome) {
    match outcome {
        CycleOutcome::Idle => tracing::debug!("no pending clients"),
        CycleOutcome::InvalidIdentity { client_id } => {
            tracing::warn!(%client_id, "client has no searchable name; marked Error")
        }
        CycleOutcome::Processed {
            client_id,
            items_found,
            ..
        } => tracing::info!(%client_id, items_found, "client processed"),
        CycleOutcome::RetryScheduled {
            client_id, reason, ..
        } => tracing::warn!(%client_id, %reason, "lookup unavailable; client requeued"),
        CycleOutcome::Deferred { client_id, reason } => {
            tracing::warn!(%client_id, %reason, "cycle deferred; client requeued")
        }
        CycleOutcome::Failed {
            client_id, reason, ..
        } => tracing::error!(%client_id, %reason, "cycle failed; client requeued"),
    }
}
