use crate::models::{NewClient, SourceRecord};
use crate::store::traits::OperationalDb;
use crate::sync::models::{SyncCounts, SyncResult, SyncRun, SyncStatus};
use crate::sync::traits::SourceExtractor;
use crate::{Error, Result};
use chrono::{NaiveDate, Utc};
use std::sync::Arc;

/// How many times the ledger write re-reserves a run number after a clash.
const LEDGER_RETRIES: usize = 5;

/// Idempotent ETL from the system of record into the client queue.
pub struct SyncEngine {
    db: Arc<dyn OperationalDb>,
    extractor: Arc<dyn SourceExtractor>,
    process_name: String,
}

impl SyncEngine {
    #[tracing::instrument(level = "debug", skip(db, extractor))]
    pub fn new(
        db: Arc<dyn OperationalDb>,
        extractor: Arc<dyn SourceExtractor>,
        process_name: impl Into<String> + std::fmt::Debug,
    ) -> Result<Self> {
        let process_name = process_name.into();
        if process_name.trim().is_empty() {
            return Err(Error::InvalidInput("process_name is empty".to_string()));
        }
        Ok(Self {
            db,
            extractor,
            process_name,
        })
    }

    pub fn process_name(&self) -> &str {
        &self.process_name
    }

    /// Synchronize `[date_from, date_to]` (inclusive).
    ///
    /// Always returns a fully populated result and always appends one audit
    /// row; `success` is false only when extraction itself failed.
    #[tracing::instrument(level = "info", skip(self), fields(process = %self.process_name))]
    pub async fn run_sync(&self, date_from: NaiveDate, date_to: NaiveDate) -> (bool, SyncResult) {
        let started_at = Utc::now();
        let run_number = match self.db.next_sync_run_number(&self.process_name).await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, "could not reserve run number; using 1");
                1
            }
        };

        let mut result = SyncResult {
            process_name: self.process_name.clone(),
            run_number,
            date_from,
            date_to,
            started_at,
            finished_at: started_at,
            duration_seconds: 0,
            counts: SyncCounts::default(),
            status: SyncStatus::Error,
            message: String::new(),
            min_submission_date: None,
            max_submission_date: None,
            error_details: Vec::new(),
        };

        match self.extract_and_load(date_from, date_to, &mut result).await {
            Ok(()) => {
                result.status = if result.counts.error == 0 {
                    SyncStatus::Success
                } else {
                    SyncStatus::Partial
                };
                result.message = summary_message(&result.counts);
            }
            Err(e) => {
                tracing::error!(error = %e, "sync extraction failed");
                result.status = SyncStatus::Error;
                result.message = e.to_string();
            }
        }

        result.finished_at = Utc::now();
        result.duration_seconds = (result.finished_at - result.started_at).num_seconds();
        self.record_run(&mut result).await;

        tracing::info!(
            run_number = result.run_number,
            status = %result.status,
            fetched = result.counts.fetched,
            inserted = result.counts.inserted,
            duplicate = result.counts.duplicate,
            error = result.counts.error,
            duration_seconds = result.duration_seconds,
            "sync run finished"
        );
        (result.status.is_success(), result)
    }

    /// Most recent runs for this process name, newest first.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn get_recent_runs(&self, count: usize) -> Result<Vec<SyncRun>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        self.db.list_sync_runs(&self.process_name, count).await
    }

    async fn extract_and_load(
        &self,
        date_from: NaiveDate,
        date_to: NaiveDate,
        result: &mut SyncResult,
    ) -> Result<()> {
        if date_from > date_to {
            return Err(Error::InvalidInput(format!(
                "date_from {date_from} is after date_to {date_to}"
            )));
        }

        let records = self.extractor.fetch(date_from, date_to).await?;
        result.counts.fetched = records.len() as u64;
        result.min_submission_date = records.iter().filter_map(|r| r.submitted_on).min();
        result.max_submission_date = records.iter().filter_map(|r| r.submitted_on).max();
        tracing::info!(
            extractor = self.extractor.id(),
            fetched = records.len(),
            "source records fetched"
        );

        for (idx, record) in records.into_iter().enumerate() {
            self.load_one(idx, record, result).await;
        }
        Ok(())
    }

    /// Insert one record; its outcome only ever touches its own counter.
    async fn load_one(&self, idx: usize, record: SourceRecord, result: &mut SyncResult) {
        let external_id = record.external_id;
        match self.db.insert_client(&NewClient::from(record)).await {
            Ok(_) => result.counts.inserted += 1,
            Err(e) if e.is_duplicate_key() => result.counts.duplicate += 1,
            Err(e) => {
                tracing::warn!(idx, ?external_id, error = %e, "record insert failed");
                result.counts.error += 1;
                let ext = external_id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "none".to_string());
                result
                    .error_details
                    .push(format!("record {idx} (external id {ext}): {e}"));
            }
        }
    }

    /// Append the audit row, re-reserving the run number if another run took it.
    /// Ledger failures are logged and never change the run's outcome.
    async fn record_run(&self, result: &mut SyncResult) {
        for attempt in 0..=LEDGER_RETRIES {
            match self.db.append_sync_run(&result.to_run()).await {
                Ok(()) => return,
                Err(e) if e.is_duplicate_key() && attempt < LEDGER_RETRIES => {
                    match self.db.next_sync_run_number(&self.process_name).await {
                        Ok(next) => {
                            tracing::warn!(
                                taken = result.run_number,
                                next,
                                "run number already recorded; re-reserving"
                            );
                            result.run_number = next.max(result.run_number + 1);
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "could not re-reserve run number");
                            return;
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(run_number = result.run_number, error = %e, "could not write sync audit row");
                    return;
                }
            }
        }
    }
}

fn summary_message(counts: &SyncCounts) -> String {
    if counts.fetched == 0 {
        "no records in range".to_string()
    } else if counts.error > 0 {
        format!("errors in {} records", counts.error)
    } else {
        format!("{} new, {} duplicates", counts.inserted, counts.duplicate)
    }
}
