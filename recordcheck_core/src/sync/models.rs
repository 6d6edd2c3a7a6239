use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    /// Extraction succeeded and every record was inserted or recognised as a duplicate.
    Success,
    /// Extraction succeeded but at least one record failed to insert.
    Partial,
    /// Extraction itself failed; no records were processed.
    Error,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Success => "SUCCESS",
            SyncStatus::Partial => "PARTIAL",
            SyncStatus::Error => "ERROR",
        }
    }

    /// `true` for SUCCESS and PARTIAL.
    pub fn is_success(&self) -> bool {
        !matches!(self, SyncStatus::Error)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "SUCCESS" => Ok(SyncStatus::Success),
            "PARTIAL" => Ok(SyncStatus::Partial),
            "ERROR" => Ok(SyncStatus::Error),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown sync status: {other}"
            ))),
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCounts {
    pub fetched: u64,
    pub inserted: u64,
    pub duplicate: u64,
    pub error: u64,
}

/// Fully populated outcome of one `run_sync` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    pub process_name: String,
    pub run_number: i64,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_seconds: i64,
    pub counts: SyncCounts,
    pub status: SyncStatus,
    pub message: String,
    pub min_submission_date: Option<NaiveDate>,
    pub max_submission_date: Option<NaiveDate>,
    /// One line per record that failed to insert.
    pub error_details: Vec<String>,
}

impl SyncResult {
    pub fn to_run(&self) -> SyncRun {
        SyncRun {
            process_name: self.process_name.clone(),
            run_number: self.run_number,
            started_at: self.started_at,
            finished_at: self.finished_at,
            duration_seconds: self.duration_seconds,
            counts: self.counts,
            status: self.status,
            message: self.message.clone(),
            min_submission_date: self.min_submission_date,
            max_submission_date: self.max_submission_date,
            created_at: self.finished_at,
        }
    }
}

/// Immutable audit ledger row, one per synchronization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRun {
    pub process_name: String,
    pub run_number: i64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_seconds: i64,
    pub counts: SyncCounts,
    pub status: SyncStatus,
    pub message: String,
    pub min_submission_date: Option<NaiveDate>,
    pub max_submission_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}
