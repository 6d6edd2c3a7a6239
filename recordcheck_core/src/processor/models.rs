use crate::models::{ClientId, ClientRecord, JobId, PartyIdentity, ProcessId, ReportId};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One case returned by the public-records lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseRecord {
    pub case_id: String,
    /// Filing timestamp as reported upstream (ISO 8601, usually UTC).
    pub filed_at: Option<String>,
    pub offense: Option<String>,
    /// Upstream payload, kept for the report.
    pub raw: serde_json::Value,
}

/// Three-way classification of a lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scenario", rename_all = "snake_case")]
pub enum LookupOutcome {
    /// Page 1 succeeded with items; `pages` is the last page that contributed items.
    ResultsFound { items: Vec<CaseRecord>, pages: u32 },
    /// Page 1 succeeded and was empty.
    NoResults,
    /// Page 1 failed; the state upstream is unknown.
    ApiError { reason: String },
}

impl LookupOutcome {
    pub fn items_found(&self) -> usize {
        match self {
            LookupOutcome::ResultsFound { items, .. } => items.len(),
            _ => 0,
        }
    }

    pub fn pages(&self) -> u32 {
        match self {
            LookupOutcome::ResultsFound { pages, .. } => *pages,
            _ => 0,
        }
    }

    pub fn is_api_error(&self) -> bool {
        matches!(self, LookupOutcome::ApiError { .. })
    }

    /// Alert label stored with the report.
    pub fn alert_kind(&self) -> &'static str {
        match self {
            LookupOutcome::ResultsFound { .. } => "judicial lookup (results found)",
            LookupOutcome::NoResults => "judicial lookup (no results)",
            LookupOutcome::ApiError { .. } => "judicial lookup (api error)",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessStatus {
    Pending,
    Completed,
    #[serde(rename = "Error_API")]
    ErrorApi,
    #[serde(rename = "Error_Total")]
    ErrorTotal,
}

impl ProcessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessStatus::Pending => "Pending",
            ProcessStatus::Completed => "Completed",
            ProcessStatus::ErrorApi => "Error_API",
            ProcessStatus::ErrorTotal => "Error_Total",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProcessStatus::Pending)
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Pending" => Ok(ProcessStatus::Pending),
            "Completed" => Ok(ProcessStatus::Completed),
            "Error_API" => Ok(ProcessStatus::ErrorApi),
            "Error_Total" => Ok(ProcessStatus::ErrorTotal),
            other => Err(Error::InvalidInput(format!(
                "unknown process status: {other}"
            ))),
        }
    }
}

/// One processing attempt for a client record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub id: ProcessId,
    pub client_id: ClientId,
    pub job_id: JobId,
    pub status: ProcessStatus,
    pub pages_requested: u32,
    pub pages_successful: u32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Terminal update applied to a `ProcessRecord`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessFinish {
    pub status: ProcessStatus,
    pub pages_successful: u32,
    pub error_message: Option<String>,
}

impl ProcessFinish {
    pub fn completed() -> Self {
        Self {
            status: ProcessStatus::Completed,
            pages_successful: 1,
            error_message: None,
        }
    }

    pub fn api_error(reason: impl Into<String>) -> Self {
        Self {
            status: ProcessStatus::ErrorApi,
            pages_successful: 0,
            error_message: Some(reason.into()),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: ProcessStatus::ErrorTotal,
            pages_successful: 0,
            error_message: Some(reason.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReport {
    pub job_id: JobId,
    pub client_id: ClientId,
    pub process_id: ProcessId,
    pub file_name: String,
    pub file_path: String,
    pub size_bytes: u64,
    pub file_kind: String,
    pub generated_ok: bool,
    pub items_found: u32,
    pub pages: u32,
    pub alert_kind: String,
}

/// Metadata of a persisted report artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRecord {
    pub id: ReportId,
    pub job_id: JobId,
    pub client_id: ClientId,
    pub process_id: ProcessId,
    pub file_name: String,
    pub file_path: String,
    pub size_bytes: u64,
    pub file_kind: String,
    pub generated_ok: bool,
    pub items_found: u32,
    pub pages: u32,
    pub alert_kind: String,
    pub generated_at: DateTime<Utc>,
}

/// Party details printed in a report header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientMetadata {
    pub client_id: ClientId,
    pub holder_name: String,
    pub holder_national_id: Option<String>,
    pub spouse_name: Option<String>,
    pub spouse_national_id: Option<String>,
    pub co_signer_name: Option<String>,
    pub co_signer_national_id: Option<String>,
}

impl ClientMetadata {
    pub fn from_client(client: &ClientRecord, holder_name: &str) -> Self {
        fn id_of(p: &PartyIdentity) -> Option<String> {
            p.national_id
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        }
        Self {
            client_id: client.id,
            holder_name: holder_name.to_string(),
            holder_national_id: id_of(&client.applicant),
            spouse_name: client.spouse.display_name(),
            spouse_national_id: id_of(&client.spouse),
            co_signer_name: client.co_signer.display_name(),
            co_signer_national_id: id_of(&client.co_signer),
        }
    }
}

/// Result of a single processor cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// No pending client was found.
    Idle,
    /// The client has no usable name and was marked `Error`.
    InvalidIdentity { client_id: ClientId },
    /// Lookup succeeded; the client is `Processed`.
    Processed {
        client_id: ClientId,
        process_id: ProcessId,
        items_found: usize,
        report_id: Option<ReportId>,
    },
    /// Lookup returned an API error; the client is back to `Pending`.
    RetryScheduled {
        client_id: ClientId,
        process_id: ProcessId,
        reason: String,
    },
    /// The process record could not be created; the client is back to `Pending`.
    Deferred { client_id: ClientId, reason: String },
    /// An unexpected failure; the client is back to `Pending` and the process is `Error_Total`.
    Failed {
        client_id: ClientId,
        process_id: ProcessId,
        reason: String,
    },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessorState {
    Running,
    Stopped,
}

/// Reply to `start()` / `stop()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlResponse {
    pub success: bool,
    pub message: String,
    pub state: ProcessorState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorStatus {
    pub running: bool,
    pub worker_alive: bool,
    pub timestamp: DateTime<Utc>,
}
