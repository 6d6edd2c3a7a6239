use crate::Result;
use crate::models::JobId;
use crate::processor::models::{CaseRecord, ClientMetadata, LookupOutcome};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// Classified public-records lookup by defendant name.
#[async_trait]
pub trait LookupService: Send + Sync {
    /// Never fails: transport and upstream failures are reported as `LookupOutcome::ApiError`.
    async fn lookup(&self, name: &str) -> LookupOutcome;
}

/// Fetches a single page of the remote search.
///
/// `Ok(vec![])` means the upstream answered successfully with no items; any
/// transport error, non-2xx status or malformed body must be an `Err`.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, name: &str, page: u32) -> Result<Vec<CaseRecord>>;
}

/// Input handed to a `ReportRenderer`.
#[derive(Debug, Clone)]
pub struct ReportRequest<'a> {
    pub job_id: &'a JobId,
    pub search_name: &'a str,
    pub outcome: &'a LookupOutcome,
    pub client: &'a ClientMetadata,
    pub consulted_at: DateTime<Utc>,
}

/// A persisted artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedReport {
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Short format tag stored with the report row, e.g. "TXT".
    pub file_kind: String,
}

impl RenderedReport {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[async_trait]
pub trait ReportRenderer: Send + Sync {
    async fn render(&self, request: &ReportRequest<'_>) -> Result<RenderedReport>;
}
