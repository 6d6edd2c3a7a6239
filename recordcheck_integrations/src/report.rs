//! Plain-text report files, one per successful lookup.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use recordcheck_core::config::ReportConfig;
use recordcheck_core::{
    CaseRecord, Error, LookupOutcome, RenderedReport, ReportRenderer,
    ReportRequest, Result,
};
use std::fmt::Write as _;
use std::path::PathBuf;
use tracing::instrument;

const NOT_AVAILABLE: &str = "N/A";

pub struct FileReportRenderer {
    output_dir: PathBuf,
    offset: FixedOffset,
}

impl FileReportRenderer {
    pub fn new(config: &ReportConfig) -> Result<Self> {
        let offset = FixedOffset::east_opt(config.utc_offset_minutes * 60).ok_or_else(|| {
            Error::InvalidInput(format!(
                "report utc offset out of range: {} minutes",
                config.utc_offset_minutes
            ))
        })?;
        Ok(Self {
            output_dir: config.output_dir.clone(),
            offset,
        })
    }

    /// `report_<NAME_WITH_UNDERSCORES>_<job_id>.txt`
    pub fn file_name(search_name: &str, job_id: &str) -> String {
        let name: String = search_name
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("_")
            .chars()
            .filter(|c| !matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
            .collect();
        format!("report_{name}_{job_id}.txt")
    }

    /// Upstream filing timestamp shifted to the report offset, as dd/mm/yyyy.
    pub fn local_date(&self, raw: &str) -> String {
        let raw = raw.trim();
        if raw.is_empty() {
            return NOT_AVAILABLE.to_string();
        }
        match parse_upstream_instant(raw) {
            Some(utc) => utc.with_timezone(&self.offset).format("%d/%m/%Y").to_string(),
            None => raw.get(..10).unwrap_or(NOT_AVAILABLE).to_string(),
        }
    }

    fn render_text(&self, request: &ReportRequest<'_>, cases: &[CaseRecord], pages: u32) -> String {
        let client = request.client;
        let consulted = request.consulted_at.with_timezone(&self.offset);
        let mut out = String::new();

        let _ = writeln!(out, "JUDICIAL CASE REPORT");
        let _ = writeln!(out, "====================");
        let _ = writeln!(out, "Consultation date: {}", consulted.format("%d/%m/%Y %H:%M"));
        let _ = writeln!(out, "Job: {}", request.job_id);
        let _ = writeln!(out, "Client: {}", client.client_id);
        let _ = writeln!(out);
        write_party(&mut out, "HOLDER", Some(&client.holder_name), &client.holder_national_id);
        write_party(&mut out, "SPOUSE", client.spouse_name.as_ref(), &client.spouse_national_id);
        write_party(
            &mut out,
            "CO-SIGNER",
            client.co_signer_name.as_ref(),
            &client.co_signer_national_id,
        );
        let _ = writeln!(out);
        let _ = writeln!(out, "Search name: {}", request.search_name);
        let _ = writeln!(out, "Result: {}", request.outcome.alert_kind());
        let _ = writeln!(out);

        if cases.is_empty() {
            let _ = writeln!(out, "NO JUDICIAL CASES FOUND");
            return out;
        }

        let _ = writeln!(out, "Cases found: {} (pages: {pages})", cases.len());
        let _ = writeln!(out, "{:<4} | {:<10} | {:<20} | OFFENSE", "NO.", "FILED", "CASE");
        for (i, case) in cases.iter().enumerate() {
            let filed = case
                .filed_at
                .as_deref()
                .map(|raw| self.local_date(raw))
                .unwrap_or_else(|| NOT_AVAILABLE.to_string());
            let case_id = if case.case_id.is_empty() {
                NOT_AVAILABLE
            } else {
                case.case_id.as_str()
            };
            let _ = writeln!(
                out,
                "{:<4} | {:<10} | {:<20} | {}",
                i + 1,
                filed,
                case_id,
                case.offense.as_deref().unwrap_or(NOT_AVAILABLE)
            );
        }
        out
    }
}

#[async_trait]
impl ReportRenderer for FileReportRenderer {
    #[instrument(level = "debug", skip(self, request), fields(job_id = %request.job_id))]
    async fn render(&self, request: &ReportRequest<'_>) -> Result<RenderedReport> {
        let (cases, pages): (&[CaseRecord], u32) = match request.outcome {
            LookupOutcome::ResultsFound { items, pages } => (items.as_slice(), *pages),
            LookupOutcome::NoResults => (&[][..], 0),
            LookupOutcome::ApiError { .. } => {
                return Err(Error::InvalidInput(
                    "no report is produced for a failed lookup".to_string(),
                ));
            }
        };

        let text = self.render_text(request, cases, pages);
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| Error::backend("create report dir", e))?;
        let path = self
            .output_dir
            .join(Self::file_name(request.search_name, request.job_id.as_str()));
        tokio::fs::write(&path, text.as_bytes())
            .await
            .map_err(|e| Error::backend("write report", e))?;

        tracing::info!(path = %path.display(), cases = cases.len(), "report written");
        Ok(RenderedReport {
            path,
            size_bytes: text.len() as u64,
            file_kind: "TXT".to_string(),
        })
    }
}

fn write_party(out: &mut String, role: &str, name: Option<&String>, national_id: &Option<String>) {
    let name = name
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .unwrap_or(NOT_AVAILABLE);
    let national_id = national_id.as_deref().unwrap_or(NOT_AVAILABLE);
    let _ = writeln!(out, "{role} NAME: {name}");
    let _ = writeln!(out, "{role} NATIONAL ID: {national_id}");
}

/// Upstream dates are UTC, with or without an explicit offset, or a bare date.
fn parse_upstream_instant(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn renderer() -> FileReportRenderer {
        FileReportRenderer::new(&ReportConfig::default()).unwrap()
    }

    #[test]
    fn file_name_replaces_spaces() {
        assert_eq!(
            FileReportRenderer::file_name("PEREZ LOPEZ  JUAN", "daemon_0123456789ab"),
            "report_PEREZ_LOPEZ_JUAN_daemon_0123456789ab.txt"
        );
        assert_eq!(
            FileReportRenderer::file_name("A/B", "daemon_x"),
            "report_AB_daemon_x.txt"
        );
    }

    #[test]
    fn midnight_utc_is_previous_day_locally() {
        let r = renderer();
        assert_eq!(r.local_date("2025-11-17T00:00:00"), "16/11/2025");
        assert_eq!(r.local_date("2025-11-17T10:30:00Z"), "17/11/2025");
        assert_eq!(r.local_date("2025-11-17"), "16/11/2025");
        assert_eq!(r.local_date("17 de noviembre de 2025"), "17 de novi");
        assert_eq!(r.local_date("bad"), "N/A");
        assert_eq!(r.local_date(""), "N/A");
    }
}
