//! Report files written to a temporary directory.

use chrono::{DateTime, Utc};
use recordcheck_core::config::ReportConfig;
use recordcheck_core::{
    CaseRecord, ClientId, ClientMetadata, JobId, LookupOutcome, ReportRenderer, ReportRequest,
};
use recordcheck_integrations::FileReportRenderer;
use serde_json::json;

fn metadata() -> ClientMetadata {
    ClientMetadata {
        client_id: ClientId(7),
        holder_name: "PEREZ LOPEZ JUAN".to_string(),
        holder_national_id: Some("1712345678".to_string()),
        spouse_name: Some("TORRES MARIA".to_string()),
        spouse_national_id: Some("0912345678".to_string()),
        co_signer_name: None,
        co_signer_national_id: None,
    }
}

fn consulted_at() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-11-18T15:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

fn renderer(dir: &tempfile::TempDir) -> FileReportRenderer {
    FileReportRenderer::new(&ReportConfig {
        output_dir: dir.path().join("reports"),
        utc_offset_minutes: -300,
    })
    .unwrap()
}

#[tokio::test]
async fn writes_case_table_with_local_dates() {
    let dir = tempfile::tempdir().unwrap();
    let job = JobId("daemon_0123456789ab".to_string());
    let outcome = LookupOutcome::ResultsFound {
        items: vec![CaseRecord {
            case_id: "17282-2024-00123".to_string(),
            filed_at: Some("2025-11-17T00:00:00".to_string()),
            offense: Some("ESTAFA".to_string()),
            raw: json!({}),
        }],
        pages: 1,
    };
    let client = metadata();

    let rendered = renderer(&dir)
        .render(&ReportRequest {
            job_id: &job,
            search_name: "PEREZ LOPEZ JUAN",
            outcome: &outcome,
            client: &client,
            consulted_at: consulted_at(),
        })
        .await
        .unwrap();

    assert_eq!(
        rendered.file_name(),
        "report_PEREZ_LOPEZ_JUAN_daemon_0123456789ab.txt"
    );
    assert_eq!(rendered.file_kind, "TXT");
    let text = std::fs::read_to_string(&rendered.path).unwrap();
    assert_eq!(rendered.size_bytes, text.len() as u64);
    assert!(text.contains("Consultation date: 18/11/2025 10:00"));
    assert!(text.contains("HOLDER NATIONAL ID: 1712345678"));
    assert!(text.contains("CO-SIGNER NAME: N/A"));
    assert!(text.contains("16/11/2025"));
    assert!(text.contains("17282-2024-00123"));
    assert!(text.contains("judicial lookup (results found)"));
}

#[tokio::test]
async fn no_results_report_says_so() {
    let dir = tempfile::tempdir().unwrap();
    let job = JobId::generate();
    let client = metadata();

    let rendered = renderer(&dir)
        .render(&ReportRequest {
            job_id: &job,
            search_name: "PEREZ LOPEZ JUAN",
            outcome: &LookupOutcome::NoResults,
            client: &client,
            consulted_at: consulted_at(),
        })
        .await
        .unwrap();

    let text = std::fs::read_to_string(&rendered.path).unwrap();
    assert!(text.contains("NO JUDICIAL CASES FOUND"));
    assert!(rendered.path.starts_with(dir.path().join("reports")));
}

#[tokio::test]
async fn api_error_is_refused_and_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let job = JobId::generate();
    let client = metadata();

    let result = renderer(&dir)
        .render(&ReportRequest {
            job_id: &job,
            search_name: "PEREZ LOPEZ JUAN",
            outcome: &LookupOutcome::ApiError {
                reason: "status 503".to_string(),
            },
            client: &client,
            consulted_at: consulted_at(),
        })
        .await;

    assert!(result.is_err());
    assert!(!dir.path().join("reports").exists());
}
