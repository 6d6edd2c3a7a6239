//! SQLite-backed OperationalDb implementation.
//!
//! Single WAL-mode SQLite file holding the client queue, the sync audit
//! ledger, processing attempts and report metadata. Every write is its own
//! autocommit statement, so one failed insert never rolls back another.
//!
//! Usage:
//! ```ignore
//! let db = SqliteOperationalDb::new("/path/to/recordcheck.db").await?;
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

use super::traits::OperationalDb;
use crate::models::{
    ClientId, ClientRecord, ConsultationStatus, JobId, NewClient, PartyIdentity, ProcessId,
    ReportId,
};
use crate::processor::models::{
    NewReport, ProcessFinish, ProcessRecord, ProcessStatus, ReportRecord,
};
use crate::sync::models::{SyncCounts, SyncRun, SyncStatus};
use crate::{Error, Result};

#[derive(Clone)]
pub struct SqliteOperationalDb {
    pool: SqlitePool,
}

impl SqliteOperationalDb {
    /// Create (or open) the store at the given file path.
    ///
    /// Creates the file and parent directories if they don't exist and runs
    /// the schema migration.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::backend("sqlite_operational_db mkdir", e))?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", path.display()))
            .map_err(|e| Error::backend("sqlite_operational_db connect options", e))?
            .journal_mode(SqliteJournalMode::Wal)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await
            .map_err(|e| Error::backend("sqlite_operational_db connect", e))?;

        Self::from_pool(pool).await
    }

    /// Private in-memory database on a single connection (tests, dry runs).
    pub async fn in_memory() -> Result<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| Error::backend("sqlite_operational_db connect options", e))?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await
            .map_err(|e| Error::backend("sqlite_operational_db connect", e))?;

        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::query(SCHEMA)
            .execute(&pool)
            .await
            .map_err(|e| Error::backend("sqlite_operational_db schema", e))?;
        Ok(Self { pool })
    }
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS clients (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  external_id INTEGER NULL,
  submitted_on TEXT NULL,
  status_code TEXT NULL,
  branch TEXT NULL,
  product_id INTEGER NULL,
  product TEXT NULL,
  applicant_national_id TEXT NULL,
  applicant_first_names TEXT NULL,
  applicant_last_names TEXT NULL,
  marital_status TEXT NULL,
  spouse_national_id TEXT NULL,
  spouse_first_names TEXT NULL,
  spouse_last_names TEXT NULL,
  co_signer_national_id TEXT NULL,
  co_signer_first_names TEXT NULL,
  co_signer_last_names TEXT NULL,
  consultation_status TEXT NOT NULL,
  created_at TEXT NOT NULL,
  last_consulted_at TEXT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS clients_external_id_idx ON clients(external_id);
CREATE INDEX IF NOT EXISTS clients_status_created_idx
  ON clients(consultation_status, created_at, id);

CREATE TABLE IF NOT EXISTS sync_runs (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  process_name TEXT NOT NULL,
  run_number INTEGER NOT NULL,
  started_at TEXT NOT NULL,
  finished_at TEXT NOT NULL,
  duration_seconds INTEGER NOT NULL,
  fetched INTEGER NOT NULL,
  inserted INTEGER NOT NULL,
  duplicate INTEGER NOT NULL,
  error INTEGER NOT NULL,
  status TEXT NOT NULL,
  message TEXT NOT NULL,
  min_submission_date TEXT NULL,
  max_submission_date TEXT NULL,
  created_at TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS sync_runs_process_number_idx
  ON sync_runs(process_name, run_number);

CREATE TABLE IF NOT EXISTS processes (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  client_id INTEGER NOT NULL REFERENCES clients(id),
  job_id TEXT NOT NULL,
  status TEXT NOT NULL,
  pages_requested INTEGER NOT NULL,
  pages_successful INTEGER NOT NULL,
  error_message TEXT NULL,
  created_at TEXT NOT NULL,
  finished_at TEXT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS processes_job_id_idx ON processes(job_id);
CREATE INDEX IF NOT EXISTS processes_client_idx ON processes(client_id);

CREATE TABLE IF NOT EXISTS reports (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  job_id TEXT NOT NULL,
  client_id INTEGER NOT NULL REFERENCES clients(id),
  process_id INTEGER NOT NULL REFERENCES processes(id),
  file_name TEXT NOT NULL,
  file_path TEXT NOT NULL,
  size_bytes INTEGER NOT NULL,
  file_kind TEXT NOT NULL,
  generated_ok INTEGER NOT NULL,
  items_found INTEGER NOT NULL,
  pages INTEGER NOT NULL,
  alert_kind TEXT NOT NULL,
  generated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS reports_process_idx ON reports(process_id);
CREATE INDEX IF NOT EXISTS reports_job_idx ON reports(job_id);
"#;

const CLIENT_COLUMNS: &str = r#"
id, external_id, submitted_on, status_code, branch, product_id, product,
applicant_national_id, applicant_first_names, applicant_last_names, marital_status,
spouse_national_id, spouse_first_names, spouse_last_names,
co_signer_national_id, co_signer_first_names, co_signer_last_names,
consultation_status, created_at, last_consulted_at
"#;

const PROCESS_COLUMNS: &str = r#"
id, client_id, job_id, status, pages_requested, pages_successful, error_message,
created_at, finished_at
"#;

const REPORT_COLUMNS: &str = r#"
id, job_id, client_id, process_id, file_name, file_path, size_bytes, file_kind,
generated_ok, items_found, pages, alert_kind, generated_at
"#;

#[async_trait]
impl OperationalDb for SqliteOperationalDb {
    #[tracing::instrument(level = "debug", skip(self, client), fields(external_id = ?client.external_id))]
    async fn insert_client(&self, client: &NewClient) -> Result<ClientId> {
        let res = sqlx::query(
            r#"
INSERT INTO clients
  (external_id, submitted_on, status_code, branch, product_id, product,
   applicant_national_id, applicant_first_names, applicant_last_names, marital_status,
   spouse_national_id, spouse_first_names, spouse_last_names,
   co_signer_national_id, co_signer_first_names, co_signer_last_names,
   consultation_status, created_at, last_consulted_at)
VALUES
  (?1, ?2, ?3, ?4, ?5, ?6,
   ?7, ?8, ?9, ?10,
   ?11, ?12, ?13,
   ?14, ?15, ?16,
   ?17, ?18, NULL)
"#,
        )
        .bind(client.external_id)
        .bind(client.submitted_on.map(fmt_date))
        .bind(&client.status_code)
        .bind(&client.branch)
        .bind(client.product_id)
        .bind(&client.product)
        .bind(&client.applicant.national_id)
        .bind(&client.applicant.first_names)
        .bind(&client.applicant.last_names)
        .bind(&client.marital_status)
        .bind(&client.spouse.national_id)
        .bind(&client.spouse.first_names)
        .bind(&client.spouse.last_names)
        .bind(&client.co_signer.national_id)
        .bind(&client.co_signer.first_names)
        .bind(&client.co_signer.last_names)
        .bind(ConsultationStatus::Pending.as_str())
        .bind(fmt_dt(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(|e| Error::from_sqlx("insert client", e))?;
        Ok(ClientId(res.last_insert_rowid()))
    }

    async fn get_client(&self, id: ClientId) -> Result<Option<ClientRecord>> {
        let row = sqlx::query(&format!("SELECT {CLIENT_COLUMNS} FROM clients WHERE id = ?1"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::from_sqlx("get client", e))?;
        row.as_ref().map(row_to_client).transpose()
    }

    async fn next_pending_client(&self) -> Result<Option<ClientRecord>> {
        let row = sqlx::query(&format!(
            r#"
SELECT {CLIENT_COLUMNS} FROM clients
WHERE consultation_status = ?1
ORDER BY created_at ASC, id ASC
LIMIT 1
"#
        ))
        .bind(ConsultationStatus::Pending.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::from_sqlx("next pending client", e))?;
        row.as_ref().map(row_to_client).transpose()
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn set_consultation_status(
        &self,
        id: ClientId,
        status: ConsultationStatus,
    ) -> Result<()> {
        let res = sqlx::query(
            r#"
UPDATE clients
SET consultation_status = ?2, last_consulted_at = ?3
WHERE id = ?1
"#,
        )
        .bind(id.0)
        .bind(status.as_str())
        .bind(fmt_dt(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(|e| Error::from_sqlx("set consultation status", e))?;
        if res.rows_affected() == 0 {
            return Err(Error::NotFound(format!("client {id}")));
        }
        Ok(())
    }

    async fn count_clients_by_status(&self) -> Result<BTreeMap<ConsultationStatus, u64>> {
        let rows = sqlx::query(
            "SELECT consultation_status, COUNT(*) AS n FROM clients GROUP BY consultation_status",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::from_sqlx("count clients", e))?;

        let mut out = BTreeMap::new();
        for row in rows {
            let status = parse_consultation_status(&row.get::<String, _>("consultation_status"))?;
            out.insert(status, row.get::<i64, _>("n").max(0) as u64);
        }
        Ok(out)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn requeue_in_flight(&self) -> Result<u64> {
        let res = sqlx::query(
            "UPDATE clients SET consultation_status = ?1 WHERE consultation_status = ?2",
        )
        .bind(ConsultationStatus::Pending.as_str())
        .bind(ConsultationStatus::Processing.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::from_sqlx("requeue in-flight clients", e))?;
        Ok(res.rows_affected())
    }

    async fn next_sync_run_number(&self, process_name: &str) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COALESCE(MAX(run_number), 0) + 1 AS next FROM sync_runs WHERE process_name = ?1",
        )
        .bind(process_name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| Error::from_sqlx("next sync run number", e))?;
        Ok(row.get::<i64, _>("next"))
    }

    #[tracing::instrument(level = "debug", skip(self, run), fields(run_number = run.run_number))]
    async fn append_sync_run(&self, run: &SyncRun) -> Result<()> {
        sqlx::query(
            r#"
INSERT INTO sync_runs
  (process_name, run_number, started_at, finished_at, duration_seconds,
   fetched, inserted, duplicate, error, status, message,
   min_submission_date, max_submission_date, created_at)
VALUES
  (?1, ?2, ?3, ?4, ?5,
   ?6, ?7, ?8, ?9, ?10, ?11,
   ?12, ?13, ?14)
"#,
        )
        .bind(&run.process_name)
        .bind(run.run_number)
        .bind(fmt_dt(run.started_at))
        .bind(fmt_dt(run.finished_at))
        .bind(run.duration_seconds)
        .bind(run.counts.fetched as i64)
        .bind(run.counts.inserted as i64)
        .bind(run.counts.duplicate as i64)
        .bind(run.counts.error as i64)
        .bind(run.status.as_str())
        .bind(&run.message)
        .bind(run.min_submission_date.map(fmt_date))
        .bind(run.max_submission_date.map(fmt_date))
        .bind(fmt_dt(run.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| Error::from_sqlx("append sync run", e))?;
        Ok(())
    }

    async fn list_sync_runs(&self, process_name: &str, limit: usize) -> Result<Vec<SyncRun>> {
        let rows = sqlx::query(
            r#"
SELECT process_name, run_number, started_at, finished_at, duration_seconds,
       fetched, inserted, duplicate, error, status, message,
       min_submission_date, max_submission_date, created_at
FROM sync_runs
WHERE process_name = ?1
ORDER BY run_number DESC
LIMIT ?2
"#,
        )
        .bind(process_name)
        .bind(limit.min(i64::MAX as usize) as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::from_sqlx("list sync runs", e))?;
        rows.iter().map(row_to_sync_run).collect()
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn create_process(&self, client_id: ClientId, job_id: &JobId) -> Result<ProcessRecord> {
        let created_at = Utc::now();
        let res = sqlx::query(
            r#"
INSERT INTO processes
  (client_id, job_id, status, pages_requested, pages_successful, error_message,
   created_at, finished_at)
VALUES
  (?1, ?2, ?3, 1, 0, NULL, ?4, NULL)
"#,
        )
        .bind(client_id.0)
        .bind(job_id.as_str())
        .bind(ProcessStatus::Pending.as_str())
        .bind(fmt_dt(created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| Error::from_sqlx("create process", e))?;

        Ok(ProcessRecord {
            id: ProcessId(res.last_insert_rowid()),
            client_id,
            job_id: job_id.clone(),
            status: ProcessStatus::Pending,
            pages_requested: 1,
            pages_successful: 0,
            error_message: None,
            created_at,
            finished_at: None,
        })
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn finish_process(&self, id: ProcessId, finish: &ProcessFinish) -> Result<()> {
        if !finish.status.is_terminal() {
            return Err(Error::InvalidInput(format!(
                "process {id} cannot finish as {}",
                finish.status
            )));
        }
        let res = sqlx::query(
            r#"
UPDATE processes
SET status = ?2, pages_successful = ?3, error_message = ?4, finished_at = ?5
WHERE id = ?1
"#,
        )
        .bind(id.0)
        .bind(finish.status.as_str())
        .bind(finish.pages_successful as i64)
        .bind(&finish.error_message)
        .bind(fmt_dt(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(|e| Error::from_sqlx("finish process", e))?;
        if res.rows_affected() == 0 {
            return Err(Error::NotFound(format!("process {id}")));
        }
        Ok(())
    }

    async fn get_process(&self, id: ProcessId) -> Result<Option<ProcessRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {PROCESS_COLUMNS} FROM processes WHERE id = ?1"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::from_sqlx("get process", e))?;
        row.as_ref().map(row_to_process).transpose()
    }

    async fn list_processes_for_client(&self, client_id: ClientId) -> Result<Vec<ProcessRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {PROCESS_COLUMNS} FROM processes WHERE client_id = ?1 ORDER BY id ASC"
        ))
        .bind(client_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::from_sqlx("list processes", e))?;
        rows.iter().map(row_to_process).collect()
    }

    #[tracing::instrument(level = "debug", skip(self, report), fields(job_id = %report.job_id))]
    async fn create_report(&self, report: &NewReport) -> Result<ReportRecord> {
        let generated_at = Utc::now();
        let res = sqlx::query(
            r#"
INSERT INTO reports
  (job_id, client_id, process_id, file_name, file_path, size_bytes, file_kind,
   generated_ok, items_found, pages, alert_kind, generated_at)
VALUES
  (?1, ?2, ?3, ?4, ?5, ?6, ?7,
   ?8, ?9, ?10, ?11, ?12)
"#,
        )
        .bind(report.job_id.as_str())
        .bind(report.client_id.0)
        .bind(report.process_id.0)
        .bind(&report.file_name)
        .bind(&report.file_path)
        .bind(report.size_bytes.min(i64::MAX as u64) as i64)
        .bind(&report.file_kind)
        .bind(report.generated_ok)
        .bind(report.items_found as i64)
        .bind(report.pages as i64)
        .bind(&report.alert_kind)
        .bind(fmt_dt(generated_at))
        .execute(&self.pool)
        .await
        .map_err(|e| Error::from_sqlx("create report", e))?;

        Ok(ReportRecord {
            id: ReportId(res.last_insert_rowid()),
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
            generated_at,
        })
    }

    async fn list_reports_for_process(&self, process_id: ProcessId) -> Result<Vec<ReportRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {REPORT_COLUMNS} FROM reports WHERE process_id = ?1 ORDER BY id ASC"
        ))
        .bind(process_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::from_sqlx("list reports", e))?;
        rows.iter().map(row_to_report).collect()
    }

    async fn find_report_by_job(&self, job_id: &JobId) -> Result<Option<ReportRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {REPORT_COLUMNS} FROM reports WHERE job_id = ?1 ORDER BY id DESC LIMIT 1"
        ))
        .bind(job_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::from_sqlx("find report by job", e))?;
        row.as_ref().map(row_to_report).transpose()
    }
}

fn row_to_client(row: &SqliteRow) -> Result<ClientRecord> {
    let party = |prefix: &str| PartyIdentity {
        national_id: row.get(format!("{prefix}_national_id").as_str()),
        first_names: row.get(format!("{prefix}_first_names").as_str()),
        last_names: row.get(format!("{prefix}_last_names").as_str()),
    };
    let submitted_on: Option<String> = row.get("submitted_on");
    let last_consulted_at: Option<String> = row.get("last_consulted_at");

    Ok(ClientRecord {
        id: ClientId(row.get("id")),
        external_id: row.get("external_id"),
        submitted_on: submitted_on.as_deref().map(parse_date).transpose()?,
        status_code: row.get("status_code"),
        branch: row.get("branch"),
        product_id: row.get("product_id"),
        product: row.get("product"),
        applicant: party("applicant"),
        marital_status: row.get("marital_status"),
        spouse: party("spouse"),
        co_signer: party("co_signer"),
        consultation_status: parse_consultation_status(
            &row.get::<String, _>("consultation_status"),
        )?,
        created_at: parse_dt(&row.get::<String, _>("created_at"))?,
        last_consulted_at: last_consulted_at.as_deref().map(parse_dt).transpose()?,
    })
}

fn row_to_sync_run(row: &SqliteRow) -> Result<SyncRun> {
    let min: Option<String> = row.get("min_submission_date");
    let max: Option<String> = row.get("max_submission_date");
    Ok(SyncRun {
        process_name: row.get("process_name"),
        run_number: row.get("run_number"),
        started_at: parse_dt(&row.get::<String, _>("started_at"))?,
        finished_at: parse_dt(&row.get::<String, _>("finished_at"))?,
        duration_seconds: row.get("duration_seconds"),
        counts: SyncCounts {
            fetched: row.get::<i64, _>("fetched").max(0) as u64,
            inserted: row.get::<i64, _>("inserted").max(0) as u64,
            duplicate: row.get::<i64, _>("duplicate").max(0) as u64,
            error: row.get::<i64, _>("error").max(0) as u64,
        },
        status: row.get::<String, _>("status").parse::<SyncStatus>()?,
        message: row.get("message"),
        min_submission_date: min.as_deref().map(parse_date).transpose()?,
        max_submission_date: max.as_deref().map(parse_date).transpose()?,
        created_at: parse_dt(&row.get::<String, _>("created_at"))?,
    })
}

fn row_to_process(row: &SqliteRow) -> Result<ProcessRecord> {
    let finished_at: Option<String> = row.get("finished_at");
    Ok(ProcessRecord {
        id: ProcessId(row.get("id")),
        client_id: ClientId(row.get("client_id")),
        job_id: JobId(row.get("job_id")),
        status: row.get::<String, _>("status").parse::<ProcessStatus>()?,
        pages_requested: row.get::<i64, _>("pages_requested").max(0) as u32,
        pages_successful: row.get::<i64, _>("pages_successful").max(0) as u32,
        error_message: row.get("error_message"),
        created_at: parse_dt(&row.get::<String, _>("created_at"))?,
        finished_at: finished_at.as_deref().map(parse_dt).transpose()?,
    })
}

fn row_to_report(row: &SqliteRow) -> Result<ReportRecord> {
    Ok(ReportRecord {
        id: ReportId(row.get("id")),
        job_id: JobId(row.get("job_id")),
        client_id: ClientId(row.get("client_id")),
        process_id: ProcessId(row.get("process_id")),
        file_name: row.get("file_name"),
        file_path: row.get("file_path"),
        size_bytes: row.get::<i64, _>("size_bytes").max(0) as u64,
        file_kind: row.get("file_kind"),
        generated_ok: row.get("generated_ok"),
        items_found: row.get::<i64, _>("items_found").max(0) as u32,
        pages: row.get::<i64, _>("pages").max(0) as u32,
        alert_kind: row.get("alert_kind"),
        generated_at: parse_dt(&row.get::<String, _>("generated_at"))?,
    })
}

// Fixed-width UTC timestamps keep lexical order equal to chronological order.
fn fmt_dt(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_dt(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::backend("parse datetime", e))
}

fn fmt_date(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::backend("parse date", e))
}

fn parse_consultation_status(s: &str) -> Result<ConsultationStatus> {
    s.parse::<ConsultationStatus>()
        .map_err(|e| Error::backend("parse consultation status", e))
}
