//! System-of-record extractor backed by a SQLite replica.
//!
//! The replica holds one denormalized row per loan application in
//! `loan_applications`. Rows are read only; nothing here writes to it except
//! `create_replica_schema`, which exists for local setups and tests.

use async_trait::async_trait;
use chrono::NaiveDate;
use recordcheck_core::config::SourceDbConfig;
use recordcheck_core::{Error, PartyIdentity, Result, SourceExtractor, SourceRecord};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::instrument;

pub const REPLICA_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS loan_applications (
  id INTEGER PRIMARY KEY,
  submitted_at TEXT NOT NULL,
  status TEXT NULL,
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
  co_signer_last_names TEXT NULL
);
CREATE INDEX IF NOT EXISTS loan_applications_submitted_idx ON loan_applications(submitted_at);
"#;

pub async fn create_replica_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(REPLICA_SCHEMA)
        .execute(pool)
        .await
        .map_err(|e| Error::backend("replica schema", e))?;
    Ok(())
}

pub struct SqliteSourceExtractor {
    pool: SqlitePool,
    status_filter: Option<String>,
}

impl SqliteSourceExtractor {
    /// Open the replica read-only.
    pub async fn open(config: &SourceDbConfig) -> Result<Self> {
        let opts = SqliteConnectOptions::from_str(&format!(
            "sqlite://{}?mode=ro",
            config.path.display()
        ))
        .map_err(|e| Error::backend("source db connect options", e))?;
        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(opts)
            .await
            .map_err(|e| Error::backend("source db connect", e))?;
        Ok(Self::from_pool(pool, config.status_filter.clone()))
    }

    pub fn from_pool(pool: SqlitePool, status_filter: Option<String>) -> Self {
        Self {
            pool,
            status_filter,
        }
    }
}

#[async_trait]
impl SourceExtractor for SqliteSourceExtractor {
    fn id(&self) -> &'static str {
        "sqlite_replica"
    }

    /// Applications submitted within `[date_from, date_to]`, newest first.
    #[instrument(level = "info", skip(self))]
    async fn fetch(&self, date_from: NaiveDate, date_to: NaiveDate) -> Result<Vec<SourceRecord>> {
        let rows = sqlx::query(
            r#"
SELECT id, submitted_at, status, branch, product_id, product,
       applicant_national_id, applicant_first_names, applicant_last_names, marital_status,
       spouse_national_id, spouse_first_names, spouse_last_names,
       co_signer_national_id, co_signer_first_names, co_signer_last_names
FROM loan_applications
WHERE date(submitted_at) BETWEEN ?1 AND ?2
  AND (?3 IS NULL OR status = ?3)
ORDER BY submitted_at DESC
"#,
        )
        .bind(date_from.format("%Y-%m-%d").to_string())
        .bind(date_to.format("%Y-%m-%d").to_string())
        .bind(self.status_filter.as_deref())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::backend("source fetch", e))?;

        rows.iter().map(row_to_source).collect()
    }
}

fn row_to_source(row: &SqliteRow) -> Result<SourceRecord> {
    // Identity columns come from fixed-width CHAR fields upstream.
    let text = |col: &str| -> Option<String> {
        row.get::<Option<String>, _>(col)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };
    let party = |prefix: &str| {
        PartyIdentity::new(
            text(&format!("{prefix}_national_id")),
            text(&format!("{prefix}_first_names")),
            text(&format!("{prefix}_last_names")),
        )
    };

    let submitted_at: String = row.get("submitted_at");
    let submitted_on = submitted_at
        .get(..10)
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        .ok_or_else(|| {
            Error::BackendMessage(format!("unparsable submitted_at: {submitted_at}"))
        })?;

    Ok(SourceRecord {
        external_id: Some(row.get("id")),
        submitted_on: Some(submitted_on),
        status_code: text("status"),
        branch: text("branch"),
        product_id: row.get("product_id"),
        product: text("product"),
        applicant: party("applicant"),
        marital_status: text("marital_status"),
        spouse: party("spouse"),
        co_signer: party("co_signer"),
    })
}
