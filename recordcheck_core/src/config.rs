use crate::processor::lookup::DEFAULT_MAX_PAGES;
use crate::{Error, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_LOOKUP_BASE_URL: &str =
    "https://api.funcionjudicial.gob.ec/EXPEL-CONSULTA-CAUSAS-SERVICE";

/// Largest offset accepted for local-time conversions (±14h).
const MAX_OFFSET_MINUTES: i32 = 14 * 60;

/// Read-only replica of the system of record.
#[derive(Debug, Clone, Serialize)]
pub struct SourceDbConfig {
    pub path: PathBuf,
    /// Only applications in this status are replicated; `None` replicates all.
    pub status_filter: Option<String>,
}

impl Default for SourceDbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/source.db"),
            status_filter: Some("T".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LookupConfig {
    pub base_url: String,
    pub page_size: u32,
    pub max_pages: u32,
    pub request_timeout: Duration,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_LOOKUP_BASE_URL.to_string(),
            page_size: 10,
            max_pages: DEFAULT_MAX_PAGES,
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportConfig {
    pub output_dir: PathBuf,
    /// Offset applied to upstream UTC dates before printing them.
    pub utc_offset_minutes: i32,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./data/reports"),
            utc_offset_minutes: -300,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessorConfig {
    /// Wait between cycles.
    pub cycle_interval: Duration,
    /// Wait after a cycle that failed outright.
    pub error_backoff: Duration,
    /// Upper bound on how long a stop request can go unnoticed while waiting.
    pub stop_poll: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            cycle_interval: Duration::from_secs(30 * 60),
            error_backoff: Duration::from_secs(60),
            stop_poll: Duration::from_secs(1),
        }
    }
}

impl ProcessorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.cycle_interval.is_zero() {
            return Err(Error::InvalidInput(
                "processor.cycle_interval must be > 0".to_string(),
            ));
        }
        if self.error_backoff.is_zero() {
            return Err(Error::InvalidInput(
                "processor.error_backoff must be > 0".to_string(),
            ));
        }
        if self.stop_poll.is_zero() {
            return Err(Error::InvalidInput(
                "processor.stop_poll must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduleConfig {
    /// Six-field cron expression (sec min hour dom month dow) in local time.
    pub cron: String,
    pub utc_offset_minutes: i32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            cron: "0 0 7 * * *".to_string(),
            utc_offset_minutes: -300,
        }
    }
}

impl ScheduleConfig {
    pub fn validate(&self) -> Result<()> {
        validate_offset("schedule.utc_offset_minutes", self.utc_offset_minutes)?;
        cron::Schedule::from_str(&self.cron)
            .map_err(|e| Error::InvalidInput(format!("schedule.cron is invalid: {e}")))?;
        Ok(())
    }
}

/// Effective configuration of a deployment.
#[derive(Debug, Clone, Serialize)]
pub struct AppConfig {
    /// Operational SQLite database.
    pub database_path: PathBuf,
    pub process_name: String,
    pub source: SourceDbConfig,
    pub lookup: LookupConfig,
    pub report: ReportConfig,
    pub processor: ProcessorConfig,
    pub schedule: ScheduleConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("./data/recordcheck.db"),
            process_name: "client_sync".to_string(),
            source: SourceDbConfig::default(),
            lookup: LookupConfig::default(),
            report: ReportConfig::default(),
            processor: ProcessorConfig::default(),
            schedule: ScheduleConfig::default(),
        }
    }
}

impl AppConfig {
    /// Defaults overridden by `RECORDCHECK_*` environment variables.
    #[tracing::instrument(level = "debug")]
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env`, reading variables through `get`.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| get(key).filter(|v| !v.trim().is_empty());
        let mut cfg = Self::default();

        if let Some(v) = var("RECORDCHECK_DATABASE_PATH") {
            cfg.database_path = PathBuf::from(v);
        }
        if let Some(v) = var("RECORDCHECK_PROCESS_NAME") {
            cfg.process_name = v;
        }

        if let Some(v) = var("RECORDCHECK_SOURCE_DB_PATH") {
            cfg.source.path = PathBuf::from(v);
        }
        if let Some(v) = get("RECORDCHECK_SOURCE_STATUS_FILTER") {
            // Explicitly empty disables the filter.
            let v = v.trim();
            cfg.source.status_filter = (!v.is_empty() && v != "*").then(|| v.to_string());
        }

        if let Some(v) = var("RECORDCHECK_LOOKUP_BASE_URL") {
            cfg.lookup.base_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = var("RECORDCHECK_LOOKUP_PAGE_SIZE") {
            cfg.lookup.page_size = parse_num("RECORDCHECK_LOOKUP_PAGE_SIZE", &v)?;
        }
        if let Some(v) = var("RECORDCHECK_LOOKUP_MAX_PAGES") {
            cfg.lookup.max_pages = parse_num("RECORDCHECK_LOOKUP_MAX_PAGES", &v)?;
        }
        if let Some(v) = var("RECORDCHECK_LOOKUP_TIMEOUT_SECS") {
            cfg.lookup.request_timeout =
                Duration::from_secs(parse_num("RECORDCHECK_LOOKUP_TIMEOUT_SECS", &v)?);
        }

        if let Some(v) = var("RECORDCHECK_REPORT_DIR") {
            cfg.report.output_dir = PathBuf::from(v);
        }
        if let Some(v) = var("RECORDCHECK_REPORT_UTC_OFFSET_MINUTES") {
            cfg.report.utc_offset_minutes =
                parse_num("RECORDCHECK_REPORT_UTC_OFFSET_MINUTES", &v)?;
        }

        if let Some(v) = var("RECORDCHECK_PROCESSOR_INTERVAL_SECS") {
            cfg.processor.cycle_interval =
                Duration::from_secs(parse_num("RECORDCHECK_PROCESSOR_INTERVAL_SECS", &v)?);
        }
        if let Some(v) = var("RECORDCHECK_PROCESSOR_BACKOFF_SECS") {
            cfg.processor.error_backoff =
                Duration::from_secs(parse_num("RECORDCHECK_PROCESSOR_BACKOFF_SECS", &v)?);
        }

        if let Some(v) = var("RECORDCHECK_SYNC_CRON") {
            cfg.schedule.cron = v;
        }
        if let Some(v) = var("RECORDCHECK_SYNC_UTC_OFFSET_MINUTES") {
            cfg.schedule.utc_offset_minutes =
                parse_num("RECORDCHECK_SYNC_UTC_OFFSET_MINUTES", &v)?;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::InvalidInput("database_path is empty".to_string()));
        }
        if self.process_name.trim().is_empty() {
            return Err(Error::InvalidInput("process_name is empty".to_string()));
        }
        if self.source.path.as_os_str().is_empty() {
            return Err(Error::InvalidInput("source.path is empty".to_string()));
        }
        if self.lookup.base_url.trim().is_empty() {
            return Err(Error::InvalidInput("lookup.base_url is empty".to_string()));
        }
        if self.lookup.page_size == 0 {
            return Err(Error::InvalidInput(
                "lookup.page_size must be > 0".to_string(),
            ));
        }
        if self.lookup.max_pages == 0 {
            return Err(Error::InvalidInput(
                "lookup.max_pages must be > 0".to_string(),
            ));
        }
        if self.lookup.request_timeout.is_zero() {
            return Err(Error::InvalidInput(
                "lookup.request_timeout must be > 0".to_string(),
            ));
        }
        if self.report.output_dir.as_os_str().is_empty() {
            return Err(Error::InvalidInput("report.output_dir is empty".to_string()));
        }
        validate_offset("report.utc_offset_minutes", self.report.utc_offset_minutes)?;
        self.processor.validate()?;
        self.schedule.validate()?;
        Ok(())
    }
}

fn validate_offset(name: &str, minutes: i32) -> Result<()> {
    if minutes.abs() > MAX_OFFSET_MINUTES {
        return Err(Error::InvalidInput(format!(
            "{name} must be within ±{MAX_OFFSET_MINUTES} minutes"
        )));
    }
    Ok(())
}

fn parse_num<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| Error::InvalidInput(format!("invalid {key}: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_map(vars: &[(&str, &str)]) -> Result<AppConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = AppConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.processor.cycle_interval, Duration::from_secs(1800));
        assert_eq!(cfg.lookup.page_size, 10);
        assert_eq!(cfg.lookup.max_pages, 20);
        assert_eq!(cfg.source.status_filter.as_deref(), Some("T"));
    }

    #[test]
    fn env_overrides_apply() {
        let cfg = from_map(&[
            ("RECORDCHECK_DATABASE_PATH", "/var/lib/rc/ops.db"),
            ("RECORDCHECK_LOOKUP_BASE_URL", "http://localhost:9000/"),
            ("RECORDCHECK_LOOKUP_MAX_PAGES", "5"),
            ("RECORDCHECK_PROCESSOR_INTERVAL_SECS", "60"),
            ("RECORDCHECK_SOURCE_STATUS_FILTER", ""),
            ("RECORDCHECK_SYNC_CRON", "0 30 6 * * *"),
        ])
        .unwrap();
        assert_eq!(cfg.database_path, PathBuf::from("/var/lib/rc/ops.db"));
        assert_eq!(cfg.lookup.base_url, "http://localhost:9000");
        assert_eq!(cfg.lookup.max_pages, 5);
        assert_eq!(cfg.processor.cycle_interval, Duration::from_secs(60));
        assert_eq!(cfg.source.status_filter, None);
        assert_eq!(cfg.schedule.cron, "0 30 6 * * *");
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(from_map(&[("RECORDCHECK_LOOKUP_PAGE_SIZE", "0")]).is_err());
        assert!(from_map(&[("RECORDCHECK_LOOKUP_PAGE_SIZE", "ten")]).is_err());
        assert!(from_map(&[("RECORDCHECK_PROCESSOR_BACKOFF_SECS", "0")]).is_err());
        assert!(from_map(&[("RECORDCHECK_SYNC_CRON", "every morning")]).is_err());
        assert!(from_map(&[("RECORDCHECK_SYNC_UTC_OFFSET_MINUTES", "900")]).is_err());
    }
}
