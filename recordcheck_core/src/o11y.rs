//! Logging bootstrap.
//!
//! `RUST_LOG` selects levels (default `info`). Output is JSON unless
//! `RECORDCHECK_LOG_FORMAT=pretty`.

use crate::{Error, Result};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Some(LogFormat::Json),
            "pretty" | "text" => Some(LogFormat::Pretty),
            _ => None,
        }
    }
}

pub fn init_tracing_from_env() -> Result<()> {
    let format = match std::env::var("RECORDCHECK_LOG_FORMAT") {
        Ok(v) if !v.trim().is_empty() => LogFormat::parse(&v).ok_or_else(|| {
            Error::InvalidInput(format!("invalid RECORDCHECK_LOG_FORMAT: {v}"))
        })?,
        _ => LogFormat::Json,
    };
    init_tracing(format)
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_tracing(format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    let installed = match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init(),
    };
    installed.map_err(|e| Error::InvalidInput(format!("tracing already initialized: {e}")))
}
