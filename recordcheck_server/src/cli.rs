use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "recordcheck",
    version,
    about = "Loan application sync and judicial record checks"
)]
pub struct Cli {
    /// Operational database override (else RECORDCHECK_DATABASE_PATH or ./data/recordcheck.db).
    #[arg(long, global = true)]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the daily sync scheduler and the record processor until Ctrl-C (default).
    Run,

    /// Synchronize one date range now.
    Sync {
        /// First submission date, inclusive (YYYY-MM-DD).
        #[arg(long)]
        from: NaiveDate,
        /// Last submission date, inclusive (YYYY-MM-DD). Defaults to `--from`.
        #[arg(long)]
        to: Option<NaiveDate>,
    },

    /// Show the most recent sync runs, newest first.
    Runs {
        #[arg(long, default_value = "10")]
        count: usize,
    },

    /// Client counts per consultation status.
    Stats,

    /// Show the report generated for a job.
    Report {
        /// Job identifier, e.g. `daemon_0123456789ab`.
        #[arg(long)]
        job: String,
    },

    /// Return an `Error` or `Processed` client to the queue.
    Requeue { client_id: i64 },

    /// Print the effective configuration as JSON.
    Config,
}
