use clap::Parser;
use recordcheck_core::{AppConfig, ClientId, JobId};
use recordcheck_server::cli::{Cli, Commands};
use recordcheck_server::wiring;
use tokio::sync::watch;

#[tokio::main]
#[tracing::instrument(level = "info")]
async fn main() -> anyhow::Result<()> {
    // JSON logs unless RECORDCHECK_LOG_FORMAT=pretty.
    recordcheck_core::o11y::init_tracing_from_env()?;
    let cli = Cli::parse();

    let mut config = AppConfig::from_env()?;
    if let Some(path) = cli.database {
        config.database_path = path;
        config.validate()?;
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(&config).await?,
        Commands::Sync { from, to } => {
            let to = to.unwrap_or(from);
            let db = wiring::open_db(&config).await?;
            let engine = wiring::build_sync(&config, db).await?;
            let (ok, result) = engine.run_sync(from, to).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !ok {
                anyhow::bail!("sync run {} failed: {}", result.run_number, result.message);
            }
        }
        Commands::Runs { count } => {
            let db = wiring::open_db(&config).await?;
            let engine = wiring::build_sync(&config, db).await?;
            let runs = engine.get_recent_runs(count).await?;
            println!("{}", serde_json::to_string_pretty(&runs)?);
        }
        Commands::Stats => {
            let db = wiring::open_db(&config).await?;
            let stats = recordcheck_core::queue_stats(db.as_ref()).await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Report { job } => {
            let db = wiring::open_db(&config).await?;
            let Some(report) = db.find_report_by_job(&JobId(job.clone())).await? else {
                anyhow::bail!("no report for job {job}");
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Requeue { client_id } => {
            let db = wiring::open_db(&config).await?;
            let client = recordcheck_core::requeue_client(db.as_ref(), ClientId(client_id)).await?;
            println!("{}", serde_json::to_string_pretty(&client)?);
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

async fn run(config: &AppConfig) -> anyhow::Result<()> {
    let app = wiring::build_app(config).await?;
    let stats = recordcheck_core::queue_stats(app.db.as_ref()).await?;
    tracing::info!(
        pending = stats.pending,
        processing = stats.processing,
        processed = stats.processed,
        error = stats.error,
        "client queue"
    );
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler = app.scheduler.start(shutdown_rx);
    let started = app.processor.start();
    tracing::info!(message = %started.message, "record processor");
    if let Some(next) = app.scheduler.next_run_after(chrono::Utc::now()) {
        tracing::info!(next_run_at = %next, process_name = %app.sync.process_name(), "daily sync scheduled");
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");

    let stopped = app.processor.stop();
    tracing::info!(message = %stopped.message, "record processor");
    let _ = shutdown_tx.send(true);

    app.processor.join().await;
    if let Err(e) = scheduler.await {
        tracing::error!(error = %e, "scheduler task failed");
    }
    tracing::info!("shutdown complete");
    Ok(())
}
