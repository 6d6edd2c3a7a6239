//! Builds the long-lived components from `AppConfig`.

use recordcheck_core::{
    AppConfig, DailySyncScheduler, OperationalDb, PaginatedLookup, RecordProcessor,
    SqliteOperationalDb, SyncEngine,
};
use recordcheck_integrations::{FileReportRenderer, JudicialCaseFetcher, SqliteSourceExtractor};
use std::sync::Arc;

pub struct App {
    pub db: Arc<dyn OperationalDb>,
    pub sync: Arc<SyncEngine>,
    pub scheduler: Arc<DailySyncScheduler>,
    pub processor: Arc<RecordProcessor>,
}

#[tracing::instrument(level = "info", skip_all)]
pub async fn open_db(config: &AppConfig) -> anyhow::Result<Arc<dyn OperationalDb>> {
    let db = SqliteOperationalDb::new(&config.database_path).await?;
    tracing::info!(path = %config.database_path.display(), "operational db ready");
    Ok(Arc::new(db))
}

#[tracing::instrument(level = "info", skip_all)]
pub async fn build_sync(
    config: &AppConfig,
    db: Arc<dyn OperationalDb>,
) -> anyhow::Result<Arc<SyncEngine>> {
    let extractor = SqliteSourceExtractor::open(&config.source).await?;
    Ok(Arc::new(SyncEngine::new(
        db,
        Arc::new(extractor),
        config.process_name.clone(),
    )?))
}

#[tracing::instrument(level = "info", skip_all)]
pub async fn build_app(config: &AppConfig) -> anyhow::Result<App> {
    let db = open_db(config).await?;
    let sync = build_sync(config, db.clone()).await?;
    let scheduler = Arc::new(DailySyncScheduler::new(sync.clone(), &config.schedule)?);

    let lookup = PaginatedLookup::new(
        JudicialCaseFetcher::new(&config.lookup)?,
        config.lookup.max_pages,
    )?;
    let renderer = FileReportRenderer::new(&config.report)?;
    let processor = Arc::new(RecordProcessor::new(
        db.clone(),
        Arc::new(lookup),
        Arc::new(renderer),
        config.processor.clone(),
    )?);

    Ok(App {
        db,
        sync,
        scheduler,
        processor,
    })
}
