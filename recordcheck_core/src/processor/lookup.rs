use crate::processor::models::{CaseRecord, LookupOutcome};
use crate::processor::traits::{LookupService, PageFetcher};
use crate::{Error, Result};
use async_trait::async_trait;

pub const DEFAULT_MAX_PAGES: u32 = 20;

/// Paginated lookup with the three-way classification.
///
/// - Page 1 failure is `ApiError`; no further pages are requested.
/// - Page 1 empty is `NoResults`.
/// - Otherwise pages are fetched until one comes back empty, one fails, or
///   `max_pages` is reached. Items gathered so far are always kept.
pub struct PaginatedLookup<F> {
    fetcher: F,
    max_pages: u32,
}

impl<F: PageFetcher> PaginatedLookup<F> {
    pub fn new(fetcher: F, max_pages: u32) -> Result<Self> {
        if max_pages == 0 {
            return Err(Error::InvalidInput("max_pages must be > 0".to_string()));
        }
        Ok(Self { fetcher, max_pages })
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }
}

#[async_trait]
impl<F: PageFetcher> LookupService for PaginatedLookup<F> {
    #[tracing::instrument(level = "info", skip(self))]
    async fn lookup(&self, name: &str) -> LookupOutcome {
        let mut items: Vec<CaseRecord> = match self.fetcher.fetch_page(name, 1).await {
            Ok(first) if first.is_empty() => {
                tracing::info!("lookup returned no results");
                return LookupOutcome::NoResults;
            }
            Ok(first) => first,
            Err(e) => {
                tracing::warn!(error = %e, "lookup failed on first page");
                return LookupOutcome::ApiError {
                    reason: e.to_string(),
                };
            }
        };
        let mut pages = 1u32;

        for page in 2..=self.max_pages {
            match self.fetcher.fetch_page(name, page).await {
                Ok(batch) if batch.is_empty() => break,
                Ok(batch) => {
                    items.extend(batch);
                    pages = page;
                }
                Err(e) => {
                    tracing::warn!(page, error = %e, "lookup page failed; keeping earlier results");
                    break;
                }
            }
        }

        tracing::info!(items = items.len(), pages, "lookup found results");
        LookupOutcome::ResultsFound { items, pages }
    }
}
