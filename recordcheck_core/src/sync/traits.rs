use crate::Result;
use crate::models::SourceRecord;
use async_trait::async_trait;
use chrono::NaiveDate;

/// Read-only access to the system of record.
///
/// Implementations live in `recordcheck_integrations` or customer code.
#[async_trait]
pub trait SourceExtractor: Send + Sync {
    /// Extractor identifier, used in logs.
    fn id(&self) -> &'static str;

    /// Return the applications submitted within `[date_from, date_to]` (both inclusive),
    /// newest submission first.
    async fn fetch(&self, date_from: NaiveDate, date_to: NaiveDate) -> Result<Vec<SourceRecord>>;
}
