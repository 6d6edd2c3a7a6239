use crate::config::ScheduleConfig;
use crate::sync::engine::SyncEngine;
use crate::sync::models::{SyncResult, SyncStatus};
use crate::{Error, Result};
use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Summary of the most recent scheduled run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledRun {
    pub run_number: i64,
    pub date: NaiveDate,
    pub status: SyncStatus,
    pub message: String,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run: Option<ScheduledRun>,
}

#[derive(Default)]
struct SchedulerState {
    running: bool,
    next_run_at: Option<DateTime<Utc>>,
    last_run: Option<ScheduledRun>,
}

/// Daily trigger for the synchronization engine.
///
/// At each cron tick (evaluated in a fixed UTC offset) it syncs the previous
/// local calendar day: `run_sync(yesterday, yesterday)`.
pub struct DailySyncScheduler {
    engine: Arc<SyncEngine>,
    schedule: cron::Schedule,
    offset: FixedOffset,
    state: Mutex<SchedulerState>,
}

impl DailySyncScheduler {
    #[tracing::instrument(level = "debug", skip(engine))]
    pub fn new(engine: Arc<SyncEngine>, config: &ScheduleConfig) -> Result<Self> {
        config.validate()?;
        let schedule = cron::Schedule::from_str(&config.cron)
            .map_err(|e| Error::InvalidInput(format!("invalid cron expression: {e}")))?;
        let offset = FixedOffset::east_opt(config.utc_offset_minutes * 60).ok_or_else(|| {
            Error::InvalidInput(format!(
                "utc offset out of range: {} minutes",
                config.utc_offset_minutes
            ))
        })?;
        Ok(Self {
            engine,
            schedule,
            offset,
            state: Mutex::new(SchedulerState::default()),
        })
    }

    fn state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Next tick strictly after `now`.
    pub fn next_run_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule
            .after(&now.with_timezone(&self.offset))
            .next()
            .map(|t| t.with_timezone(&Utc))
    }

    /// Previous calendar day in the scheduler's local time.
    pub fn yesterday(&self, now: DateTime<Utc>) -> NaiveDate {
        let today = now.with_timezone(&self.offset).date_naive();
        today - ChronoDuration::days(1)
    }

    pub fn status(&self) -> SchedulerStatus {
        let state = self.state();
        SchedulerStatus {
            running: state.running,
            next_run_at: state.next_run_at,
            last_run: state.last_run.clone(),
        }
    }

    /// Sync yesterday relative to `now` and remember the result.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn run_once(&self, now: DateTime<Utc>) -> (bool, SyncResult) {
        let day = self.yesterday(now);
        let (ok, result) = self.engine.run_sync(day, day).await;
        self.state().last_run = Some(ScheduledRun {
            run_number: result.run_number,
            date: day,
            status: result.status,
            message: result.message.clone(),
            finished_at: result.finished_at,
        });
        (ok, result)
    }

    /// Spawn the scheduling loop. It exits when `shutdown` flips to `true` or its sender drops.
    pub fn start(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run_loop(shutdown).await })
    }

    #[tracing::instrument(level = "info", skip_all)]
    async fn run_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        self.state().running = true;
        loop {
            if *shutdown.borrow() {
                break;
            }
            let now = Utc::now();
            let Some(next) = self.next_run_after(now) else {
                tracing::error!("cron schedule has no upcoming run; scheduler exiting");
                break;
            };
            self.state().next_run_at = Some(next);
            tracing::info!(next_run_at = %next, "next scheduled sync");

            let wait = (next - now).to_std().unwrap_or_default();
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(wait) => {
                    let (ok, result) = self.run_once(Utc::now()).await;
                    if !ok {
                        tracing::error!(run_number = result.run_number, message = %result.message, "scheduled sync failed");
                    }
                }
            }
        }
        let mut state = self.state();
        state.running = false;
        state.next_run_at = None;
        tracing::info!("daily sync scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryOperationalDb;
    use crate::test_support::{StaticExtractor, source_record};
    use std::time::Duration;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn scheduler(extractor: Arc<StaticExtractor>) -> Arc<DailySyncScheduler> {
        let engine = SyncEngine::new(
            Arc::new(MemoryOperationalDb::new()),
            extractor,
            "client_sync",
        )
        .unwrap();
        Arc::new(DailySyncScheduler::new(Arc::new(engine), &ScheduleConfig::default()).unwrap())
    }

    #[test]
    fn next_run_is_seven_local_time() {
        let s = scheduler(Arc::new(StaticExtractor::new(vec![])));
        assert_eq!(
            s.next_run_after(at("2025-10-01T11:59:00Z")),
            Some(at("2025-10-01T12:00:00Z"))
        );
        assert_eq!(
            s.next_run_after(at("2025-10-01T12:00:00Z")),
            Some(at("2025-10-02T12:00:00Z"))
        );
    }

    #[test]
    fn yesterday_uses_local_calendar() {
        let s = scheduler(Arc::new(StaticExtractor::new(vec![])));
        // 03:00 UTC is still the previous evening at UTC-5.
        assert_eq!(
            s.yesterday(at("2025-10-01T03:00:00Z")),
            NaiveDate::from_ymd_opt(2025, 9, 29).unwrap()
        );
        assert_eq!(
            s.yesterday(at("2025-10-01T12:00:00Z")),
            NaiveDate::from_ymd_opt(2025, 9, 30).unwrap()
        );
    }

    #[tokio::test]
    async fn run_once_syncs_yesterday_and_records_it() {
        let extractor = Arc::new(StaticExtractor::new(vec![source_record(1, "PEREZ", "JUAN")]));
        let s = scheduler(extractor.clone());

        let (ok, result) = s.run_once(at("2025-10-01T12:00:00Z")).await;
        assert!(ok);
        let day = NaiveDate::from_ymd_opt(2025, 9, 30).unwrap();
        assert_eq!((result.date_from, result.date_to), (day, day));
        assert_eq!(extractor.ranges(), vec![(day, day)]);

        let last = s.status().last_run.unwrap();
        assert_eq!(last.date, day);
        assert_eq!(last.status, SyncStatus::Success);
    }

    #[test]
    fn invalid_cron_is_rejected() {
        let engine = SyncEngine::new(
            Arc::new(MemoryOperationalDb::new()),
            Arc::new(StaticExtractor::new(vec![])),
            "client_sync",
        )
        .unwrap();
        let cfg = ScheduleConfig {
            cron: "7am daily".to_string(),
            utc_offset_minutes: -300,
        };
        assert!(DailySyncScheduler::new(Arc::new(engine), &cfg).is_err());
    }

    #[tokio::test]
    async fn loop_reports_next_run_and_stops_on_shutdown() {
        let s = scheduler(Arc::new(StaticExtractor::new(vec![])));
        let (tx, rx) = watch::channel(false);
        let handle = s.start(rx);

        for _ in 0..100 {
            if s.status().next_run_at.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let status = s.status();
        assert!(status.running);
        assert!(status.next_run_at.unwrap() > Utc::now());

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(!s.status().running);
    }
}
