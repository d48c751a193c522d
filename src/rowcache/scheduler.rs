//! Row Cache Scheduler Loop
//!
//! Two sorted sets drive the loop: a delay table (row -> refresh cadence in
//! seconds) and a due-time queue (row -> next refresh time). A row appears
//! in the queue exactly once; rescheduling overwrites the due time, never
//! duplicates the entry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::source::RowSource;
use crate::error::{Error, Result};
use crate::store::OrderedStore;

/// Sorted set mapping row id -> refresh cadence in seconds.
const DELAY_KEY: &str = "delay:";

/// Sorted set mapping row id -> next due time (epoch seconds).
const SCHEDULE_KEY: &str = "schedule:";

/// Cached snapshot of a row.
pub(crate) fn row_cache_key(row_id: &str) -> String {
    format!("inv:{}", row_id)
}

/// Current time as fractional epoch seconds, so sub-second due times
/// compare correctly against the poll cadence.
fn now_secs() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

/// Row cache scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Sleep between polls when nothing is due
    pub poll_interval: Duration,
    /// How far to push a row's due time after a failed upstream fetch
    pub retry_backoff: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
            retry_backoff: Duration::from_secs(1),
        }
    }
}

/// Background worker that republishes cached row snapshots on schedule.
pub struct RowCacheScheduler {
    store: Arc<dyn OrderedStore>,
    source: Arc<dyn RowSource>,
    config: SchedulerConfig,
    cancel: CancellationToken,
    refreshed: AtomicU64,
    uncached: AtomicU64,
    fetch_failures: AtomicU64,
}

impl RowCacheScheduler {
    /// Create a scheduler over the given store and upstream source.
    pub fn new(store: Arc<dyn OrderedStore>, source: Arc<dyn RowSource>) -> Arc<Self> {
        Self::with_config(store, source, SchedulerConfig::default())
    }

    /// Create a scheduler with custom configuration.
    pub fn with_config(
        store: Arc<dyn OrderedStore>,
        source: Arc<dyn RowSource>,
        config: SchedulerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            source,
            config,
            cancel: CancellationToken::new(),
            refreshed: AtomicU64::new(0),
            uncached: AtomicU64::new(0),
            fetch_failures: AtomicU64::new(0),
        })
    }

    /// Declare how often a row should be refreshed. The row comes due
    /// immediately, so the next loop cycle populates its cache. A delay of
    /// zero or less tells the loop to uncache the row instead.
    ///
    /// Calling this again for the same row overwrites both entries; a row
    /// never holds more than one place in the queue.
    #[instrument(skip(self))]
    pub async fn schedule(&self, row_id: &str, delay_secs: i64) -> Result<()> {
        self.store
            .zadd(DELAY_KEY, row_id, delay_secs as f64)
            .await?;
        self.store.zadd(SCHEDULE_KEY, row_id, now_secs()).await?;
        debug!(row_id, delay_secs, "row scheduled");
        Ok(())
    }

    /// Run the scheduler loop until [`stop`](Self::stop) is called. Store
    /// failures log and retry after the poll interval; upstream fetch
    /// failures push the affected row's due time forward by the retry
    /// backoff without touching its cached snapshot.
    #[instrument(skip(self))]
    pub async fn run(self: Arc<Self>) {
        info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "row cache scheduler started"
        );

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            match self.tick().await {
                // Processed a row; more may already be due.
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    warn!(error = %e, "scheduler cycle failed, retrying next poll");
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        info!("row cache scheduler stopped");
    }

    /// One scheduling step. Returns true when a due row was processed,
    /// false when the queue is empty or its head is still in the future.
    async fn tick(&self) -> Result<bool> {
        let head = self
            .store
            .zrange_by_rank_with_scores(SCHEDULE_KEY, 0, 0)
            .await?;

        let now = now_secs();
        let Some((row_id, due)) = head.into_iter().next() else {
            return Ok(false);
        };
        if due > now {
            return Ok(false);
        }

        let delay = self.store.zscore(DELAY_KEY, &row_id).await?.unwrap_or(0.0);
        if delay <= 0.0 {
            self.uncache(&row_id).await?;
            return Ok(true);
        }

        match self.source.fetch_row(&row_id).await {
            Ok(snapshot) => {
                // Reschedule before publishing, matching the ordering the
                // rest of the engine relies on for consistency.
                self.store
                    .zadd(SCHEDULE_KEY, &row_id, now + delay)
                    .await?;
                let payload = serde_json::to_string(&snapshot)
                    .map_err(|e| Error::Internal(format!("snapshot serialization: {}", e)))?;
                self.store.set(&row_cache_key(&row_id), &payload).await?;

                self.refreshed.fetch_add(1, Ordering::Relaxed);
                debug!(row_id = %row_id, "row snapshot refreshed");
            }
            Err(e) => {
                self.fetch_failures.fetch_add(1, Ordering::Relaxed);
                warn!(row_id = %row_id, error = %e, "upstream fetch failed, backing off");
                let backoff = self.config.retry_backoff.as_secs_f64();
                self.store
                    .zadd(SCHEDULE_KEY, &row_id, now + backoff)
                    .await?;
            }
        }

        Ok(true)
    }

    /// Remove a row from both schedule tables and delete its cached
    /// snapshot.
    async fn uncache(&self, row_id: &str) -> Result<()> {
        let member = [row_id.to_string()];
        self.store.zrem(DELAY_KEY, &member).await?;
        self.store.zrem(SCHEDULE_KEY, &member).await?;
        self.store.del(&[row_cache_key(row_id)]).await?;

        self.uncached.fetch_add(1, Ordering::Relaxed);
        debug!(row_id, "row uncached");
        Ok(())
    }

    /// The cached snapshot of a row, if one is published.
    pub async fn cached_row(&self, row_id: &str) -> Result<Option<String>> {
        self.store.get(&row_cache_key(row_id)).await
    }

    /// Rows currently holding a place in the due-time queue.
    pub async fn scheduled_rows(&self) -> Result<Vec<(String, f64)>> {
        self.store
            .zrange_by_rank_with_scores(SCHEDULE_KEY, 0, -1)
            .await
    }

    /// Signal the loop to stop. Observed within one poll interval; the
    /// caller joins the task handle to wait for exit.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Get scheduler statistics.
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            refreshed: self.refreshed.load(Ordering::Relaxed),
            uncached: self.uncached.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
        }
    }
}

/// Scheduler statistics
#[derive(Debug, Clone, Default)]
pub struct SchedulerStats {
    /// Snapshots published
    pub refreshed: u64,
    /// Rows removed via the uncache path
    pub uncached: u64,
    /// Upstream fetches that failed
    pub fetch_failures: u64,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rowcache::source::{InMemoryRowSource, RowSnapshot};
    use crate::store::MemoryStore;
    use async_trait::async_trait;

    fn make_scheduler() -> (Arc<RowCacheScheduler>, Arc<InMemoryRowSource>) {
        let store: Arc<dyn OrderedStore> = Arc::new(MemoryStore::new());
        let source = Arc::new(InMemoryRowSource::new());
        (RowCacheScheduler::new(store, source.clone()), source)
    }

    #[tokio::test]
    async fn test_schedule_is_idempotent() {
        let (scheduler, _) = make_scheduler();

        scheduler.schedule("itemX", 5).await.unwrap();
        scheduler.schedule("itemX", 5).await.unwrap();

        let rows = scheduler.scheduled_rows().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, "itemX");
    }

    #[tokio::test]
    async fn test_due_row_is_refreshed_and_rescheduled() {
        let (scheduler, source) = make_scheduler();
        source.insert("itemX", "widgets");

        scheduler.schedule("itemX", 5).await.unwrap();
        assert!(scheduler.tick().await.unwrap());

        let cached = scheduler.cached_row("itemX").await.unwrap().unwrap();
        let snapshot: RowSnapshot = serde_json::from_str(&cached).unwrap();
        assert_eq!(snapshot.data, "widgets");

        // Rescheduled roughly `delay` ahead, still exactly one entry.
        let rows = scheduler.scheduled_rows().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].1 > now_secs() + 3.0);
        assert_eq!(scheduler.stats().refreshed, 1);
    }

    #[tokio::test]
    async fn test_future_due_time_is_not_processed() {
        let (scheduler, _) = make_scheduler();

        scheduler.schedule("itemX", 5).await.unwrap();
        assert!(scheduler.tick().await.unwrap());
        // Head is now in the future; nothing to do.
        assert!(!scheduler.tick().await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_queue_is_not_processed() {
        let (scheduler, _) = make_scheduler();
        assert!(!scheduler.tick().await.unwrap());
    }

    #[tokio::test]
    async fn test_non_positive_delay_uncaches() {
        let (scheduler, _) = make_scheduler();

        scheduler.schedule("itemX", 5).await.unwrap();
        scheduler.tick().await.unwrap();
        assert!(scheduler.cached_row("itemX").await.unwrap().is_some());

        scheduler.schedule("itemX", -1).await.unwrap();
        scheduler.tick().await.unwrap();

        assert!(scheduler.cached_row("itemX").await.unwrap().is_none());
        assert!(scheduler.scheduled_rows().await.unwrap().is_empty());
        assert_eq!(scheduler.stats().uncached, 1);
    }

    struct FailingSource;

    #[async_trait]
    impl RowSource for FailingSource {
        async fn fetch_row(&self, row_id: &str) -> crate::error::Result<RowSnapshot> {
            Err(Error::UpstreamFetch {
                row_id: row_id.to_string(),
                reason: "unreachable".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_fetch_failure_backs_off_and_keeps_cache() {
        let store: Arc<dyn OrderedStore> = Arc::new(MemoryStore::new());
        let scheduler =
            RowCacheScheduler::new(store.clone(), Arc::new(FailingSource));

        // Pre-existing cached value must survive the failed refresh.
        store.set(&row_cache_key("itemX"), "stale").await.unwrap();
        scheduler.schedule("itemX", 5).await.unwrap();

        assert!(scheduler.tick().await.unwrap());
        assert_eq!(scheduler.stats().fetch_failures, 1);
        assert_eq!(
            scheduler.cached_row("itemX").await.unwrap(),
            Some("stale".to_string())
        );

        // Due time pushed forward by the backoff, so the next tick idles.
        assert!(!scheduler.tick().await.unwrap());
    }

    #[tokio::test]
    async fn test_stop_is_observed_during_poll_sleep() {
        let (scheduler, _) = make_scheduler();

        let handle = tokio::spawn(scheduler.clone().run());
        tokio::time::sleep(Duration::from_millis(20)).await;
        scheduler.stop();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("scheduler did not observe stop signal")
            .unwrap();
    }
}
