//! Session Reaper
//!
//! Background worker that keeps the recency index at or below a configured
//! capacity. Each cycle evicts at most a bounded batch of the oldest-touch
//! sessions, so a load spike never turns into one unbounded sweep; the
//! remainder is picked up by the following cycles.
//!
//! Stopping is cooperative: the cancellation token is checked at the top of
//! every cycle and observed during the idle sleep, and an in-flight batch
//! always runs to completion.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::{CartStore, SessionIndex};
use crate::error::Result;

/// Session reaper configuration
#[derive(Debug, Clone)]
pub struct ReaperConfig {
    /// Sessions allowed in the recency index before eviction starts
    pub capacity_limit: u64,
    /// Maximum sessions evicted per cycle
    pub batch_cap: u64,
    /// Sleep between cycles while at or under capacity
    pub idle_interval: Duration,
    /// Also clear each evicted session's cart
    pub full_cleanup: bool,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            capacity_limit: 10_000_000,
            batch_cap: 100,
            idle_interval: Duration::from_secs(1),
            full_cleanup: false,
        }
    }
}

/// Background worker enforcing the session capacity bound.
pub struct SessionReaper {
    sessions: Arc<SessionIndex>,
    carts: Arc<CartStore>,
    config: ReaperConfig,
    cancel: CancellationToken,
    cycles: AtomicU64,
    evicted: AtomicU64,
}

/// What one cycle did.
enum Cycle {
    /// At or under capacity; nothing to do.
    Idle,
    /// Evicted this many sessions.
    Evicted(u64),
}

impl SessionReaper {
    /// Create a reaper over the given session index and cart store.
    pub fn new(sessions: Arc<SessionIndex>, carts: Arc<CartStore>, config: ReaperConfig) -> Arc<Self> {
        Arc::new(Self {
            sessions,
            carts,
            config,
            cancel: CancellationToken::new(),
            cycles: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        })
    }

    /// Run the reaper loop until [`stop`](Self::stop) is called. A failing
    /// cycle logs and retries after the idle interval; only the stop signal
    /// ends the loop.
    #[instrument(skip(self))]
    pub async fn run(self: Arc<Self>) {
        info!(
            capacity_limit = self.config.capacity_limit,
            batch_cap = self.config.batch_cap,
            full_cleanup = self.config.full_cleanup,
            "session reaper started"
        );

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            match self.reap_cycle().await {
                Ok(Cycle::Evicted(count)) => {
                    debug!(count, "reaper evicted batch");
                    // Still over capacity is likely; go straight to the
                    // next batch.
                    continue;
                }
                Ok(Cycle::Idle) => {}
                Err(e) => {
                    warn!(error = %e, "reaper cycle failed, retrying next cycle");
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.idle_interval) => {}
            }
        }

        info!("session reaper stopped");
    }

    /// One reap cycle: measure the recency index and evict one bounded
    /// batch of the oldest sessions if it is over capacity.
    async fn reap_cycle(&self) -> Result<Cycle> {
        self.cycles.fetch_add(1, Ordering::Relaxed);

        let size = self.sessions.recency_size().await?;
        if size <= self.config.capacity_limit {
            return Ok(Cycle::Idle);
        }

        let excess = (size - self.config.capacity_limit).min(self.config.batch_cap);
        let tokens = self.sessions.oldest(excess).await?;
        if tokens.is_empty() {
            return Ok(Cycle::Idle);
        }

        let removed = self.sessions.evict_batch(&tokens).await?;
        if self.config.full_cleanup {
            self.carts.clear_batch(&tokens).await?;
        }

        self.evicted.fetch_add(removed, Ordering::Relaxed);
        Ok(Cycle::Evicted(removed))
    }

    /// Signal the loop to stop. Observed within one idle interval; the
    /// caller joins the task handle to wait for exit.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Get reaper statistics.
    pub fn stats(&self) -> ReaperStats {
        ReaperStats {
            cycles: self.cycles.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
        }
    }
}

/// Reaper statistics
#[derive(Debug, Clone, Default)]
pub struct ReaperStats {
    /// Cycles executed (idle cycles included)
    pub cycles: u64,
    /// Sessions evicted over the reaper's lifetime
    pub evicted: u64,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::popularity::PopularityIndex;
    use crate::store::{MemoryStore, OrderedStore};

    fn make_engine() -> (Arc<SessionIndex>, Arc<CartStore>) {
        let store: Arc<dyn OrderedStore> = Arc::new(MemoryStore::new());
        let popularity = Arc::new(PopularityIndex::new(store.clone()));
        let sessions = Arc::new(SessionIndex::new(store.clone(), popularity));
        let carts = Arc::new(CartStore::new(store));
        (sessions, carts)
    }

    #[tokio::test]
    async fn test_idle_under_capacity() {
        let (sessions, carts) = make_engine();
        sessions.touch("tok", "alice", None).await.unwrap();

        let reaper = SessionReaper::new(
            sessions.clone(),
            carts,
            ReaperConfig {
                capacity_limit: 10,
                ..Default::default()
            },
        );

        assert!(matches!(reaper.reap_cycle().await.unwrap(), Cycle::Idle));
        assert_eq!(sessions.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_evicts_oldest_down_to_capacity() {
        let (sessions, carts) = make_engine();
        for i in 0..5 {
            sessions
                .touch(&format!("tok-{}", i), "user", Some("itemX"))
                .await
                .unwrap();
        }

        let reaper = SessionReaper::new(
            sessions.clone(),
            carts,
            ReaperConfig {
                capacity_limit: 2,
                ..Default::default()
            },
        );

        match reaper.reap_cycle().await.unwrap() {
            Cycle::Evicted(count) => assert_eq!(count, 3),
            Cycle::Idle => panic!("expected an eviction cycle"),
        }
        assert_eq!(sessions.recency_size().await.unwrap(), 2);
        assert_eq!(reaper.stats().evicted, 3);
    }

    #[tokio::test]
    async fn test_batch_cap_bounds_each_cycle() {
        let (sessions, carts) = make_engine();
        for i in 0..10 {
            sessions
                .touch(&format!("tok-{}", i), "user", None)
                .await
                .unwrap();
        }

        let reaper = SessionReaper::new(
            sessions.clone(),
            carts,
            ReaperConfig {
                capacity_limit: 0,
                batch_cap: 4,
                ..Default::default()
            },
        );

        match reaper.reap_cycle().await.unwrap() {
            Cycle::Evicted(count) => assert_eq!(count, 4),
            Cycle::Idle => panic!("expected an eviction cycle"),
        }
        assert_eq!(sessions.recency_size().await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_full_cleanup_clears_carts() {
        let (sessions, carts) = make_engine();
        sessions.touch("tok", "alice", Some("itemX")).await.unwrap();
        carts.set_quantity("tok", "itemY", 3).await.unwrap();

        let reaper = SessionReaper::new(
            sessions.clone(),
            carts.clone(),
            ReaperConfig {
                capacity_limit: 0,
                full_cleanup: true,
                ..Default::default()
            },
        );

        match reaper.reap_cycle().await.unwrap() {
            Cycle::Evicted(count) => assert_eq!(count, 1),
            Cycle::Idle => panic!("expected an eviction cycle"),
        }
        assert!(carts.get_cart("tok").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_carts_survive_without_full_cleanup() {
        let (sessions, carts) = make_engine();
        sessions.touch("tok", "alice", None).await.unwrap();
        carts.set_quantity("tok", "itemY", 3).await.unwrap();

        let reaper = SessionReaper::new(
            sessions.clone(),
            carts.clone(),
            ReaperConfig {
                capacity_limit: 0,
                ..Default::default()
            },
        );

        reaper.reap_cycle().await.unwrap();
        assert_eq!(sessions.count().await.unwrap(), 0);
        assert_eq!(carts.get_cart("tok").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stop_is_observed_during_idle_sleep() {
        let (sessions, carts) = make_engine();
        let reaper = SessionReaper::new(
            sessions,
            carts,
            ReaperConfig {
                capacity_limit: 10,
                idle_interval: Duration::from_secs(30),
                ..Default::default()
            },
        );

        let handle = tokio::spawn(reaper.clone().run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        reaper.stop();

        // Must exit well before the 30s idle interval elapses.
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("reaper did not observe stop signal")
            .unwrap();
    }
}
