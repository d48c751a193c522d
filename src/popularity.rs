//! Popularity Index
//!
//! Single global view-count ranking shared by every component. Each view
//! lowers an item's score by one, so the most-viewed item sits at rank 0
//! with the most negative score. The index is mutated only through the
//! atomic increment below and read only through rank/score lookups; no
//! component owns it or mutates it directly.
//!
//! There is no eviction: items stay ranked forever once viewed. Hosts with
//! very large catalogs should expect the index to grow without bound.

use std::sync::Arc;

use tracing::instrument;

use crate::error::Result;
use crate::store::OrderedStore;

/// Sorted-set key holding the global item view counts.
const VIEWED_KEY: &str = "viewed:";

/// Global per-item view ranking (lower score = more views = better rank).
pub struct PopularityIndex {
    store: Arc<dyn OrderedStore>,
}

impl PopularityIndex {
    /// Create an index over the given store.
    pub fn new(store: Arc<dyn OrderedStore>) -> Self {
        Self { store }
    }

    /// Record one view of an item. Returns the item's new score.
    #[instrument(skip(self))]
    pub async fn record_view(&self, item: &str) -> Result<f64> {
        self.store.zincrby(VIEWED_KEY, -1.0, item).await
    }

    /// 0-based rank of an item by view count, or `None` if it has never
    /// been viewed. Rank 0 is the most-viewed item.
    pub async fn rank(&self, item: &str) -> Result<Option<u64>> {
        self.store.zrank(VIEWED_KEY, item).await
    }

    /// Total recorded views for an item (0 if never viewed).
    pub async fn view_count(&self, item: &str) -> Result<u64> {
        let score = self.store.zscore(VIEWED_KEY, item).await?;
        Ok(score.map(|s| (-s).max(0.0) as u64).unwrap_or(0))
    }

    /// Number of distinct items ever viewed.
    pub async fn tracked_items(&self) -> Result<u64> {
        self.store.zcard(VIEWED_KEY).await
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn index() -> PopularityIndex {
        PopularityIndex::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_unviewed_item_has_no_rank() {
        let popularity = index();
        assert_eq!(popularity.rank("itemX").await.unwrap(), None);
        assert_eq!(popularity.view_count("itemX").await.unwrap(), 0);
        assert_eq!(popularity.tracked_items().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_views_accumulate() {
        let popularity = index();

        popularity.record_view("itemX").await.unwrap();
        popularity.record_view("itemX").await.unwrap();
        let score = popularity.record_view("itemX").await.unwrap();

        assert_eq!(score, -3.0);
        assert_eq!(popularity.view_count("itemX").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_rank_is_monotonic_in_views() {
        let popularity = index();

        for _ in 0..5 {
            popularity.record_view("hot").await.unwrap();
        }
        for _ in 0..2 {
            popularity.record_view("warm").await.unwrap();
        }
        popularity.record_view("cold").await.unwrap();

        let hot = popularity.rank("hot").await.unwrap().unwrap();
        let warm = popularity.rank("warm").await.unwrap().unwrap();
        let cold = popularity.rank("cold").await.unwrap().unwrap();

        assert!(hot < warm);
        assert!(warm < cold);
        assert_eq!(hot, 0);
        assert_eq!(popularity.tracked_items().await.unwrap(), 3);
    }
}
