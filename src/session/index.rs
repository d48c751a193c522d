//! Session Index
//!
//! Maps session tokens to user identities and keeps two ordered views of
//! activity: a global recency index (who touched the engine last) and a
//! capped per-session history of viewed items. Every view is also recorded
//! in the shared [`PopularityIndex`].

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::Result;
use crate::popularity::PopularityIndex;
use crate::store::OrderedStore;

/// Hash mapping session token -> user id.
pub(crate) const LOGIN_KEY: &str = "login:";

/// Sorted set mapping session token -> last-touch epoch seconds.
pub(crate) const RECENT_KEY: &str = "recent:";

/// Per-session view-history sorted set (item -> view epoch seconds).
pub(crate) fn viewed_key(token: &str) -> String {
    format!("viewed:{}", token)
}

/// Session index configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Most recent viewed items retained per session
    pub view_history_cap: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            view_history_cap: 25,
        }
    }
}

/// Recency-ordered session index with per-session view history.
pub struct SessionIndex {
    store: Arc<dyn OrderedStore>,
    popularity: Arc<PopularityIndex>,
    config: SessionConfig,
}

impl SessionIndex {
    /// Create an index over the given store, recording views in the shared
    /// popularity index.
    pub fn new(store: Arc<dyn OrderedStore>, popularity: Arc<PopularityIndex>) -> Self {
        Self::with_config(store, popularity, SessionConfig::default())
    }

    /// Create an index with custom configuration.
    pub fn with_config(
        store: Arc<dyn OrderedStore>,
        popularity: Arc<PopularityIndex>,
        config: SessionConfig,
    ) -> Self {
        Self {
            store,
            popularity,
            config,
        }
    }

    /// Generate a fresh opaque session token.
    pub fn generate_token() -> String {
        Uuid::new_v4().to_string()
    }

    /// Record activity for a session: upsert its identity mapping, stamp
    /// the recency index, and (when an item is given) append to the view
    /// history, trim the history to the configured cap, and record the
    /// view in the popularity index.
    ///
    /// Idempotent under repeated identical calls within the same second
    /// apart from the popularity count, which grows per call.
    #[instrument(skip(self, user_id), fields(token = %token))]
    pub async fn touch(
        &self,
        token: &str,
        user_id: &str,
        viewed_item: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now().timestamp() as f64;

        self.store.hset(LOGIN_KEY, token, user_id).await?;
        self.store.zadd(RECENT_KEY, token, now).await?;

        if let Some(item) = viewed_item {
            let history = viewed_key(token);
            self.store.zadd(&history, item, now).await?;
            // Drop everything older than the newest `cap` entries.
            let cutoff = -(self.config.view_history_cap as i64) - 1;
            self.store.zremrange_by_rank(&history, 0, cutoff).await?;
            self.popularity.record_view(item).await?;
        }

        Ok(())
    }

    /// Look up the user behind a token. No side effects.
    pub async fn lookup(&self, token: &str) -> Result<Option<String>> {
        self.store.hget(LOGIN_KEY, token).await
    }

    /// The `count` oldest-touch tokens, oldest first.
    pub async fn oldest(&self, count: u64) -> Result<Vec<String>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        self.store
            .zrange_by_rank(RECENT_KEY, 0, count as i64 - 1)
            .await
    }

    /// Remove identity, recency, and view history for each token. Missing
    /// entries are not errors; returns how many recency entries were
    /// actually removed.
    #[instrument(skip(self, tokens), fields(batch = tokens.len()))]
    pub async fn evict_batch(&self, tokens: &[String]) -> Result<u64> {
        if tokens.is_empty() {
            return Ok(0);
        }

        let history_keys: Vec<String> = tokens.iter().map(|t| viewed_key(t)).collect();
        self.store.del(&history_keys).await?;
        self.store.hdel(LOGIN_KEY, tokens).await?;
        let removed = self.store.zrem(RECENT_KEY, tokens).await?;

        debug!(removed, "evicted session batch");
        Ok(removed)
    }

    /// Number of known sessions (identity mappings).
    pub async fn count(&self) -> Result<u64> {
        self.store.hlen(LOGIN_KEY).await
    }

    /// Cardinality of the recency index.
    pub async fn recency_size(&self) -> Result<u64> {
        self.store.zcard(RECENT_KEY).await
    }

    /// Items in a session's view history, oldest first.
    pub async fn view_history(&self, token: &str) -> Result<Vec<String>> {
        self.store.zrange_by_rank(&viewed_key(token), 0, -1).await
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn make_index() -> (SessionIndex, Arc<PopularityIndex>) {
        let store: Arc<dyn OrderedStore> = Arc::new(MemoryStore::new());
        let popularity = Arc::new(PopularityIndex::new(store.clone()));
        (SessionIndex::new(store, popularity.clone()), popularity)
    }

    #[tokio::test]
    async fn test_touch_then_lookup() {
        let (index, _) = make_index();

        index.touch("tok-1", "alice", Some("itemX")).await.unwrap();
        assert_eq!(
            index.lookup("tok-1").await.unwrap(),
            Some("alice".to_string())
        );
        assert_eq!(index.lookup("tok-2").await.unwrap(), None);
        assert_eq!(index.count().await.unwrap(), 1);
        assert_eq!(index.recency_size().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_touch_without_item_skips_history() {
        let (index, popularity) = make_index();

        index.touch("tok-1", "alice", None).await.unwrap();
        assert!(index.view_history("tok-1").await.unwrap().is_empty());
        assert_eq!(popularity.tracked_items().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_touch_records_popularity() {
        let (index, popularity) = make_index();

        index.touch("tok-1", "alice", Some("itemX")).await.unwrap();
        index.touch("tok-2", "bob", Some("itemX")).await.unwrap();

        assert_eq!(popularity.view_count("itemX").await.unwrap(), 2);
        assert_eq!(popularity.rank("itemX").await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_view_history_is_capped() {
        let (index, _) = make_index();

        for i in 0..40 {
            index
                .touch("tok-1", "alice", Some(&format!("item{}", i)))
                .await
                .unwrap();
        }

        let history = index.view_history("tok-1").await.unwrap();
        assert_eq!(history.len(), 25);
    }

    #[tokio::test]
    async fn test_repeated_touch_is_idempotent() {
        let (index, _) = make_index();

        index.touch("tok-1", "alice", Some("itemX")).await.unwrap();
        index.touch("tok-1", "alice", Some("itemX")).await.unwrap();

        assert_eq!(index.count().await.unwrap(), 1);
        assert_eq!(index.recency_size().await.unwrap(), 1);
        assert_eq!(index.view_history("tok-1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_evict_batch_cascades() {
        let (index, _) = make_index();

        index.touch("tok-1", "alice", Some("itemX")).await.unwrap();
        index.touch("tok-2", "bob", Some("itemY")).await.unwrap();

        let removed = index
            .evict_batch(&["tok-1".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);

        assert_eq!(index.lookup("tok-1").await.unwrap(), None);
        assert!(index.view_history("tok-1").await.unwrap().is_empty());
        assert_eq!(index.recency_size().await.unwrap(), 1);
        // Untouched sessions survive
        assert_eq!(index.lookup("tok-2").await.unwrap(), Some("bob".into()));
    }

    #[tokio::test]
    async fn test_oldest_returns_lowest_ranked() {
        let store: Arc<dyn OrderedStore> = Arc::new(MemoryStore::new());
        let popularity = Arc::new(PopularityIndex::new(store.clone()));
        let index = SessionIndex::new(store.clone(), popularity);

        // Backdate the recency scores so ordering is deterministic.
        for (i, tok) in ["a", "b", "c"].iter().enumerate() {
            store.hset(LOGIN_KEY, tok, "user").await.unwrap();
            store.zadd(RECENT_KEY, tok, i as f64).await.unwrap();
        }

        assert_eq!(index.oldest(2).await.unwrap(), vec!["a", "b"]);
        assert!(index.oldest(0).await.unwrap().is_empty());
    }

    #[test]
    fn test_generated_tokens_are_unique() {
        let a = SessionIndex::generate_token();
        let b = SessionIndex::generate_token();
        assert_ne!(a, b);
    }

    // =========================================================================
    // Property Tests
    // =========================================================================

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// No touch sequence can push a session's view history past
            /// the configured cap.
            #[test]
            fn view_history_never_exceeds_cap(
                items in proptest::collection::vec("[a-z]{1,4}", 1..80),
            ) {
                tokio_test::block_on(async {
                    let (index, _) = make_index();
                    for item in &items {
                        index.touch("tok", "user", Some(item)).await.unwrap();
                    }
                    let history = index.view_history("tok").await.unwrap();
                    prop_assert!(history.len() <= 25);
                    Ok(())
                })?;
            }
        }
    }
}
