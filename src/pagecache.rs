//! Page Cache
//!
//! Admission-gated cache of rendered request results. Only requests for
//! items near the head of the popularity ranking are admitted, which keeps
//! the cache footprint bounded by head-of-distribution traffic instead of
//! the whole catalog. Entries expire on a fixed TTL; there is no explicit
//! invalidation.
//!
//! A request is never cacheable when it has no `item` query parameter or
//! when it carries a `_` parameter (reserved for cache-busting nonces).

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, instrument, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::popularity::PopularityIndex;
use crate::store::OrderedStore;

/// Query parameter naming the requested item.
const ITEM_PARAM: &str = "item";

/// Query parameter reserved for cache-busting nonces.
const NONCE_PARAM: &str = "_";

/// Render callback supplied by the host. Absent callbacks are allowed;
/// a cacheable miss without one yields no content.
pub type RenderFn = dyn Fn(&str) -> String + Send + Sync;

/// Cached rendered page keyed by request fingerprint.
fn page_key(fingerprint: u64) -> String {
    format!("cache:{:016x}", fingerprint)
}

/// Page cache configuration
#[derive(Debug, Clone)]
pub struct PageCacheConfig {
    /// Popularity rank an item must beat to be cache-admissible
    pub admission_threshold: u64,
    /// Entry lifetime in seconds
    pub ttl_secs: u64,
}

impl Default for PageCacheConfig {
    fn default() -> Self {
        Self {
            admission_threshold: 10_000,
            ttl_secs: 300,
        }
    }
}

/// Popularity-gated cache of rendered request results.
pub struct PageCache {
    store: Arc<dyn OrderedStore>,
    popularity: Arc<PopularityIndex>,
    config: PageCacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    bypasses: AtomicU64,
}

impl PageCache {
    /// Create a page cache over the given store, consulting the shared
    /// popularity index for admission.
    pub fn new(store: Arc<dyn OrderedStore>, popularity: Arc<PopularityIndex>) -> Self {
        Self::with_config(store, popularity, PageCacheConfig::default())
    }

    /// Create a page cache with custom configuration.
    pub fn with_config(
        store: Arc<dyn OrderedStore>,
        popularity: Arc<PopularityIndex>,
        config: PageCacheConfig,
    ) -> Self {
        Self {
            store,
            popularity,
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            bypasses: AtomicU64::new(0),
        }
    }

    /// Extract the item id a request would be cached under.
    ///
    /// Fails with [`Error::MalformedRequest`] when the request is not a
    /// URL; yields `None` when the request carries no item id or carries a
    /// cache-busting `_` parameter.
    pub fn cacheable_item(request: &str) -> Result<Option<String>> {
        let url =
            Url::parse(request).map_err(|e| Error::MalformedRequest(format!("{}: {}", request, e)))?;

        let mut item = None;
        for (name, value) in url.query_pairs() {
            if name == NONCE_PARAM {
                return Ok(None);
            }
            if name == ITEM_PARAM {
                item = Some(value.into_owned());
            }
        }
        Ok(item)
    }

    /// Whether a request is admissible: it names an item, carries no
    /// cache-busting parameter, and the item ranks inside the admission
    /// threshold. Malformed requests and popularity-lookup failures both
    /// degrade to "not cacheable".
    pub async fn can_cache(&self, request: &str) -> bool {
        let item = match Self::cacheable_item(request) {
            Ok(Some(item)) => item,
            Ok(None) => return false,
            Err(e) => {
                debug!(request, error = %e, "unparseable request is not cacheable");
                return false;
            }
        };

        match self.popularity.rank(&item).await {
            Ok(Some(rank)) => rank < self.config.admission_threshold,
            Ok(None) => false,
            Err(e) => {
                warn!(item = %item, error = %e, "popularity lookup failed, bypassing cache");
                false
            }
        }
    }

    /// Serve a request through the cache.
    ///
    /// Non-admissible requests go straight to the render callback (or yield
    /// nothing when it is absent). Admissible requests are served from the
    /// cache when fingerprint lookup hits; on a miss the callback renders
    /// the content, which is stored under the fixed TTL and returned. A
    /// cacheable miss with no callback yields `Ok(None)`.
    #[instrument(skip(self, render))]
    pub async fn fetch(&self, request: &str, render: Option<&RenderFn>) -> Result<Option<String>> {
        if !self.can_cache(request).await {
            self.bypasses.fetch_add(1, Ordering::Relaxed);
            return Ok(render.map(|f| f(request)));
        }

        let key = page_key(Self::fingerprint(request));
        match self.store.get(&key).await {
            Ok(Some(content)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Some(content));
            }
            Ok(None) => {}
            // Degrade to a miss rather than failing the request path.
            Err(e) => {
                warn!(error = %e, "page cache read failed, treating as miss");
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let Some(render) = render else {
            return Ok(None);
        };

        let content = render(request);
        self.store
            .set_with_ttl(&key, &content, self.config.ttl_secs)
            .await?;
        Ok(Some(content))
    }

    /// Stable fingerprint of a request string, used as the cache key.
    pub fn fingerprint(request: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        request.hash(&mut hasher);
        hasher.finish()
    }

    /// Get cache statistics.
    pub fn stats(&self) -> PageCacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        PageCacheStats {
            hits,
            misses,
            bypasses: self.bypasses.load(Ordering::Relaxed),
            hit_ratio: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
        }
    }
}

/// Page cache statistics
#[derive(Debug, Clone, Default)]
pub struct PageCacheStats {
    /// Admissible requests served from cache
    pub hits: u64,
    /// Admissible requests that had to render
    pub misses: u64,
    /// Requests that bypassed the cache entirely
    pub bypasses: u64,
    /// Hit ratio over admissible requests (0.0 - 1.0)
    pub hit_ratio: f64,
}

// =============================================================================
// Tests
// =============================================================================
