//! Ordered Key-Value Store Port
//!
//! This module defines the storage abstraction every engine component acts
//! through. The engine never touches a concrete store directly; hosts hand
//! each component an `Arc<dyn OrderedStore>` and own the connection
//! lifecycle.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Engine Components                        │
//! │   SessionIndex │ SessionReaper │ RowCacheScheduler │ ...     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  OrderedStore (port)                         │
//! │        hash │ set │ sorted set │ string │ expiry             │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │          Adapters: MemoryStore │ (host-provided)             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Single-key structural operations (increment, conditional add,
//! range-by-score) are atomic per key; there is no multi-key transaction.
//! Components get cross-entity consistency from write ordering, not locks.

mod memory;

pub use memory::{MemoryStore, MemoryStoreStats};

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;

/// Port for an ordered key-value service exposing hashes, sets,
/// score-ordered sets, plain strings, and absolute-time expiry.
///
/// Range indexes follow the usual ordered-set convention: `start`/`stop`
/// are inclusive ranks, and negative values count back from the end
/// (`-1` is the highest-ranked member).
#[async_trait]
pub trait OrderedStore: Send + Sync {
    // -------------------------------------------------------------------------
    // Hash operations
    // -------------------------------------------------------------------------

    /// Set a field in a hash. Returns true if the field was newly created.
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<bool>;

    /// Get a field from a hash.
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>>;

    /// Get all fields and values of a hash. Missing hashes are empty.
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>>;

    /// Delete fields from a hash. Returns the number of fields removed.
    async fn hdel(&self, key: &str, fields: &[String]) -> Result<u64>;

    /// Number of fields in a hash.
    async fn hlen(&self, key: &str) -> Result<u64>;

    // -------------------------------------------------------------------------
    // Set operations
    // -------------------------------------------------------------------------

    /// Add a member to a set. Returns true if the member was newly added.
    async fn sadd(&self, key: &str, member: &str) -> Result<bool>;

    /// Remove a member from a set. Returns true if the member was present.
    async fn srem(&self, key: &str, member: &str) -> Result<bool>;

    /// Membership test.
    async fn sismember(&self, key: &str, member: &str) -> Result<bool>;

    // -------------------------------------------------------------------------
    // Sorted-set operations
    // -------------------------------------------------------------------------

    /// Add or update a member with the given score. Returns true if the
    /// member was newly added (false on score update).
    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<bool>;

    /// Atomically add `delta` to a member's score (missing members start
    /// at zero). Returns the new score.
    async fn zincrby(&self, key: &str, delta: f64, member: &str) -> Result<f64>;

    /// Score of a member, if present.
    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>>;

    /// 0-based rank of a member by ascending score, if present.
    async fn zrank(&self, key: &str, member: &str) -> Result<Option<u64>>;

    /// Remove members. Returns the number removed.
    async fn zrem(&self, key: &str, members: &[String]) -> Result<u64>;

    /// Members with ranks in `[start, stop]`, ascending by score.
    async fn zrange_by_rank(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>>;

    /// Members and scores with ranks in `[start, stop]`, ascending by score.
    async fn zrange_by_rank_with_scores(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> Result<Vec<(String, f64)>>;

    /// Remove members with ranks in `[start, stop]`. Returns the number
    /// removed.
    async fn zremrange_by_rank(&self, key: &str, start: i64, stop: i64) -> Result<u64>;

    /// Members with scores in `[min, max]`, ascending by score.
    async fn zrange_by_score(&self, key: &str, min: f64, max: f64) -> Result<Vec<String>>;

    /// Cardinality of a sorted set.
    async fn zcard(&self, key: &str) -> Result<u64>;

    // -------------------------------------------------------------------------
    // String operations
    // -------------------------------------------------------------------------

    /// Set a string value, clearing any expiry.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Get a string value. Expired keys read as absent.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Set a string value that expires `ttl_secs` from now.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;

    /// Delete keys of any type. Returns the number of keys removed.
    async fn del(&self, keys: &[String]) -> Result<u64>;

    // -------------------------------------------------------------------------
    // Expiry
    // -------------------------------------------------------------------------

    /// Expire a key at an absolute epoch second. Returns false if the key
    /// does not exist.
    async fn expire_at(&self, key: &str, epoch_secs: i64) -> Result<bool>;
}
