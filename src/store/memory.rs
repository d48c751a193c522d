//! In-Memory Store Adapter
//!
//! In-process `OrderedStore` adapter for tests, demos, and embedded hosts
//! that do not need an external store.
//!
//! # Design
//!
//! - One shared key space; each key holds exactly one value kind
//! - DashMap sharding for lock-free access on disjoint keys
//! - Sorted-set ranges sort on demand (cardinalities stay small in this
//!   engine's workloads)
//! - Lazy expiry: expired keys are dropped when read

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use super::OrderedStore;
use crate::error::{Error, Result};

/// A single keyed value. Operations against a key holding a different kind
/// fail the same way a wrong-type command fails on a real store.
enum Value {
    Hash(HashMap<String, String>),
    Set(HashSet<String>),
    ZSet(HashMap<String, f64>),
    Str(String),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Hash(_) => "hash",
            Value::Set(_) => "set",
            Value::ZSet(_) => "zset",
            Value::Str(_) => "string",
        }
    }
}

/// In-memory `OrderedStore` adapter.
pub struct MemoryStore {
    /// Key space (key -> value) - sharded for better concurrency
    data: DashMap<String, Value>,
    /// Absolute expiry deadlines (key -> epoch seconds)
    expiries: DashMap<String, i64>,
    /// Statistics
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            data: DashMap::new(),
            expiries: DashMap::new(),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        }
    }
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the key if its expiry deadline has passed.
    fn reap_if_expired(&self, key: &str) {
        let expired = self
            .expiries
            .get(key)
            .map(|deadline| Utc::now().timestamp() >= *deadline)
            .unwrap_or(false);

        if expired {
            self.data.remove(key);
            self.expiries.remove(key);
        }
    }

    fn wrong_type(key: &str, found: &'static str, wanted: &'static str) -> Error {
        Error::StoreUnavailable(format!(
            "wrong value kind for key {}: holds {}, operation needs {}",
            key, found, wanted
        ))
    }

    /// Sorted members of a zset, ascending by score with member as the
    /// tie-break so equal scores read back in a stable order.
    fn sorted_members(zset: &HashMap<String, f64>) -> Vec<(String, f64)> {
        let mut members: Vec<(String, f64)> =
            zset.iter().map(|(m, s)| (m.clone(), *s)).collect();
        members.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        members
    }

    /// Resolve inclusive, possibly negative rank bounds against `len`.
    /// Returns `None` when the range selects nothing.
    fn resolve_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
        if len == 0 {
            return None;
        }
        let len = len as i64;
        let start = if start < 0 { (len + start).max(0) } else { start };
        let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
        if start > stop || start >= len || stop < 0 {
            return None;
        }
        Some((start as usize, stop as usize))
    }

    /// Get adapter statistics.
    pub fn stats(&self) -> MemoryStoreStats {
        MemoryStoreStats {
            keys: self.data.len() as u64,
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl OrderedStore for MemoryStore {
    // -------------------------------------------------------------------------
    // Hash operations
    // -------------------------------------------------------------------------

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<bool> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.reap_if_expired(key);

        let mut entry = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Value::Hash(HashMap::new()));
        match entry.value_mut() {
            Value::Hash(h) => Ok(h.insert(field.to_string(), value.to_string()).is_none()),
            other => Err(Self::wrong_type(key, other.kind(), "hash")),
        }
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.reap_if_expired(key);

        match self.data.get(key) {
            Some(entry) => match entry.value() {
                Value::Hash(h) => Ok(h.get(field).cloned()),
                other => Err(Self::wrong_type(key, other.kind(), "hash")),
            },
            None => Ok(None),
        }
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.reap_if_expired(key);

        match self.data.get(key) {
            Some(entry) => match entry.value() {
                Value::Hash(h) => Ok(h.clone()),
                other => Err(Self::wrong_type(key, other.kind(), "hash")),
            },
            None => Ok(HashMap::new()),
        }
    }

    async fn hdel(&self, key: &str, fields: &[String]) -> Result<u64> {
        self.deletes.fetch_add(1, Ordering::Relaxed);
        self.reap_if_expired(key);

        let mut removed = 0;
        if let Some(mut entry) = self.data.get_mut(key) {
            match entry.value_mut() {
                Value::Hash(h) => {
                    for field in fields {
                        if h.remove(field).is_some() {
                            removed += 1;
                        }
                    }
                }
                other => return Err(Self::wrong_type(key, other.kind(), "hash")),
            }
        }
        Ok(removed)
    }

    async fn hlen(&self, key: &str) -> Result<u64> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.reap_if_expired(key);

        match self.data.get(key) {
            Some(entry) => match entry.value() {
                Value::Hash(h) => Ok(h.len() as u64),
                other => Err(Self::wrong_type(key, other.kind(), "hash")),
            },
            None => Ok(0),
        }
    }

    // -------------------------------------------------------------------------
    // Set operations
    // -------------------------------------------------------------------------

    async fn sadd(&self, key: &str, member: &str) -> Result<bool> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.reap_if_expired(key);

        let mut entry = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Value::Set(HashSet::new()));
        match entry.value_mut() {
            Value::Set(s) => Ok(s.insert(member.to_string())),
            other => Err(Self::wrong_type(key, other.kind(), "set")),
        }
    }

    async fn srem(&self, key: &str, member: &str) -> Result<bool> {
        self.deletes.fetch_add(1, Ordering::Relaxed);
        self.reap_if_expired(key);

        match self.data.get_mut(key) {
            Some(mut entry) => match entry.value_mut() {
                Value::Set(s) => Ok(s.remove(member)),
                other => Err(Self::wrong_type(key, other.kind(), "set")),
            },
            None => Ok(false),
        }
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.reap_if_expired(key);

        match self.data.get(key) {
            Some(entry) => match entry.value() {
                Value::Set(s) => Ok(s.contains(member)),
                other => Err(Self::wrong_type(key, other.kind(), "set")),
            },
            None => Ok(false),
        }
    }

    // -------------------------------------------------------------------------
    // Sorted-set operations
    // -------------------------------------------------------------------------

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<bool> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.reap_if_expired(key);

        let mut entry = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Value::ZSet(HashMap::new()));
        match entry.value_mut() {
            Value::ZSet(z) => Ok(z.insert(member.to_string(), score).is_none()),
            other => Err(Self::wrong_type(key, other.kind(), "zset")),
        }
    }

    async fn zincrby(&self, key: &str, delta: f64, member: &str) -> Result<f64> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.reap_if_expired(key);

        let mut entry = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Value::ZSet(HashMap::new()));
        match entry.value_mut() {
            Value::ZSet(z) => {
                let score = z.entry(member.to_string()).or_insert(0.0);
                *score += delta;
                Ok(*score)
            }
            other => Err(Self::wrong_type(key, other.kind(), "zset")),
        }
    }

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.reap_if_expired(key);

        match self.data.get(key) {
            Some(entry) => match entry.value() {
                Value::ZSet(z) => Ok(z.get(member).copied()),
                other => Err(Self::wrong_type(key, other.kind(), "zset")),
            },
            None => Ok(None),
        }
    }

    async fn zrank(&self, key: &str, member: &str) -> Result<Option<u64>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.reap_if_expired(key);

        match self.data.get(key) {
            Some(entry) => match entry.value() {
                Value::ZSet(z) => Ok(Self::sorted_members(z)
                    .iter()
                    .position(|(m, _)| m == member)
                    .map(|p| p as u64)),
                other => Err(Self::wrong_type(key, other.kind(), "zset")),
            },
            None => Ok(None),
        }
    }

    async fn zrem(&self, key: &str, members: &[String]) -> Result<u64> {
        self.deletes.fetch_add(1, Ordering::Relaxed);
        self.reap_if_expired(key);

        let mut removed = 0;
        if let Some(mut entry) = self.data.get_mut(key) {
            match entry.value_mut() {
                Value::ZSet(z) => {
                    for member in members {
                        if z.remove(member).is_some() {
                            removed += 1;
                        }
                    }
                }
                other => return Err(Self::wrong_type(key, other.kind(), "zset")),
            }
        }
        Ok(removed)
    }

    async fn zrange_by_rank(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        Ok(self
            .zrange_by_rank_with_scores(key, start, stop)
            .await?
            .into_iter()
            .map(|(m, _)| m)
            .collect())
    }

    async fn zrange_by_rank_with_scores(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> Result<Vec<(String, f64)>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.reap_if_expired(key);

        match self.data.get(key) {
            Some(entry) => match entry.value() {
                Value::ZSet(z) => {
                    let members = Self::sorted_members(z);
                    Ok(match Self::resolve_range(members.len(), start, stop) {
                        Some((lo, hi)) => members[lo..=hi].to_vec(),
                        None => Vec::new(),
                    })
                }
                other => Err(Self::wrong_type(key, other.kind(), "zset")),
            },
            None => Ok(Vec::new()),
        }
    }

    async fn zremrange_by_rank(&self, key: &str, start: i64, stop: i64) -> Result<u64> {
        self.deletes.fetch_add(1, Ordering::Relaxed);
        self.reap_if_expired(key);

        match self.data.get_mut(key) {
            Some(mut entry) => match entry.value_mut() {
                Value::ZSet(z) => {
                    let members = Self::sorted_members(z);
                    let Some((lo, hi)) = Self::resolve_range(members.len(), start, stop) else {
                        return Ok(0);
                    };
                    let mut removed = 0;
                    for (member, _) in &members[lo..=hi] {
                        if z.remove(member).is_some() {
                            removed += 1;
                        }
                    }
                    Ok(removed)
                }
                other => Err(Self::wrong_type(key, other.kind(), "zset")),
            },
            None => Ok(0),
        }
    }

    async fn zrange_by_score(&self, key: &str, min: f64, max: f64) -> Result<Vec<String>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.reap_if_expired(key);

        match self.data.get(key) {
            Some(entry) => match entry.value() {
                Value::ZSet(z) => Ok(Self::sorted_members(z)
                    .into_iter()
                    .filter(|(_, s)| *s >= min && *s <= max)
                    .map(|(m, _)| m)
                    .collect()),
                other => Err(Self::wrong_type(key, other.kind(), "zset")),
            },
            None => Ok(Vec::new()),
        }
    }

    async fn zcard(&self, key: &str) -> Result<u64> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.reap_if_expired(key);

        match self.data.get(key) {
            Some(entry) => match entry.value() {
                Value::ZSet(z) => Ok(z.len() as u64),
                other => Err(Self::wrong_type(key, other.kind(), "zset")),
            },
            None => Ok(0),
        }
    }

    // -------------------------------------------------------------------------
    // String operations
    // -------------------------------------------------------------------------

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.data
            .insert(key.to_string(), Value::Str(value.to_string()));
        self.expiries.remove(key);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.reap_if_expired(key);

        match self.data.get(key) {
            Some(entry) => match entry.value() {
                Value::Str(s) => Ok(Some(s.clone())),
                other => Err(Self::wrong_type(key, other.kind(), "string")),
            },
            None => Ok(None),
        }
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.data
            .insert(key.to_string(), Value::Str(value.to_string()));
        self.expiries
            .insert(key.to_string(), Utc::now().timestamp() + ttl_secs as i64);
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<u64> {
        self.deletes.fetch_add(1, Ordering::Relaxed);

        let mut removed = 0;
        for key in keys {
            if self.data.remove(key).is_some() {
                removed += 1;
            }
            self.expiries.remove(key);
        }
        Ok(removed)
    }

    // -------------------------------------------------------------------------
    // Expiry
    // -------------------------------------------------------------------------

    async fn expire_at(&self, key: &str, epoch_secs: i64) -> Result<bool> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.reap_if_expired(key);

        if self.data.contains_key(key) {
            self.expiries.insert(key.to_string(), epoch_secs);
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

/// Adapter statistics
#[derive(Debug, Clone, Default)]
pub struct MemoryStoreStats {
    /// Live keys
    pub keys: u64,
    /// Read operations
    pub reads: u64,
    /// Write operations
    pub writes: u64,
    /// Delete operations
    pub deletes: u64,
}

// =============================================================================
// Tests
// =============================================================================
