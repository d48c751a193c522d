//! Upstream Row Source Port
//!
//! Abstracts wherever row data actually lives (a database, a service).
//! The scheduler is the only consumer; it calls `fetch_row` synchronously
//! from its own loop and treats failures as transient.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A point-in-time snapshot of one upstream row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowSnapshot {
    /// Row identifier
    pub row_id: String,
    /// Row payload
    pub data: String,
    /// When the snapshot was taken (epoch milliseconds)
    pub fetched_at: i64,
}

/// Port for fetching fresh row snapshots from the upstream data source.
#[async_trait]
pub trait RowSource: Send + Sync {
    /// Fetch a fresh snapshot of a row. Every call observes the current
    /// upstream state; the scheduler relies on repeated fetches producing
    /// up-to-date snapshots.
    async fn fetch_row(&self, row_id: &str) -> Result<RowSnapshot>;
}

/// In-memory row source for tests, demos, and embedded hosts.
///
/// Rows can be seeded with payloads; unseeded rows synthesize one. Each
/// fetch stamps the snapshot with the current time, so consecutive
/// snapshots of an unchanged row still differ.
pub struct InMemoryRowSource {
    rows: RwLock<HashMap<String, String>>,
    fetches: AtomicU64,
}

impl Default for InMemoryRowSource {
    fn default() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            fetches: AtomicU64::new(0),
        }
    }
}

impl InMemoryRowSource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed or replace a row payload.
    pub fn insert(&self, row_id: &str, data: &str) {
        self.rows
            .write()
            .insert(row_id.to_string(), data.to_string());
    }

    /// Total fetches served.
    pub fn fetches(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl RowSource for InMemoryRowSource {
    async fn fetch_row(&self, row_id: &str) -> Result<RowSnapshot> {
        self.fetches.fetch_add(1, Ordering::Relaxed);

        let data = self
            .rows
            .read()
            .get(row_id)
            .cloned()
            .unwrap_or_else(|| format!("row data for {}", row_id));

        Ok(RowSnapshot {
            row_id: row_id.to_string(),
            data,
            fetched_at: Utc::now().timestamp_millis(),
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
