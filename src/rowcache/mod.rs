//! Row Cache Scheduler
//!
//! Delay-driven republishing of upstream row snapshots. Hosts declare how
//! often each row should be refreshed; a background loop pops rows as they
//! come due, pulls a fresh snapshot from the upstream source, publishes it
//! into the store, and reschedules the row. A non-positive delay is the
//! uncache signal: the row's cached snapshot and both schedule entries are
//! removed.
//!
//! # Architecture
//!
//! ```text
//! schedule(row, delay) ──▶ delay table ──┐
//!                     └──▶ due-time queue │
//!                                         ▼
//!                              ┌─────────────────────┐
//!                              │  scheduler loop     │──▶ RowSource
//!                              │ (pop due, refresh,  │◀── snapshot
//!                              │  reschedule/uncache)│──▶ cached rows
//!                              └─────────────────────┘
//! ```

mod scheduler;
mod source;

pub use scheduler::{RowCacheScheduler, SchedulerConfig, SchedulerStats};
pub use source::{InMemoryRowSource, RowSnapshot, RowSource};
