//! ShopCache - Bounded Session Index and Scheduled Cache-Refresh Engine
//!
//! A library-level engine that maintains derived, time-bounded, and
//! popularity-gated caches on top of a primary ordered key-value store.
//! Foreground calls stay cheap and synchronous; two independent background
//! workers continuously reconcile cache state against policy and terminate
//! cleanly on a cooperative stop signal.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                           foreground                              │
//! │   SessionIndex ── CartStore ── PopularityIndex ── PageCache       │
//! └──────────────────────────────────────────────────────────────────┘
//!            │                                            │
//!            ▼                                            ▼
//! ┌──────────────────┐                        ┌──────────────────────┐
//! │  SessionReaper   │        shared          │  RowCacheScheduler   │
//! │ (capacity bound) │──▶  OrderedStore  ◀────│ (due-time refresh)   │
//! └──────────────────┘                        └──────────────────────┘
//! ```
//!
//! The store is the only shared mutable resource. Its single-key operations
//! are atomic; cross-entity consistency comes from write ordering rather
//! than locking, and a session re-touched concurrently with its own
//! eviction simply self-heals on the next touch.
//!
//! # Modules
//!
//! - [`error`] - Error types
//! - [`pagecache`] - Popularity-gated cache of rendered request results
//! - [`popularity`] - Global item view ranking
//! - [`rowcache`] - Delay-driven row snapshot scheduler
//! - [`session`] - Session index, cart store, and session reaper
//! - [`store`] - Ordered key-value store port and in-memory adapter

pub mod error;
pub mod pagecache;
pub mod popularity;
pub mod rowcache;
pub mod session;
pub mod store;

// Re-export commonly used types
pub use error::{Error, Result};
pub use pagecache::{PageCache, PageCacheConfig, PageCacheStats, RenderFn};
pub use popularity::PopularityIndex;
pub use rowcache::{
    InMemoryRowSource, RowCacheScheduler, RowSnapshot, RowSource, SchedulerConfig, SchedulerStats,
};
pub use session::{CartStore, ReaperConfig, ReaperStats, SessionConfig, SessionIndex, SessionReaper};
pub use store::{MemoryStore, MemoryStoreStats, OrderedStore};
