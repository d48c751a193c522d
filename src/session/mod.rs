//! Session Index, Cart Store, and Session Reaper
//!
//! Recency-ordered session tracking with bounded per-session view history,
//! per-session shopping carts, and a background reaper that trims the
//! session population to a configured capacity, cascading deletes into the
//! dependent per-session state.
//!
//! # Architecture
//!
//! ```text
//! foreground                         background
//! ┌──────────────┐                   ┌───────────────────┐
//! │ SessionIndex │ touch/lookup      │   SessionReaper   │
//! │  CartStore   │ ────────────┐     │ (capacity bound)  │
//! └──────────────┘             ▼     └───────────────────┘
//!                        ┌──────────────┐      │ evict oldest
//!                        │ OrderedStore │ ◀────┘ (batched)
//!                        └──────────────┘
//! ```

mod cart;
mod index;
mod reaper;

pub use cart::CartStore;
pub use index::{SessionConfig, SessionIndex};
pub use reaper::{ReaperConfig, ReaperStats, SessionReaper};
