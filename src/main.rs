//! ShopCache demo host
//!
//! Wires the engine over the in-memory store adapter, spawns both
//! background workers, drives a short burst of storefront-style traffic
//! through the foreground surface, and shuts the workers down cleanly.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        ShopCache Engine                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │   Session    │    │  Row Cache   │    │    Page      │       │
//! │  │ Index+Reaper │    │  Scheduler   │    │    Cache     │       │
//! │  └──────────────┘    └──────────────┘    └──────────────┘       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use shopcache::{
    CartStore, InMemoryRowSource, MemoryStore, OrderedStore, PageCache, PopularityIndex,
    ReaperConfig, RenderFn, RowCacheScheduler, SessionIndex, SessionReaper,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// ShopCache - session index and cache-refresh engine demo
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Sessions allowed before the reaper starts evicting
    #[arg(long, env = "SESSION_CAPACITY", default_value = "100")]
    session_capacity: u64,

    /// Also clear carts when evicting sessions
    #[arg(long, env = "FULL_CLEANUP")]
    full_cleanup: bool,

    /// Popularity rank an item must beat to be page-cacheable
    #[arg(long, env = "ADMISSION_THRESHOLD", default_value = "10000")]
    admission_threshold: u64,

    /// Row refresh cadence used by the demo schedule, in seconds
    #[arg(long, env = "ROW_DELAY_SECONDS", default_value = "5")]
    row_delay_seconds: i64,

    /// How long to let the workers run before shutting down, in seconds
    #[arg(long, env = "RUN_SECONDS", default_value = "8")]
    run_seconds: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args);

    info!("Starting ShopCache demo");
    info!("  Session capacity: {}", args.session_capacity);
    info!("  Full cleanup: {}", args.full_cleanup);
    info!("  Admission threshold: {}", args.admission_threshold);
    info!("  Row delay: {}s", args.row_delay_seconds);

    // Wire the engine over the in-memory adapter.
    let store: Arc<dyn OrderedStore> = Arc::new(MemoryStore::new());
    let popularity = Arc::new(PopularityIndex::new(store.clone()));
    let sessions = Arc::new(SessionIndex::new(store.clone(), popularity.clone()));
    let carts = Arc::new(CartStore::new(store.clone()));
    let page_cache = PageCache::with_config(
        store.clone(),
        popularity.clone(),
        shopcache::PageCacheConfig {
            admission_threshold: args.admission_threshold,
            ..Default::default()
        },
    );

    let reaper = SessionReaper::new(
        sessions.clone(),
        carts.clone(),
        ReaperConfig {
            capacity_limit: args.session_capacity,
            full_cleanup: args.full_cleanup,
            ..Default::default()
        },
    );

    let row_source = Arc::new(InMemoryRowSource::new());
    row_source.insert("itemX", "inventory for itemX");
    let scheduler = RowCacheScheduler::new(store.clone(), row_source);

    // Spawn background workers; handles are joined on shutdown.
    let reaper_handle = tokio::spawn(reaper.clone().run());
    let scheduler_handle = tokio::spawn(scheduler.clone().run());

    // Foreground traffic: sessions, carts, a scheduled row, page fetches.
    for i in 0..150 {
        let token = SessionIndex::generate_token();
        sessions
            .touch(&token, &format!("user-{}", i), Some("itemX"))
            .await?;
        if i % 10 == 0 {
            carts.set_quantity(&token, "itemY", 3).await?;
        }
    }
    info!(
        sessions = sessions.count().await?,
        "Touched demo sessions"
    );

    scheduler.schedule("itemX", args.row_delay_seconds).await?;

    let render: Box<RenderFn> = Box::new(|request: &str| format!("content for {}", request));
    let url = "http://demo/?item=itemX";
    page_cache.fetch(url, Some(render.as_ref())).await?;
    page_cache.fetch(url, None).await?;

    // Let the workers reconcile for a while.
    tokio::time::sleep(Duration::from_secs(args.run_seconds)).await;

    info!(
        sessions = sessions.count().await?,
        cached_row = scheduler.cached_row("itemX").await?.is_some(),
        "Engine state after reconciliation"
    );

    // Cooperative shutdown: signal both workers, then wait for exit.
    reaper.stop();
    scheduler.stop();
    reaper_handle.await?;
    scheduler_handle.await?;

    let reaper_stats = reaper.stats();
    let scheduler_stats = scheduler.stats();
    let page_stats = page_cache.stats();
    info!(
        reaper_cycles = reaper_stats.cycles,
        sessions_evicted = reaper_stats.evicted,
        rows_refreshed = scheduler_stats.refreshed,
        page_hits = page_stats.hits,
        page_misses = page_stats.misses,
        "Shutdown complete"
    );

    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
