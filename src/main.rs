//! Venue Rebalancer - Main Entry Point
//!
//! Paper trading MVP: venue adapters, position snapshots, and the spread
//! feed are in-memory mocks. Real exchange clients plug in through the same
//! traits without touching the control loop.

use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use clap::{Parser, Subcommand};
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;
use venue_rebalancer::config::{Config, ConfigStore, MarginMode, VenueConfig};
use venue_rebalancer::exchange::{
    BuySizing, MockActivePairStore, MockPositionBook, MockSpreadFeed, MockVenue, SpreadStatFeed,
    VenueOrderAdapter,
};
use venue_rebalancer::persistence::SampleStore;
use venue_rebalancer::rebalance::PositionAdjuster;
use venue_rebalancer::stats::SpreadStatTracker;

/// Venue Rebalancer CLI
#[derive(Parser)]
#[command(name = "venue-rebalancer")]
#[command(version, about = "Automated inventory rebalancing across trading venues")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show persisted spread sample history and its statistics
    History {
        /// Path to SQLite database
        #[arg(short, long, default_value = "data/spread_stats.db")]
        db: String,

        /// Number of samples to display
        #[arg(short, long, default_value = "20")]
        limit: u32,

        /// Emit samples as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging()?;

    if let Some(Commands::History { db, limit, json }) = cli.command {
        return show_history(&db, limit, json);
    }

    info!("╔════════════════════════════════════════════════════════════╗");
    info!(
        "║        Venue Rebalancer v{} - Paper Trading             ║",
        env!("CARGO_PKG_VERSION")
    );
    info!("╚════════════════════════════════════════════════════════════╝");

    let mut config = Config::load()?;
    config.validate()?;

    if config.venues.is_empty() {
        info!("📝 No venues configured. Using paper trading defaults.");
        config.venues = paper_venues();
    }

    info!(
        venues = config.venues.len(),
        tick_interval_secs = config.rebalancer.tick_interval_secs,
        window_secs = config.stats.window_secs,
        min_target_profit_percent = config.min_target_profit_percent,
        "Configuration loaded"
    );

    let window = ChronoDuration::seconds(config.stats.window_secs as i64);
    let min_threshold = config.stats.min_threshold;
    let feed_interval = Duration::from_secs(config.stats.feed_interval_secs);
    let tick_interval = Duration::from_secs(config.rebalancer.tick_interval_secs);

    // Sample persistence and tracker backfill
    let store = SampleStore::open(&config.stats.db_path)?;
    let backfill = store.load_recent(window)?;
    info!(
        samples = backfill.len(),
        "📂 Restored spread sample backfill"
    );
    let mut tracker = SpreadStatTracker::new(backfill, window, min_threshold);

    // Paper trading collaborators: positions start in the dead zone so the
    // loop idles until something external moves them
    let positions = MockPositionBook::new();
    let mut adapters: Vec<Arc<dyn VenueOrderAdapter>> = Vec::new();
    for venue_config in &config.venues {
        let venue = MockVenue::new(&venue_config.venue, BuySizing::BaseAmount);
        let observed = match venue_config.margin_mode {
            MarginMode::Cash => venue_config.target_max_long_position * dec!(0.55),
            MarginMode::NetOut => dec!(0.002),
        };
        venue.set_free_base_amount(observed).await;
        positions.set_position(&venue_config.venue, observed).await;
        adapters.push(venue);
    }
    let active_pairs = MockActivePairStore::new();
    let feed = MockSpreadFeed::new(0.4, 0.5);

    let rebalancer_config = config.rebalancer.clone();
    let config_store = ConfigStore::new(config);
    let adjuster = Arc::new(PositionAdjuster::new(
        config_store.clone(),
        rebalancer_config,
        positions,
        active_pairs,
        adapters,
    ));

    // Shutdown signal
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("🛑 Shutdown signal received");
        shutdown_clone.store(true, Ordering::SeqCst);
    });

    // Statistics feed loop: observe, persist, merge threshold updates
    let stats_shutdown = shutdown.clone();
    let stats_config_store = config_store.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(feed_interval);
        let mut observations: u64 = 0;

        while !stats_shutdown.load(Ordering::SeqCst) {
            interval.tick().await;

            let sample = match feed.next_sample().await {
                Ok(sample) => sample,
                Err(e) => {
                    warn!(error = %e, "Spread feed unavailable");
                    continue;
                }
            };

            if let Err(e) = store.record_sample(&sample) {
                warn!(error = %e, "Failed to persist sample");
            }

            observations += 1;
            if observations % 100 == 0 {
                if let Err(e) = store.prune_older_than(Utc::now() - window * 10) {
                    warn!(error = %e, "Failed to prune sample history");
                }
            }

            if let Some(patch) = tracker.observe(sample) {
                stats_config_store.merge(patch).await;
            }
        }
    });

    info!("🚀 Starting rebalancing loop...");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let mut interval = tokio::time::interval(tick_interval);
    let mut ticks_fired: u64 = 0;
    let mut last_status_log = Utc::now();

    while !shutdown.load(Ordering::SeqCst) {
        interval.tick().await;

        // Each tick runs as its own task; the adjuster's guard handles
        // overlap with a slow prior iteration
        let adjuster_tick = Arc::clone(&adjuster);
        tokio::spawn(async move { adjuster_tick.tick().await });
        ticks_fired += 1;

        if (Utc::now() - last_status_log).num_minutes() >= 5 {
            let state = adjuster.state();
            info!(
                ticks_fired,
                is_running = state.is_running,
                retry_count = state.retry_count,
                skip_count = state.skip_count,
                "📊 Rebalancer status"
            );
            last_status_log = Utc::now();
        }
    }

    info!("Venue rebalancer stopped");
    Ok(())
}

/// Default venue set for paper trading runs without a config file.
fn paper_venues() -> Vec<VenueConfig> {
    let cash = |name: &str| VenueConfig {
        venue: name.to_string(),
        enabled: true,
        margin_mode: MarginMode::Cash,
        target_max_long_position: dec!(0.1),
        blackout_periods: Vec::new(),
        api_key: String::new(),
        api_secret: String::new(),
    };

    let mut venues = vec![cash("bitbank"), cash("coincheck")];
    venues.push(VenueConfig {
        venue: "quoine".to_string(),
        enabled: true,
        margin_mode: MarginMode::NetOut,
        target_max_long_position: dec!(0.1),
        blackout_periods: Vec::new(),
        api_key: String::new(),
        api_secret: String::new(),
    });
    venues
}

/// Print persisted sample history with aggregate statistics.
fn show_history(db: &str, limit: u32, json: bool) -> Result<()> {
    let store = SampleStore::open(db)?;
    let total = store.sample_count()?;
    let samples = store.load_last(limit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&samples)?);
        return Ok(());
    }

    println!("Stored samples: {total}");
    for sample in &samples {
        println!(
            "  {}  {:>8.4}%",
            sample.timestamp.to_rfc3339(),
            sample.profit_percent
        );
    }

    if samples.len() > 1 {
        let n = samples.len() as f64;
        let mean = samples.iter().map(|s| s.profit_percent).sum::<f64>() / n;
        let variance = samples
            .iter()
            .map(|s| (s.profit_percent - mean).powi(2))
            .sum::<f64>()
            / n;
        let std_dev = (variance * n / (n - 1.0)).sqrt();
        println!("mean: {mean:.4}%  stddev: {std_dev:.4}%  (over last {} samples)", samples.len());
    }

    Ok(())
}

fn init_logging() -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    // Create logs directory
    std::fs::create_dir_all("logs")?;

    // File appender for detailed logs
    let file_appender = tracing_appender::rolling::hourly("logs", "venue-rebalancer.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);

    // Leak the guard to keep it alive for the program duration
    Box::leak(Box::new(_guard));

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("venue_rebalancer=debug".parse()?)
                .add_directive(Level::INFO.into()),
        )
        .with_writer(std::io::stdout.and(file_writer))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .init();

    Ok(())
}
