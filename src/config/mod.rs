//! Configuration management for the venue rebalancer.
//!
//! Loads settings from environment variables and config files, and exposes a
//! runtime [`ConfigStore`] that accepts partial-update merges produced by the
//! statistics tracker.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Minimum required profitability percentage for entering spread trades.
    /// Continuously rewritten by the statistics tracker while running.
    #[serde(default = "default_min_target_profit_percent")]
    pub min_target_profit_percent: f64,
    /// Control loop timing and guard parameters
    #[serde(default)]
    pub rebalancer: RebalancerConfig,
    /// Statistics tracker parameters
    #[serde(default)]
    pub stats: StatsConfig,
    /// Per-venue configurations
    #[serde(default)]
    pub venues: Vec<VenueConfig>,
}

/// How a venue holds exposure, which dictates how it is rebalanced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarginMode {
    /// Spot trading: rebalance with outright buys/sells around half the target
    Cash,
    /// Margin/derivative trading: rebalance by fully closing open exposure
    NetOut,
}

/// A configured window during which a venue must not be rebalanced.
///
/// Boundaries are RFC 3339 timestamps kept as raw strings; they are parsed at
/// evaluation time so an operator typo degrades to a logged warning instead
/// of blocking config load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlackoutPeriod {
    pub start: String,
    pub end: String,
}

/// Configuration for a single trading venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueConfig {
    /// Venue identifier (e.g., "bitbank", "coincheck", "quoine")
    pub venue: String,
    /// Whether this venue participates in rebalancing
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Cash (spot) or NetOut (margin) rebalancing behavior
    pub margin_mode: MarginMode,
    /// Maximum long position in base asset units; the loop steers holdings
    /// toward half of this value
    pub target_max_long_position: Decimal,
    /// Windows during which this venue is never rebalanced
    #[serde(default)]
    pub blackout_periods: Vec<BlackoutPeriod>,
    /// API credentials, passed through to the venue adapter
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
}

/// Control loop timing and guard parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalancerConfig {
    /// Seconds between tick firings
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    /// Wait after confirming no active pairs, before reading positions
    #[serde(default = "default_settle_delay_secs")]
    pub settle_delay_secs: u64,
    /// Wait at the end of every iteration before releasing the guard
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    /// Ticks consumed as no-ops between real rebalancing passes
    #[serde(default = "default_startup_skip_ticks")]
    pub startup_skip_ticks: u32,
    /// Overlapping ticks tolerated before force-clearing the running guard
    #[serde(default = "default_stuck_retry_limit")]
    pub stuck_retry_limit: u32,
}

/// Statistics tracker parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsConfig {
    /// Trailing window over which spread samples are kept, in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// Seconds between spread feed observations
    #[serde(default = "default_feed_interval_secs")]
    pub feed_interval_secs: u64,
    /// Floor for the adaptive threshold, in percent
    #[serde(default = "default_min_threshold")]
    pub min_threshold: f64,
    /// SQLite database holding sample history for backfill
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

// Default value functions
fn default_min_target_profit_percent() -> f64 {
    0.25
}

fn default_enabled() -> bool {
    true
}

fn default_tick_interval_secs() -> u64 {
    3
}

fn default_settle_delay_secs() -> u64 {
    5
}

fn default_cooldown_secs() -> u64 {
    5
}

fn default_startup_skip_ticks() -> u32 {
    30
}

fn default_stuck_retry_limit() -> u32 {
    30
}

fn default_window_secs() -> u64 {
    180 // 3 minutes
}

fn default_feed_interval_secs() -> u64 {
    3
}

fn default_min_threshold() -> f64 {
    0.25
}

fn default_db_path() -> String {
    "data/spread_stats.db".to_string()
}

impl Config {
    /// Load configuration from environment variables and config files.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::default().separator("__").prefix("VR"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.min_target_profit_percent >= 0.0,
            "min_target_profit_percent must be non-negative"
        );

        anyhow::ensure!(
            self.stats.window_secs > 0,
            "stats.window_secs must be positive"
        );

        for venue in &self.venues {
            anyhow::ensure!(
                venue.target_max_long_position >= Decimal::ZERO,
                "target_max_long_position for {} must be non-negative",
                venue.venue
            );
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_target_profit_percent: default_min_target_profit_percent(),
            rebalancer: RebalancerConfig::default(),
            stats: StatsConfig::default(),
            venues: Vec::new(),
        }
    }
}

impl Default for RebalancerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            settle_delay_secs: default_settle_delay_secs(),
            cooldown_secs: default_cooldown_secs(),
            startup_skip_ticks: default_startup_skip_ticks(),
            stuck_retry_limit: default_stuck_retry_limit(),
        }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            feed_interval_secs: default_feed_interval_secs(),
            min_threshold: default_min_threshold(),
            db_path: default_db_path(),
        }
    }
}

/// A partial configuration update produced by the statistics tracker.
///
/// Only the keys present are merged; everything else in the configuration is
/// left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConfigPatch {
    pub min_target_profit_percent: f64,
}

/// Shared runtime configuration.
///
/// The control loop takes read snapshots; the statistics tracker merges
/// partial updates. Nothing else mutates the configuration after load.
#[derive(Clone)]
pub struct ConfigStore {
    inner: Arc<RwLock<Config>>,
}

impl ConfigStore {
    pub fn new(config: Config) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Read a point-in-time copy of the configuration.
    pub async fn snapshot(&self) -> Config {
        self.inner.read().await.clone()
    }

    /// Merge a partial update into the configuration.
    pub async fn merge(&self, patch: ConfigPatch) {
        let mut config = self.inner.write().await;
        config.min_target_profit_percent = patch.min_target_profit_percent;
        info!(
            min_target_profit_percent = patch.min_target_profit_percent,
            "Configuration updated"
        );
    }
}
