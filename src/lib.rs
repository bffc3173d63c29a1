//! # Venue Rebalancer
//!
//! An automated position-rebalancing agent for a multi-venue trading
//! operation. Each venue's held inventory is periodically compared against a
//! configured target band and corrected with market orders, while an online
//! statistics tracker derives an adaptive profitability threshold from a
//! sliding window of recent spread observations.
//!
//! ## Architecture
//!
//! - `config`: Configuration management, venue definitions, and the runtime config store
//! - `exchange`: Venue adapter traits and in-memory mocks for paper trading
//! - `rebalance`: The rebalancing control loop and per-venue decision logic
//! - `stats`: Online spread statistics and adaptive threshold derivation
//! - `persistence`: SQLite-based sample history for tracker backfill

pub mod config;
pub mod exchange;
pub mod persistence;
pub mod rebalance;
pub mod stats;

pub use config::Config;
