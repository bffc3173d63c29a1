//! Venue-agnostic traits for the rebalancer's external collaborators.
//!
//! Everything the control loop and statistics tracker need from the outside
//! world comes through these narrow interfaces:
//! - Position snapshots
//! - The count of currently open arbitrage pairs
//! - Per-venue order submission
//! - The spread observation feed

use crate::stats::Sample;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;

use super::types::{BuySizing, OrderReceipt, OrderSize, VenueError};

/// Supplies a complete snapshot of base asset positions across venues.
///
/// Missing entries are treated as "position unknown" by the control loop;
/// that venue is skipped with a warning for the iteration.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PositionProvider: Send + Sync {
    /// Map of venue identifier to observed base asset position.
    async fn positions(&self) -> anyhow::Result<HashMap<String, Decimal>>;
}

/// Reports how many arbitrage pairs are currently open.
///
/// While pairs are active, positions are expected to move on their own and
/// rebalancing stands down.
#[async_trait]
pub trait ActivePairStore: Send + Sync {
    async fn active_pair_count(&self) -> anyhow::Result<usize>;
}

/// Order submission interface for a single venue.
///
/// Implementations wrap the venue's API client. Each call either succeeds or
/// fails with a [`VenueError`]; none may silently no-op.
#[async_trait]
pub trait VenueOrderAdapter: Send + Sync {
    /// Venue identifier, matching the `venue` field in configuration.
    fn venue(&self) -> &str;

    /// How market buys are sized on this venue.
    fn buy_sizing(&self) -> BuySizing;

    /// Freely tradable base asset amount (excludes amounts locked in orders).
    async fn free_base_amount(&self) -> Result<Decimal, VenueError>;

    /// Current base/quote conversion rate, used to size notional buys.
    async fn quote_rate(&self) -> Result<Decimal, VenueError>;

    /// Sell `amount` of the base asset at market.
    async fn market_sell(&self, amount: Decimal) -> Result<OrderReceipt, VenueError>;

    /// Buy at market, sized per [`VenueOrderAdapter::buy_sizing`].
    async fn market_buy(&self, size: OrderSize) -> Result<OrderReceipt, VenueError>;

    /// Close all open exposure on this venue.
    async fn close_all(&self) -> Result<(), VenueError>;
}

/// Delivers spread observations, one every few seconds.
#[async_trait]
pub trait SpreadStatFeed: Send + Sync {
    async fn next_sample(&self) -> anyhow::Result<Sample>;
}
