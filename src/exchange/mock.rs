//! In-memory collaborators for paper trading and tests.
//!
//! [`MockVenue`] simulates a venue order adapter with recorded orders,
//! adjustable balances, and failure injection. The companion mocks cover the
//! position snapshot, active pair count, and spread feed interfaces so the
//! whole agent can run without touching a real exchange.

use super::traits::{ActivePairStore, PositionProvider, SpreadStatFeed, VenueOrderAdapter};
use super::types::{BuySizing, OrderReceipt, OrderSide, OrderSize, VenueError};
use crate::stats::Sample;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// An order captured by [`MockVenue`].
#[derive(Debug, Clone)]
pub enum RecordedOrder {
    MarketSell { amount: Decimal },
    MarketBuy { size: OrderSize },
    CloseAll,
}

/// Simulated venue adapter.
pub struct MockVenue {
    venue: String,
    buy_sizing: BuySizing,
    free_base_amount: RwLock<Decimal>,
    quote_rate: RwLock<Decimal>,
    orders: RwLock<Vec<RecordedOrder>>,
    order_id_counter: AtomicU64,
    fail_orders: AtomicBool,
}

impl MockVenue {
    pub fn new(venue: &str, buy_sizing: BuySizing) -> Arc<Self> {
        Arc::new(Self {
            venue: venue.to_string(),
            buy_sizing,
            free_base_amount: RwLock::new(Decimal::ZERO),
            quote_rate: RwLock::new(dec!(1)),
            orders: RwLock::new(Vec::new()),
            order_id_counter: AtomicU64::new(1),
            fail_orders: AtomicBool::new(false),
        })
    }

    /// Set the freely tradable base asset amount.
    pub async fn set_free_base_amount(&self, amount: Decimal) {
        *self.free_base_amount.write().await = amount;
    }

    /// Set the base/quote conversion rate.
    pub async fn set_quote_rate(&self, rate: Decimal) {
        *self.quote_rate.write().await = rate;
    }

    /// Make every subsequent order call fail.
    pub fn fail_orders(&self, fail: bool) {
        self.fail_orders.store(fail, Ordering::SeqCst);
    }

    /// Orders recorded so far.
    pub async fn recorded_orders(&self) -> Vec<RecordedOrder> {
        self.orders.read().await.clone()
    }

    fn next_order_id(&self) -> u64 {
        self.order_id_counter.fetch_add(1, Ordering::SeqCst)
    }

    fn check_failure(&self) -> Result<(), VenueError> {
        if self.fail_orders.load(Ordering::SeqCst) {
            return Err(VenueError::OrderRejected {
                venue: self.venue.clone(),
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl VenueOrderAdapter for MockVenue {
    fn venue(&self) -> &str {
        &self.venue
    }

    fn buy_sizing(&self) -> BuySizing {
        self.buy_sizing
    }

    async fn free_base_amount(&self) -> Result<Decimal, VenueError> {
        Ok(*self.free_base_amount.read().await)
    }

    async fn quote_rate(&self) -> Result<Decimal, VenueError> {
        Ok(*self.quote_rate.read().await)
    }

    async fn market_sell(&self, amount: Decimal) -> Result<OrderReceipt, VenueError> {
        self.check_failure()?;
        self.orders
            .write()
            .await
            .push(RecordedOrder::MarketSell { amount });
        debug!(venue = %self.venue, %amount, "Mock market sell");
        Ok(OrderReceipt {
            venue: self.venue.clone(),
            order_id: self.next_order_id(),
            side: OrderSide::Sell,
            size: OrderSize::Base(amount),
        })
    }

    async fn market_buy(&self, size: OrderSize) -> Result<OrderReceipt, VenueError> {
        self.check_failure()?;
        self.orders
            .write()
            .await
            .push(RecordedOrder::MarketBuy { size });
        debug!(venue = %self.venue, ?size, "Mock market buy");
        Ok(OrderReceipt {
            venue: self.venue.clone(),
            order_id: self.next_order_id(),
            side: OrderSide::Buy,
            size,
        })
    }

    async fn close_all(&self) -> Result<(), VenueError> {
        self.check_failure()?;
        self.orders.write().await.push(RecordedOrder::CloseAll);
        debug!(venue = %self.venue, "Mock close all");
        Ok(())
    }
}

/// Simulated position snapshot provider.
#[derive(Default)]
pub struct MockPositionBook {
    positions: RwLock<HashMap<String, Decimal>>,
}

impl MockPositionBook {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn set_position(&self, venue: &str, amount: Decimal) {
        self.positions
            .write()
            .await
            .insert(venue.to_string(), amount);
    }

    pub async fn remove_position(&self, venue: &str) {
        self.positions.write().await.remove(venue);
    }
}

#[async_trait]
impl PositionProvider for MockPositionBook {
    async fn positions(&self) -> anyhow::Result<HashMap<String, Decimal>> {
        Ok(self.positions.read().await.clone())
    }
}

/// Simulated active pair count.
#[derive(Default)]
pub struct MockActivePairStore {
    count: AtomicUsize,
}

impl MockActivePairStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_count(&self, count: usize) {
        self.count.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl ActivePairStore for MockActivePairStore {
    async fn active_pair_count(&self) -> anyhow::Result<usize> {
        Ok(self.count.load(Ordering::SeqCst))
    }
}

/// Deterministic spread feed for paper trading.
///
/// Emits a profit percentage that ramps between the configured bounds, so
/// the tracker sees a moving but repeatable signal.
pub struct MockSpreadFeed {
    tick: AtomicU64,
    base: f64,
    amplitude: f64,
}

impl MockSpreadFeed {
    pub fn new(base: f64, amplitude: f64) -> Arc<Self> {
        Arc::new(Self {
            tick: AtomicU64::new(0),
            base,
            amplitude,
        })
    }
}

#[async_trait]
impl SpreadStatFeed for MockSpreadFeed {
    async fn next_sample(&self) -> anyhow::Result<Sample> {
        let tick = self.tick.fetch_add(1, Ordering::SeqCst);
        // Triangle wave with period 20 ticks
        let phase = (tick % 20) as f64 / 20.0;
        let wave = if phase < 0.5 {
            phase * 2.0
        } else {
            2.0 - phase * 2.0
        };
        Ok(Sample {
            timestamp: Utc::now(),
            profit_percent: self.base + self.amplitude * (wave - 0.5),
        })
    }
}
