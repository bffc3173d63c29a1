//! The rebalancing control loop.
//!
//! `tick()` is fired on a fixed cadence by the driver in `main`. Each tick
//! passes a reentrancy guard and a startup damping counter before evaluating
//! venues; corrective orders are dispatched on independent tasks and are not
//! awaited by the iteration (their failures surface asynchronously in the
//! log). The iteration always ends with a cooldown and a guard release, even
//! when venue evaluation fails.

use crate::config::{ConfigStore, RebalancerConfig};
use crate::exchange::{
    ActivePairStore, BuySizing, OrderSize, PositionProvider, VenueError, VenueOrderAdapter,
};
use anyhow::Result;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::blackout::outside_blackouts;
use super::decision::{buy_amount, evaluate_position, sell_amount, CorrectiveIntent};

/// Guard state for the control loop, mutated only by `tick()`.
#[derive(Debug, Default)]
struct LoopState {
    is_running: AtomicBool,
    retry_count: AtomicU32,
    skip_count: AtomicU32,
}

/// Point-in-time copy of the loop guard state, for status logging and tests.
#[derive(Debug, Clone, Copy)]
pub struct LoopStateSnapshot {
    pub is_running: bool,
    pub retry_count: u32,
    pub skip_count: u32,
}

/// Periodically steers every venue's inventory back into its target band.
pub struct PositionAdjuster {
    config_store: ConfigStore,
    timing: RebalancerConfig,
    positions: Arc<dyn PositionProvider>,
    active_pairs: Arc<dyn ActivePairStore>,
    venues: HashMap<String, Arc<dyn VenueOrderAdapter>>,
    state: LoopState,
}

impl PositionAdjuster {
    pub fn new(
        config_store: ConfigStore,
        timing: RebalancerConfig,
        positions: Arc<dyn PositionProvider>,
        active_pairs: Arc<dyn ActivePairStore>,
        adapters: Vec<Arc<dyn VenueOrderAdapter>>,
    ) -> Self {
        let venues = adapters
            .into_iter()
            .map(|a| (a.venue().to_string(), a))
            .collect();

        Self {
            config_store,
            timing,
            positions,
            active_pairs,
            venues,
            state: LoopState::default(),
        }
    }

    /// One control loop iteration.
    pub async fn tick(&self) {
        // Reentrancy guard: a previous iteration has not logically finished
        if self.state.is_running.load(Ordering::SeqCst) {
            debug!("Position adjuster is already running. Skipped iteration.");
            let retries = self.state.retry_count.fetch_add(1, Ordering::SeqCst) + 1;
            if retries > self.timing.stuck_retry_limit {
                error!(
                    retries,
                    "Stuck iteration detected, force-clearing the running guard"
                );
                self.state.is_running.store(false, Ordering::SeqCst);
            }
            return;
        }

        // Startup damping: one real pass per `startup_skip_ticks + 1` firings
        let skips = self.state.skip_count.load(Ordering::SeqCst);
        if skips < self.timing.startup_skip_ticks {
            self.state.skip_count.store(skips + 1, Ordering::SeqCst);
            return;
        }
        self.state.skip_count.store(0, Ordering::SeqCst);

        self.state.is_running.store(true, Ordering::SeqCst);
        self.state.retry_count.store(0, Ordering::SeqCst);

        if let Err(e) = self.run_iteration().await {
            error!(error = %e, "Rebalancing iteration failed");
            debug!(error = ?e, "Iteration failure detail");
        }

        // Always-run cleanup: cooldown, then release the guard
        tokio::time::sleep(Duration::from_secs(self.timing.cooldown_secs)).await;
        self.state.is_running.store(false, Ordering::SeqCst);
        info!("Finished position adjustment");
    }

    /// Current guard state.
    pub fn state(&self) -> LoopStateSnapshot {
        LoopStateSnapshot {
            is_running: self.state.is_running.load(Ordering::SeqCst),
            retry_count: self.state.retry_count.load(Ordering::SeqCst),
            skip_count: self.state.skip_count.load(Ordering::SeqCst),
        }
    }

    async fn run_iteration(&self) -> Result<()> {
        let active = self.active_pairs.active_pair_count().await?;
        if active > 0 {
            debug!(active, "Active pairs present, positions will move on their own");
            return Ok(());
        }

        info!(
            "No pairs right now. Checking balances after {} sec...",
            self.timing.settle_delay_secs
        );
        tokio::time::sleep(Duration::from_secs(self.timing.settle_delay_secs)).await;

        let config = self.config_store.snapshot().await;
        let snapshot = self.positions.positions().await?;
        let now = Utc::now();

        for venue_config in config.venues.iter().filter(|v| v.enabled) {
            if !outside_blackouts(&venue_config.venue, &venue_config.blackout_periods, now) {
                debug!(venue = %venue_config.venue, "Inside blackout period, skipping");
                continue;
            }

            let Some(observed) = snapshot.get(&venue_config.venue).copied() else {
                warn!(
                    venue = %venue_config.venue,
                    "Unable to find base asset position in snapshot, skipping venue"
                );
                continue;
            };

            info!(venue = %venue_config.venue, position = %observed, "Base asset position");

            let target = venue_config.target_max_long_position;
            let Some(intent) = evaluate_position(venue_config.margin_mode, observed, target)
            else {
                continue;
            };

            let Some(adapter) = self.venues.get(&venue_config.venue) else {
                warn!(
                    venue = %venue_config.venue,
                    "No order adapter registered for venue, skipping"
                );
                continue;
            };

            info!(
                venue = %venue_config.venue,
                ?intent,
                position = %observed,
                "Adjusting position"
            );

            // Fire-and-forget: the iteration does not wait for order
            // completion, and one venue's failure never reaches the others
            let adapter = Arc::clone(adapter);
            tokio::spawn(async move {
                if let Err(e) = dispatch_correction(adapter.as_ref(), intent, target).await {
                    warn!(venue = %adapter.venue(), error = %e, "Corrective order failed");
                }
            });
        }

        Ok(())
    }
}

/// Submit the corrective order matching `intent` on one venue.
pub(crate) async fn dispatch_correction(
    adapter: &dyn VenueOrderAdapter,
    intent: CorrectiveIntent,
    target: Decimal,
) -> Result<(), VenueError> {
    match intent {
        CorrectiveIntent::SellExcess => {
            let free = adapter.free_base_amount().await?;
            let amount = sell_amount(free, target);
            info!(venue = %adapter.venue(), %amount, "Selling base asset at market");
            adapter.market_sell(amount).await?;
        }
        CorrectiveIntent::BuyShortfall => {
            let free = adapter.free_base_amount().await?;
            let amount = buy_amount(free, target);
            let size = match adapter.buy_sizing() {
                BuySizing::BaseAmount => OrderSize::Base(amount),
                BuySizing::QuoteNotional => {
                    let rate = adapter.quote_rate().await?;
                    OrderSize::QuoteNotional(amount * rate)
                }
            };
            info!(venue = %adapter.venue(), ?size, "Buying base asset at market");
            adapter.market_buy(size).await?;
        }
        CorrectiveIntent::CloseOut => {
            info!(venue = %adapter.venue(), "Closing all exposure");
            adapter.close_all().await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, MarginMode, VenueConfig};
    use crate::exchange::{
        MockActivePairStore, MockPositionBook, MockPositionProvider, MockVenue, RecordedOrder,
    };
    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    fn venue_config(name: &str, mode: MarginMode, target: Decimal) -> VenueConfig {
        VenueConfig {
            venue: name.to_string(),
            enabled: true,
            margin_mode: mode,
            target_max_long_position: target,
            blackout_periods: Vec::new(),
            api_key: String::new(),
            api_secret: String::new(),
        }
    }

    fn timing(startup_skip_ticks: u32) -> RebalancerConfig {
        RebalancerConfig {
            tick_interval_secs: 1,
            settle_delay_secs: 0,
            cooldown_secs: 0,
            startup_skip_ticks,
            stuck_retry_limit: 30,
        }
    }

    fn store_with_venues(venues: Vec<VenueConfig>) -> ConfigStore {
        let mut config = Config::default();
        config.venues = venues;
        ConfigStore::new(config)
    }

    fn adapters(list: Vec<Arc<MockVenue>>) -> Vec<Arc<dyn VenueOrderAdapter>> {
        list.into_iter()
            .map(|v| v as Arc<dyn VenueOrderAdapter>)
            .collect()
    }

    /// Let spawned order tasks run to completion.
    async fn drain_tasks() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    struct HangingPairStore;

    #[async_trait]
    impl crate::exchange::ActivePairStore for HangingPairStore {
        async fn active_pair_count(&self) -> anyhow::Result<usize> {
            futures_util::future::pending::<()>().await;
            unreachable!()
        }
    }

    #[tokio::test]
    async fn test_startup_damping_delays_first_pass() {
        let venue = MockVenue::new("bitbank", BuySizing::BaseAmount);
        venue.set_free_base_amount(dec!(7)).await;
        let positions = MockPositionBook::new();
        positions.set_position("bitbank", dec!(7)).await;

        let adjuster = PositionAdjuster::new(
            store_with_venues(vec![venue_config("bitbank", MarginMode::Cash, dec!(10))]),
            timing(30),
            positions,
            MockActivePairStore::new(),
            adapters(vec![venue.clone()]),
        );

        for i in 1..=30 {
            adjuster.tick().await;
            assert_eq!(adjuster.state().skip_count, i.min(30));
        }
        drain_tasks().await;
        assert!(venue.recorded_orders().await.is_empty());

        // The 31st tick performs the real pass
        adjuster.tick().await;
        drain_tasks().await;
        let orders = venue.recorded_orders().await;
        assert_eq!(orders.len(), 1);
        assert!(matches!(
            orders[0],
            RecordedOrder::MarketSell { amount } if amount == dec!(2)
        ));
        assert_eq!(adjuster.state().skip_count, 0);
    }

    #[tokio::test]
    async fn test_active_pairs_suppress_rebalancing() {
        let venue = MockVenue::new("bitbank", BuySizing::BaseAmount);
        venue.set_free_base_amount(dec!(9)).await;
        let positions = MockPositionBook::new();
        positions.set_position("bitbank", dec!(9)).await;
        let pairs = MockActivePairStore::new();
        pairs.set_count(2);

        let adjuster = PositionAdjuster::new(
            store_with_venues(vec![venue_config("bitbank", MarginMode::Cash, dec!(10))]),
            timing(0),
            positions,
            pairs,
            adapters(vec![venue.clone()]),
        );

        adjuster.tick().await;
        drain_tasks().await;
        assert!(venue.recorded_orders().await.is_empty());
        assert!(!adjuster.state().is_running);
    }

    #[tokio::test]
    async fn test_missing_position_skips_venue_but_not_others() {
        let bitbank = MockVenue::new("bitbank", BuySizing::BaseAmount);
        let quoine = MockVenue::new("quoine", BuySizing::BaseAmount);
        let positions = MockPositionBook::new();
        // bitbank is absent from the snapshot entirely
        positions.set_position("quoine", dec!(0.02)).await;

        let adjuster = PositionAdjuster::new(
            store_with_venues(vec![
                venue_config("bitbank", MarginMode::Cash, dec!(10)),
                venue_config("quoine", MarginMode::NetOut, dec!(10)),
            ]),
            timing(0),
            positions,
            MockActivePairStore::new(),
            adapters(vec![bitbank.clone(), quoine.clone()]),
        );

        adjuster.tick().await;
        drain_tasks().await;

        assert!(bitbank.recorded_orders().await.is_empty());
        let orders = quoine.recorded_orders().await;
        assert_eq!(orders.len(), 1);
        assert!(matches!(orders[0], RecordedOrder::CloseAll));
    }

    #[tokio::test]
    async fn test_one_venue_failure_does_not_abort_others() {
        let bitbank = MockVenue::new("bitbank", BuySizing::BaseAmount);
        bitbank.set_free_base_amount(dec!(8)).await;
        bitbank.fail_orders(true);
        let coincheck = MockVenue::new("coincheck", BuySizing::QuoteNotional);
        coincheck.set_free_base_amount(dec!(3)).await;
        coincheck.set_quote_rate(dec!(50000)).await;

        let positions = MockPositionBook::new();
        positions.set_position("bitbank", dec!(8)).await;
        positions.set_position("coincheck", dec!(3)).await;

        let adjuster = PositionAdjuster::new(
            store_with_venues(vec![
                venue_config("bitbank", MarginMode::Cash, dec!(10)),
                venue_config("coincheck", MarginMode::Cash, dec!(10)),
            ]),
            timing(0),
            positions,
            MockActivePairStore::new(),
            adapters(vec![bitbank.clone(), coincheck.clone()]),
        );

        adjuster.tick().await;
        drain_tasks().await;

        assert!(bitbank.recorded_orders().await.is_empty());
        let orders = coincheck.recorded_orders().await;
        assert_eq!(orders.len(), 1);
        // Notional-sized venue: (10/2 - 3) * 50000
        assert!(matches!(
            orders[0],
            RecordedOrder::MarketBuy { size: OrderSize::QuoteNotional(v) } if v == dec!(100000)
        ));
    }

    #[tokio::test]
    async fn test_disabled_venue_is_ignored() {
        let venue = MockVenue::new("bitbank", BuySizing::BaseAmount);
        venue.set_free_base_amount(dec!(9)).await;
        let positions = MockPositionBook::new();
        positions.set_position("bitbank", dec!(9)).await;

        let mut config = venue_config("bitbank", MarginMode::Cash, dec!(10));
        config.enabled = false;

        let adjuster = PositionAdjuster::new(
            store_with_venues(vec![config]),
            timing(0),
            positions,
            MockActivePairStore::new(),
            adapters(vec![venue.clone()]),
        );

        adjuster.tick().await;
        drain_tasks().await;
        assert!(venue.recorded_orders().await.is_empty());
    }

    #[tokio::test]
    async fn test_provider_failure_still_releases_guard() {
        let mut provider = MockPositionProvider::new();
        provider
            .expect_positions()
            .returning(|| Err(anyhow::anyhow!("snapshot service down")));

        let adjuster = PositionAdjuster::new(
            store_with_venues(vec![venue_config("bitbank", MarginMode::Cash, dec!(10))]),
            timing(0),
            Arc::new(provider),
            MockActivePairStore::new(),
            adapters(vec![MockVenue::new("bitbank", BuySizing::BaseAmount)]),
        );

        adjuster.tick().await;
        assert!(!adjuster.state().is_running);
    }

    #[tokio::test]
    async fn test_overlapping_ticks_increment_retry_then_force_clear() {
        let adjuster = Arc::new(PositionAdjuster::new(
            store_with_venues(Vec::new()),
            timing(0),
            MockPositionBook::new(),
            Arc::new(HangingPairStore),
            Vec::new(),
        ));

        // First tick wedges awaiting the pair store
        let wedged = Arc::clone(&adjuster);
        tokio::spawn(async move { wedged.tick().await });
        drain_tasks().await;
        assert!(adjuster.state().is_running);

        for expected in 1..=30 {
            adjuster.tick().await;
            assert_eq!(adjuster.state().retry_count, expected);
            assert!(adjuster.state().is_running);
        }

        // The 31st overlapping tick exceeds the limit and force-clears
        adjuster.tick().await;
        assert!(!adjuster.state().is_running);
    }

    #[tokio::test]
    async fn test_dispatch_sell_uses_free_amount() {
        let venue = MockVenue::new("bitbank", BuySizing::BaseAmount);
        venue.set_free_base_amount(dec!(7)).await;

        dispatch_correction(venue.as_ref(), CorrectiveIntent::SellExcess, dec!(10))
            .await
            .unwrap();

        let orders = venue.recorded_orders().await;
        assert!(matches!(
            orders[0],
            RecordedOrder::MarketSell { amount } if amount == dec!(2)
        ));
    }

    #[tokio::test]
    async fn test_dispatch_buy_base_amount() {
        let venue = MockVenue::new("bitbank", BuySizing::BaseAmount);
        venue.set_free_base_amount(dec!(3)).await;

        dispatch_correction(venue.as_ref(), CorrectiveIntent::BuyShortfall, dec!(10))
            .await
            .unwrap();

        let orders = venue.recorded_orders().await;
        assert!(matches!(
            orders[0],
            RecordedOrder::MarketBuy { size: OrderSize::Base(v) } if v == dec!(2)
        ));
    }

    #[tokio::test]
    async fn test_dispatch_reports_rejection() {
        let venue = MockVenue::new("quoine", BuySizing::BaseAmount);
        venue.fail_orders(true);

        let result = dispatch_correction(venue.as_ref(), CorrectiveIntent::CloseOut, dec!(10)).await;
        assert!(matches!(result, Err(VenueError::OrderRejected { .. })));
    }
}
