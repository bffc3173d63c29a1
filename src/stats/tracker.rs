//! Online spread statistics over a trailing time window.

use crate::config::ConfigPatch;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use tracing::{debug, info};

/// Decimal places kept when publishing the adaptive threshold.
const PRECISION: u32 = 3;

/// One observation of spread profitability. Immutable once recorded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    /// Best-case profit against notional, in percent
    pub profit_percent: f64,
}

/// Maintains running mean/variance of spread profitability over a trailing
/// window and derives the adaptive minimum profit threshold.
///
/// Statistics are recomputed from scratch over the pruned window on every
/// observation, so they are always exact for the samples currently held.
pub struct SpreadStatTracker {
    window: VecDeque<Sample>,
    window_duration: Duration,
    min_threshold: f64,
    sample_count: usize,
    mean: f64,
    variance: f64,
}

impl SpreadStatTracker {
    /// Create a tracker seeded with historical samples.
    pub fn new(history: Vec<Sample>, window_duration: Duration, min_threshold: f64) -> Self {
        let window: VecDeque<Sample> = history.into();
        let values: Vec<f64> = window.iter().map(|s| s.profit_percent).collect();
        let mean = population_mean(&values);
        let variance = population_variance(&values, mean);

        Self {
            sample_count: window.len(),
            window,
            window_duration,
            min_threshold,
            mean,
            variance,
        }
    }

    /// Record one spread observation and derive a configuration update.
    ///
    /// Returns `None` when too few samples are in the window for a defined
    /// standard deviation; the caller must leave prior configuration
    /// untouched in that case.
    pub fn observe(&mut self, sample: Sample) -> Option<ConfigPatch> {
        self.window.push_back(sample);

        let cutoff = Utc::now() - self.window_duration;
        self.window.retain(|s| s.timestamp > cutoff);
        self.sample_count = self.window.len();

        let values: Vec<f64> = self.window.iter().map(|s| s.profit_percent).collect();
        self.mean = population_mean(&values);
        self.variance = population_variance(&values, self.mean);

        let n = self.sample_count;
        // Bessel-corrected sample standard deviation; undefined below two samples
        let std_dev = if n > 1 {
            (self.variance * n as f64 / (n as f64 - 1.0)).sqrt()
        } else {
            f64::NAN
        };

        let raw = round_dp(self.mean + std_dev, PRECISION);
        if !raw.is_finite() {
            debug!(n, "Too few samples for a defined threshold, no update");
            return None;
        }
        let min_target_profit_percent = raw.max(self.min_threshold);

        info!(
            mean = round_dp(self.mean, PRECISION),
            std_dev = round_dp(std_dev, PRECISION),
            n,
            min_target_profit_percent,
            "Spread stats updated"
        );

        Some(ConfigPatch {
            min_target_profit_percent,
        })
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn variance(&self) -> f64 {
        self.variance
    }

    /// Timestamps currently held in the window, oldest first.
    pub fn window_timestamps(&self) -> Vec<DateTime<Utc>> {
        self.window.iter().map(|s| s.timestamp).collect()
    }
}

fn population_mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn population_variance(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
}

fn round_dp(value: f64, dp: u32) -> f64 {
    let factor = 10f64.powi(dp as i32);
    (value * factor).round() / factor
}
