//! Online spread statistics and adaptive threshold derivation.
//!
//! Fed one spread observation every few seconds, the tracker keeps a
//! 3-minute trailing window and publishes `mean + stddev` (floored at the
//! configured minimum) as the minimum target profit percentage for the rest
//! of the trading system.

mod tracker;

pub use tracker::{Sample, SpreadStatTracker};
