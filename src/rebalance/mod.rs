//! The rebalancing control loop.
//!
//! Contains:
//! - The per-venue decision rules (hysteresis band for cash venues,
//!   close-all for net-out venues)
//! - Blackout period filtering
//! - The tick-driven adjuster with its reentrancy guard and startup damping

mod adjuster;
mod blackout;
mod decision;

pub use adjuster::{LoopStateSnapshot, PositionAdjuster};
pub use blackout::outside_blackouts;
pub use decision::{
    buy_amount, evaluate_position, sell_amount, CorrectiveIntent, NET_OUT_EPSILON,
};
