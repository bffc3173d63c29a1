//! Common types exchanged with venue adapters.

use rust_decimal::Decimal;
use std::fmt;
use thiserror::Error;

/// Errors reported by venue adapters.
///
/// Adapters never silently no-op: every order call either succeeds with a
/// receipt or fails with one of these.
#[derive(Debug, Error)]
pub enum VenueError {
    /// The venue accepted the request but rejected the order
    #[error("order rejected by {venue}: {reason}")]
    OrderRejected { venue: String, reason: String },

    /// Transport-level failure talking to the venue
    #[error("transport error for {venue}: {message}")]
    Transport { venue: String, message: String },

    /// The venue could not supply data the caller needs (balance, rate)
    #[error("missing data from {venue}: {what}")]
    MissingData { venue: String, what: String },
}

/// Order direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

/// How a market buy is sized on a particular venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuySizing {
    /// The venue takes a base asset quantity
    BaseAmount,
    /// The venue takes a quote currency notional (amount * rate)
    QuoteNotional,
}

/// Size of a market buy, in whichever denomination the venue requires.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OrderSize {
    /// Base asset quantity
    Base(Decimal),
    /// Quote currency notional
    QuoteNotional(Decimal),
}

impl OrderSize {
    pub fn value(&self) -> Decimal {
        match self {
            OrderSize::Base(v) | OrderSize::QuoteNotional(v) => *v,
        }
    }
}

/// Acknowledgement returned by a venue for a submitted order.
#[derive(Debug, Clone)]
pub struct OrderReceipt {
    pub venue: String,
    pub order_id: u64,
    pub side: OrderSide,
    pub size: OrderSize,
}
