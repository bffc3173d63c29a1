//! External collaborator interfaces for the rebalancing agent.
//!
//! Real venue API clients live outside this crate; the control loop talks to
//! them only through the traits defined here. The `mock` module provides
//! in-memory implementations for paper trading and tests.

pub mod mock;
mod traits;
mod types;

pub use mock::{MockActivePairStore, MockPositionBook, MockSpreadFeed, MockVenue, RecordedOrder};
pub use traits::{ActivePairStore, PositionProvider, SpreadStatFeed, VenueOrderAdapter};
#[cfg(test)]
pub use traits::MockPositionProvider;
pub use types::{BuySizing, OrderReceipt, OrderSide, OrderSize, VenueError};
