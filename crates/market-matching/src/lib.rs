mod book;
mod error;
pub mod pricing;
mod service;

pub use book::{BookEntry, OrderBook};
pub use error::MatchingError;
pub use pricing::{default_regimes, PricingService, TickerSeed, TickerState};
pub use service::{MatchingService, PlaceOrderOutcome};
