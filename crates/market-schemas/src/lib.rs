//! Wire-level and domain value types shared across the stock market crates.
//!
//! Every type here is a plain serde-derived struct or enum; none of them
//! hold behavior. Crates that need behavior (pricing, matching, ledgers)
//! build their own internal state around these and project it back out
//! through `TickerSnapshot`, `OrderStatus`, `PortfolioResponse`, etc.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    pub fn sign(self) -> i64 {
        match self {
            Side::Buy => 1,
            Side::Sell => -1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Limit,
    Market,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderLifecycleStatus {
    Accepted,
    PartiallyFilled,
    Filled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickerSnapshot {
    pub symbol: String,
    pub name: String,
    pub sector: String,
    pub price: f64,
    pub open_price: f64,
    pub high_price: f64,
    pub low_price: f64,
    pub volume: i64,
    pub last_update: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketRegime {
    pub name: String,
    pub description: String,
    pub drift: f64,
    pub volatility_multiplier: f64,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketNewsItem {
    pub symbol: String,
    pub headline: String,
    pub sentiment: Sentiment,
    pub created_at: DateTime<Utc>,
}

/// Inbound order placement request. `symbol` is normalised to uppercase by
/// the matching service, not here; this struct is the raw wire shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub user_id: String,
    pub symbol: String,
    pub side: Side,
    #[serde(default = "default_order_type")]
    pub order_type: OrderType,
    pub quantity: i64,
    #[serde(default)]
    pub price: Option<f64>,
}

fn default_order_type() -> OrderType {
    OrderType::Limit
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatus {
    pub order_id: String,
    pub user_id: String,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: i64,
    pub remaining_quantity: i64,
    pub price: Option<f64>,
    pub status: OrderLifecycleStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeFill {
    pub order_id: String,
    pub counter_order_id: Option<String>,
    pub symbol: String,
    pub price: f64,
    pub quantity: i64,
    pub executed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResponse {
    pub order: OrderStatus,
    pub fills: Vec<TradeFill>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioHolding {
    pub symbol: String,
    pub quantity: i64,
    pub market_value: f64,
    pub last_price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioResponse {
    pub user_id: String,
    pub cash: f64,
    pub holdings: Vec<PortfolioHolding>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<std::collections::BTreeMap<String, String>>,
}

/// One row of the JSON dataset loaded at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetCompany {
    pub ticker: String,
    pub name: Option<String>,
    pub sector: Option<String>,
    pub base_price: Option<f64>,
    pub volatility: Option<f64>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl TickerSnapshot {
    /// Mirror of the original's `round(value, 2)` applied on every
    /// price-bearing field at snapshot time.
    pub fn rounded(mut self) -> Self {
        self.price = round2(self.price);
        self.open_price = round2(self.open_price);
        self.high_price = round2(self.high_price);
        self.low_price = round2(self.low_price);
        self
    }
}
