//! Per-user ledger: signed positions and cash balance.
//!
//! Plain `f64` money, matching the simulator's own unrounded internal state
//! ([PortfolioResponse] snapshots round to 2dp, the ledger itself doesn't).
//! No validation against negative cash or short positions is performed here;
//! that absence is deliberate, not an oversight (see the crate-level note in
//! `market-matching`).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use market_schemas::{PortfolioHolding, PortfolioResponse, Side};

/// One user's holdings and cash, keyed by symbol.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    positions: BTreeMap<String, i64>,
    cash: f64,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn set_cash(&mut self, cash: f64) {
        self.cash = cash;
    }

    pub fn position(&self, symbol: &str) -> i64 {
        self.positions.get(symbol).copied().unwrap_or(0)
    }

    pub fn set_position(&mut self, symbol: &str, quantity: i64) {
        self.positions.insert(symbol.to_string(), quantity);
    }

    pub fn positions(&self) -> impl Iterator<Item = (&String, &i64)> {
        self.positions.iter()
    }

    /// Apply one fill leg: `side` is this user's side of the trade.
    pub fn apply_fill(&mut self, symbol: &str, side: Side, quantity: i64, price: f64) {
        let entry = self.positions.entry(symbol.to_string()).or_insert(0);
        *entry += side.sign() * quantity;
        let cash_delta = match side {
            Side::Buy => -price * quantity as f64,
            Side::Sell => price * quantity as f64,
        };
        self.cash += cash_delta;
    }

    /// Build the wire-level snapshot, pricing each non-zero holding at
    /// `price_for`. Mirrors the original's `abs(quantity) > 0` filter.
    pub fn snapshot(
        &self,
        user_id: &str,
        price_for: impl Fn(&str) -> Option<f64>,
        now: DateTime<Utc>,
    ) -> PortfolioResponse {
        let holdings = self
            .positions
            .iter()
            .filter(|(_, qty)| **qty != 0)
            .filter_map(|(symbol, qty)| {
                let last_price = price_for(symbol)?;
                Some(PortfolioHolding {
                    symbol: symbol.clone(),
                    quantity: *qty,
                    market_value: round2(*qty as f64 * last_price),
                    last_price: round2(last_price),
                })
            })
            .collect();
        PortfolioResponse {
            user_id: user_id.to_string(),
            cash: round2(self.cash),
            holdings,
            last_updated: now,
        }
    }

    /// Rehydrate from a durable snapshot (warm start).
    pub fn load_from_snapshot(&mut self, snapshot: &PortfolioResponse) {
        self.cash = snapshot.cash;
        for holding in &snapshot.holdings {
            self.positions.insert(holding.symbol.clone(), holding.quantity);
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn buy_fill_increases_position_and_decreases_cash() {
        let mut ledger = Ledger::new();
        ledger.apply_fill("ACME", Side::Buy, 10, 12.5);
        assert_eq!(ledger.position("ACME"), 10);
        assert_eq!(ledger.cash(), -125.0);
    }

    #[test]
    fn sell_fill_decreases_position_and_increases_cash() {
        let mut ledger = Ledger::new();
        ledger.apply_fill("ACME", Side::Sell, 4, 10.0);
        assert_eq!(ledger.position("ACME"), -4);
        assert_eq!(ledger.cash(), 40.0);
    }

    #[test]
    fn snapshot_omits_zero_positions() {
        let mut ledger = Ledger::new();
        ledger.apply_fill("ACME", Side::Buy, 5, 10.0);
        ledger.apply_fill("ACME", Side::Sell, 5, 11.0);
        let snapshot = ledger.snapshot("alice", |_| Some(11.0), Utc::now());
        assert!(snapshot.holdings.is_empty());
        assert_eq!(snapshot.cash, 5.0);
    }

    #[test]
    fn snapshot_prices_each_holding_at_current_price() {
        let mut ledger = Ledger::new();
        ledger.apply_fill("ACME", Side::Buy, 3, 10.0);
        let snapshot = ledger.snapshot("alice", |_| Some(12.0), Utc::now());
        assert_eq!(snapshot.holdings.len(), 1);
        assert_eq!(snapshot.holdings[0].market_value, 36.0);
    }
}
