//! Price-indexed, time-ordered order book for a single instrument.
//!
//! Each side is a `BTreeMap` of price level -> FIFO queue of resting
//! entries. A match step is a best-key lookup plus a `pop_front`/
//! `push_front` pair rather than a full re-sort of an unsorted vector on
//! every step, the faster equivalent named in the design notes.

use std::cmp::Ordering;
use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use market_schemas::Side;

#[derive(Debug, Clone)]
pub struct BookEntry {
    pub price: f64,
    pub remaining_quantity: i64,
    pub order_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PriceKey(f64);

impl Eq for PriceKey {}

impl PartialOrd for PriceKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PriceKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    buy: BTreeMap<PriceKey, VecDeque<BookEntry>>,
    sell: BTreeMap<PriceKey, VecDeque<BookEntry>>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    fn side_map(&self, side: Side) -> &BTreeMap<PriceKey, VecDeque<BookEntry>> {
        match side {
            Side::Buy => &self.buy,
            Side::Sell => &self.sell,
        }
    }

    fn side_map_mut(&mut self, side: Side) -> &mut BTreeMap<PriceKey, VecDeque<BookEntry>> {
        match side {
            Side::Buy => &mut self.buy,
            Side::Sell => &mut self.sell,
        }
    }

    /// Best resting price on `side`: highest for BUY, lowest for SELL.
    pub fn best_price(&self, side: Side) -> Option<f64> {
        let map = self.side_map(side);
        match side {
            Side::Buy => map.keys().next_back().map(|k| k.0),
            Side::Sell => map.keys().next().map(|k| k.0),
        }
    }

    /// Remove the earliest entry at the best price on `side`.
    pub fn pop_best(&mut self, side: Side) -> Option<BookEntry> {
        let key = match side {
            Side::Buy => *self.buy.keys().next_back()?,
            Side::Sell => *self.sell.keys().next()?,
        };
        let map = self.side_map_mut(side);
        let queue = map.get_mut(&key)?;
        let entry = queue.pop_front();
        if queue.is_empty() {
            map.remove(&key);
        }
        entry
    }

    /// Reinsert a partially-filled entry at the front of its price level,
    /// preserving its time priority among peers at the same price.
    pub fn push_front(&mut self, side: Side, entry: BookEntry) {
        self.side_map_mut(side)
            .entry(PriceKey(entry.price))
            .or_default()
            .push_front(entry);
    }

    /// Append a brand new resting order to the back of its price level.
    pub fn push_back(&mut self, side: Side, entry: BookEntry) {
        self.side_map_mut(side)
            .entry(PriceKey(entry.price))
            .or_default()
            .push_back(entry);
    }

    pub fn is_empty_side(&self, side: Side) -> bool {
        self.side_map(side).is_empty()
    }

    pub fn entries(&self, side: Side) -> impl Iterator<Item = &BookEntry> {
        self.side_map(side).values().flat_map(|queue| queue.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(price: f64, qty: i64, id: &str) -> BookEntry {
        BookEntry {
            price,
            remaining_quantity: qty,
            order_id: id.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn sell_side_best_is_lowest_price() {
        let mut book = OrderBook::new();
        book.push_back(Side::Sell, entry(10.5, 5, "a"));
        book.push_back(Side::Sell, entry(10.0, 5, "b"));
        assert_eq!(book.best_price(Side::Sell), Some(10.0));
        let best = book.pop_best(Side::Sell).unwrap();
        assert_eq!(best.order_id, "b");
    }

    #[test]
    fn buy_side_best_is_highest_price() {
        let mut book = OrderBook::new();
        book.push_back(Side::Buy, entry(9.0, 5, "a"));
        book.push_back(Side::Buy, entry(9.5, 5, "b"));
        assert_eq!(book.best_price(Side::Buy), Some(9.5));
        let best = book.pop_best(Side::Buy).unwrap();
        assert_eq!(best.order_id, "b");
    }

    #[test]
    fn fifo_within_price_level() {
        let mut book = OrderBook::new();
        book.push_back(Side::Sell, entry(10.0, 5, "first"));
        book.push_back(Side::Sell, entry(10.0, 5, "second"));
        let popped = book.pop_best(Side::Sell).unwrap();
        assert_eq!(popped.order_id, "first");
    }

    #[test]
    fn partial_fill_keeps_priority_at_front() {
        let mut book = OrderBook::new();
        book.push_back(Side::Sell, entry(10.0, 5, "first"));
        book.push_back(Side::Sell, entry(10.0, 5, "second"));
        let mut popped = book.pop_best(Side::Sell).unwrap();
        popped.remaining_quantity -= 2;
        book.push_front(Side::Sell, popped);
        let next = book.pop_best(Side::Sell).unwrap();
        assert_eq!(next.order_id, "first");
        assert_eq!(next.remaining_quantity, 3);
    }
}
