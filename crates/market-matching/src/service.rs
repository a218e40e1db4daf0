//! Price-time priority continuous-auction matching over per-symbol books.

use std::collections::{BTreeSet, HashMap, VecDeque};

use chrono::{DateTime, Utc};
use market_portfolio::Ledger;
use market_schemas::{
    OrderLifecycleStatus, OrderRequest, OrderStatus, OrderType, PortfolioResponse, Side, TradeFill,
};
use uuid::Uuid;

use crate::book::{BookEntry, OrderBook};
use crate::error::MatchingError;
use crate::pricing::{PricingService, TickerSeed};

const TRADE_RING_CAPACITY: usize = 1000;

/// Result of a single `place_order` call: the taker's final state, the
/// fills it produced, every user whose ledger changed, and the resting
/// counter orders whose status needs to be persisted alongside it.
pub struct PlaceOrderOutcome {
    pub order: OrderStatus,
    pub fills: Vec<TradeFill>,
    pub touched_users: BTreeSet<String>,
    pub touched_counter_orders: Vec<OrderStatus>,
}

pub struct MatchingService {
    pricing: PricingService,
    books: HashMap<String, OrderBook>,
    orders: HashMap<String, OrderStatus>,
    trades: VecDeque<TradeFill>,
    ledgers: HashMap<String, Ledger>,
    drop_residual_market_orders: bool,
}

impl MatchingService {
    pub fn new(
        seeds: Vec<TickerSeed>,
        regimes: Vec<market_schemas::MarketRegime>,
        drop_residual_market_orders: bool,
    ) -> Result<Self, MatchingError> {
        let pricing = PricingService::new(seeds, regimes)?;
        let books = pricing
            .symbols()
            .map(|symbol| (symbol.to_string(), OrderBook::new()))
            .collect();
        Ok(Self {
            pricing,
            books,
            orders: HashMap::new(),
            trades: VecDeque::with_capacity(TRADE_RING_CAPACITY),
            ledgers: HashMap::new(),
            drop_residual_market_orders,
        })
    }

    pub fn pricing(&self) -> &PricingService {
        &self.pricing
    }

    pub fn pricing_mut(&mut self) -> &mut PricingService {
        &mut self.pricing
    }

    pub fn place_order(
        &mut self,
        request: OrderRequest,
        now: DateTime<Utc>,
    ) -> Result<PlaceOrderOutcome, MatchingError> {
        let symbol = request.symbol.to_uppercase();
        if !self.pricing.has_symbol(&symbol) {
            return Err(MatchingError::UnknownSymbol(symbol));
        }
        if request.order_type == OrderType::Limit && request.price.is_none() {
            return Err(MatchingError::MissingLimitPrice);
        }

        let mut order = OrderStatus {
            order_id: Uuid::new_v4().to_string(),
            user_id: request.user_id,
            symbol,
            side: request.side,
            order_type: request.order_type,
            quantity: request.quantity,
            remaining_quantity: request.quantity,
            price: request.price,
            status: OrderLifecycleStatus::Accepted,
            created_at: now,
            updated_at: now,
        };
        self.orders.insert(order.order_id.clone(), order.clone());

        let (fills, touched_users, touched_counter_orders) = self.run_match(&mut order, now);

        order.updated_at = Utc::now();
        self.orders.insert(order.order_id.clone(), order.clone());

        Ok(PlaceOrderOutcome {
            order,
            fills,
            touched_users,
            touched_counter_orders,
        })
    }

    fn run_match(
        &mut self,
        order: &mut OrderStatus,
        now: DateTime<Utc>,
    ) -> (Vec<TradeFill>, BTreeSet<String>, Vec<OrderStatus>) {
        let counter_side = order.side.opposite();
        let mut fills = Vec::new();
        let mut touched_users = BTreeSet::new();
        touched_users.insert(order.user_id.clone());
        let mut touched_counter_orders = Vec::new();

        loop {
            if order.remaining_quantity <= 0 {
                break;
            }
            let Some(book) = self.books.get_mut(&order.symbol) else {
                break;
            };
            let Some(best_price) = book.best_price(counter_side) else {
                break;
            };
            let crossable = match order.order_type {
                OrderType::Market => true,
                OrderType::Limit => {
                    let limit = order.price.expect("limit order always carries a price");
                    match order.side {
                        Side::Buy => best_price <= limit,
                        Side::Sell => best_price >= limit,
                    }
                }
            };
            if !crossable {
                break;
            }

            let mut counter_entry = book
                .pop_best(counter_side)
                .expect("best_price confirmed an entry exists");

            let trade_qty = order.remaining_quantity.min(counter_entry.remaining_quantity);
            order.remaining_quantity -= trade_qty;
            counter_entry.remaining_quantity -= trade_qty;

            let counter_order = self
                .orders
                .get_mut(&counter_entry.order_id)
                .expect("resting book entries always track a known order");
            counter_order.remaining_quantity -= trade_qty;
            counter_order.updated_at = now;
            counter_order.status = if counter_order.remaining_quantity == 0 {
                OrderLifecycleStatus::Filled
            } else {
                OrderLifecycleStatus::PartiallyFilled
            };
            let counter_user = counter_order.user_id.clone();
            let counter_order_side = counter_order.side;
            touched_counter_orders.push(counter_order.clone());
            touched_users.insert(counter_user.clone());

            let fill = TradeFill {
                order_id: order.order_id.clone(),
                counter_order_id: Some(counter_entry.order_id.clone()),
                symbol: order.symbol.clone(),
                price: round2(best_price),
                quantity: trade_qty,
                executed_at: now,
            };
            push_trade(&mut self.trades, fill.clone());
            fills.push(fill);

            self.pricing.record_trade(&order.symbol, trade_qty, best_price);

            self.ledgers
                .entry(order.user_id.clone())
                .or_default()
                .apply_fill(&order.symbol, order.side, trade_qty, best_price);
            self.ledgers
                .entry(counter_user)
                .or_default()
                .apply_fill(&order.symbol, counter_order_side, trade_qty, best_price);

            if counter_entry.remaining_quantity > 0 {
                let book = self.books.get_mut(&order.symbol).expect("book exists");
                book.push_front(counter_side, counter_entry);
            }
        }

        if order.remaining_quantity == 0 {
            order.status = OrderLifecycleStatus::Filled;
        } else if order.remaining_quantity < order.quantity {
            order.status = OrderLifecycleStatus::PartiallyFilled;
        } else {
            order.status = OrderLifecycleStatus::Accepted;
            let drop_residual = self.drop_residual_market_orders && order.order_type == OrderType::Market;
            if !drop_residual {
                let resting_price = order
                    .price
                    .or_else(|| self.pricing.price_for(&order.symbol))
                    .expect("symbol validated earlier");
                if let Some(book) = self.books.get_mut(&order.symbol) {
                    book.push_back(
                        order.side,
                        BookEntry {
                            price: resting_price,
                            remaining_quantity: order.remaining_quantity,
                            order_id: order.order_id.clone(),
                            created_at: now,
                        },
                    );
                }
            }
        }

        (fills, touched_users, touched_counter_orders)
    }

    pub fn order_status(&self, order_id: &str) -> Option<OrderStatus> {
        self.orders.get(order_id).cloned()
    }

    pub fn has_order_in_memory(&self, order_id: &str) -> bool {
        self.orders.contains_key(order_id)
    }

    /// Warm-start hydration: re-insert a durably-stored open order into
    /// both the order registry and, if it still has quantity left, the book.
    pub fn load_order(&mut self, order: OrderStatus) {
        if order.remaining_quantity > 0 {
            let price = order
                .price
                .or_else(|| self.pricing.price_for(&order.symbol))
                .unwrap_or(0.0);
            if let Some(book) = self.books.get_mut(&order.symbol) {
                book.push_back(
                    order.side,
                    BookEntry {
                        price,
                        remaining_quantity: order.remaining_quantity,
                        order_id: order.order_id.clone(),
                        created_at: order.created_at,
                    },
                );
            }
        }
        self.orders.insert(order.order_id.clone(), order);
    }

    pub fn has_ledger_in_memory(&self, user_id: &str) -> bool {
        self.ledgers.contains_key(user_id)
    }

    pub fn load_portfolio(&mut self, snapshot: &PortfolioResponse) {
        self.ledgers
            .entry(snapshot.user_id.clone())
            .or_default()
            .load_from_snapshot(snapshot);
    }

    pub fn portfolio_snapshot(&self, user_id: &str, now: DateTime<Utc>) -> PortfolioResponse {
        let pricing = &self.pricing;
        match self.ledgers.get(user_id) {
            Some(ledger) => ledger.snapshot(user_id, |symbol| pricing.price_for(symbol), now),
            None => Ledger::new().snapshot(user_id, |symbol| pricing.price_for(symbol), now),
        }
    }

    /// Warm-start hydration: append a durably-stored trade, oldest first.
    pub fn load_trade(&mut self, fill: TradeFill) {
        push_trade(&mut self.trades, fill);
    }

    pub fn recent_trades(&self, limit: usize) -> Vec<TradeFill> {
        let len = self.trades.len();
        let start = len.saturating_sub(limit);
        self.trades.iter().skip(start).cloned().collect()
    }

    pub fn trade_count(&self) -> usize {
        self.trades.len()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.pricing.symbols()
    }
}

fn push_trade(trades: &mut VecDeque<TradeFill>, fill: TradeFill) {
    if trades.len() == TRADE_RING_CAPACITY {
        trades.pop_front();
    }
    trades.push_back(fill);
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
