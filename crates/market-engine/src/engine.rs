//! Orchestrator: owns the single lock around [`MatchingService`], runs the
//! price/news/regime background loops, and fans their output out to
//! WebSocket subscribers. Persistence, analytics, and risk calls all happen
//! outside the lock so a slow database or HTTP round-trip never blocks a
//! concurrent `place_order`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use chrono::Utc;
use market_config::MarketConfig;
use market_db::Persistence;
use market_matching::MatchingService;
use market_risk::RiskGateway;
use market_schemas::{
    MarketNewsItem, MarketRegime, OrderRequest, OrderResponse, OrderStatus, TickerSnapshot,
};
use serde::Serialize;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::dataset::load_dataset;
use crate::error::EngineError;

const REGIME_ROTATION_INTERVAL: Duration = Duration::from_secs(300);
const SUBSCRIBER_QUEUE_CAPACITY: usize = 100;
const TRADE_HYDRATION_DEPTH: i64 = 1000;

/// One message fanned out to every `/ws/ticks` subscriber. `Snapshot` is
/// only ever sent directly to a freshly-connected client, never broadcast.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    Snapshot {
        data: Vec<TickerSnapshot>,
    },
    Tick {
        regime: MarketRegime,
        data: Vec<TickerSnapshot>,
        timestamp: chrono::DateTime<Utc>,
    },
    News {
        data: MarketNewsItem,
    },
    Regime {
        data: MarketRegime,
    },
    Order {
        data: OrderResponse,
    },
}

/// A registered WebSocket consumer. Dropping this unregisters it.
pub struct Subscription {
    engine: std::sync::Arc<Engine>,
    id: u64,
    pub receiver: mpsc::Receiver<EngineEvent>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.engine.unregister(self.id);
    }
}

pub struct Engine {
    state: AsyncMutex<MatchingService>,
    persistence: Persistence,
    analytics: market_analytics::AnalyticsSink,
    risk: RiskGateway,
    subscribers: StdMutex<HashMap<u64, mpsc::Sender<EngineEvent>>>,
    next_subscriber_id: AtomicU64,
    tasks: AsyncMutex<Vec<JoinHandle<()>>>,
    ready: AtomicBool,
    tick_interval: Duration,
    news_interval: Duration,
}

impl Engine {
    pub async fn bootstrap(config: &MarketConfig) -> anyhow::Result<std::sync::Arc<Self>> {
        let seeds = load_dataset(&config.dataset_path)?;
        let regimes = market_matching::default_regimes(Utc::now());
        let mut matching = MatchingService::new(seeds, regimes, config.drop_residual_market_orders)
            .map_err(|err| anyhow::anyhow!(err))?;

        let persistence = Persistence::connect(config.database_url.as_deref(), config.redis_url.as_deref())
            .await
            .map_err(|err| anyhow::anyhow!("connect persistence façade: {err}"))?;
        let analytics = market_analytics::AnalyticsSink::connect(market_analytics::AnalyticsConnectParams {
            host: config.analytics.host.clone(),
            port: config.analytics.port,
            user: config.analytics.user.clone(),
            password: config.analytics.password.clone(),
            database: config.analytics.database.clone(),
            enabled: config.analytics.enabled,
        })
        .await;
        let risk = RiskGateway::new(config.risk_base_url.clone(), config.http_timeout);

        warm_state(&mut matching, &persistence).await?;

        Ok(std::sync::Arc::new(Self {
            state: AsyncMutex::new(matching),
            persistence,
            analytics,
            risk,
            subscribers: StdMutex::new(HashMap::new()),
            next_subscriber_id: AtomicU64::new(0),
            tasks: AsyncMutex::new(Vec::new()),
            ready: AtomicBool::new(false),
            tick_interval: config.tick_interval,
            news_interval: config.news_interval,
        }))
    }

    pub async fn start(self: &std::sync::Arc<Self>) {
        let mut tasks = self.tasks.lock().await;
        if !tasks.is_empty() {
            return;
        }
        tasks.push(tokio::spawn(run_price_loop(self.clone())));
        tasks.push(tokio::spawn(run_news_loop(self.clone())));
        tasks.push(tokio::spawn(run_regime_loop(self.clone())));
        drop(tasks);
        self.ready.store(true, Ordering::SeqCst);
    }

    pub async fn stop(&self) {
        let mut tasks = self.tasks.lock().await;
        for task in tasks.iter() {
            task.abort();
        }
        for task in tasks.drain(..) {
            let _ = task.await;
        }
        self.ready.store(false, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub async fn durable_status(&self) -> &'static str {
        self.persistence.durable_status().await
    }

    pub async fn tickers_snapshot(&self) -> Vec<TickerSnapshot> {
        self.state.lock().await.pricing().snapshot()
    }

    pub async fn regimes(&self) -> Vec<MarketRegime> {
        self.state.lock().await.pricing().regimes().to_vec()
    }

    pub async fn recent_news(&self) -> Vec<MarketNewsItem> {
        self.state.lock().await.pricing().recent_news()
    }

    pub fn register(self: &std::sync::Arc<Self>) -> Subscription {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);
        self.subscribers.lock().expect("subscriber registry poisoned").insert(id, tx);
        Subscription {
            engine: self.clone(),
            id,
            receiver: rx,
        }
    }

    fn unregister(&self, id: u64) {
        self.subscribers.lock().expect("subscriber registry poisoned").remove(&id);
    }

    fn broadcast(&self, event: EngineEvent) {
        let mut subscribers = self.subscribers.lock().expect("subscriber registry poisoned");
        subscribers.retain(|_, tx| tx.try_send(event.clone()).is_ok());
    }

    pub async fn place_order(&self, request: OrderRequest) -> Result<OrderResponse, EngineError> {
        let symbol = request.symbol.to_uppercase();
        if request.order_type == market_schemas::OrderType::Limit && request.price.is_none() {
            return Err(EngineError::MissingLimitPrice);
        }
        let notional_reference_price = {
            let state = self.state.lock().await;
            if !state.pricing().has_symbol(&symbol) {
                return Err(EngineError::UnknownSymbol(symbol));
            }
            let current = state.pricing().price_for(&symbol);
            match request.price {
                Some(limit_price) => current.map(|c| limit_price.max(c)).or(Some(limit_price)),
                None => current,
            }
        };
        let notional = notional_reference_price.unwrap_or(0.0) * request.quantity as f64;
        self.risk.ensure_credit_limit(&request, notional).await?;

        let outcome = {
            let mut state = self.state.lock().await;
            state.place_order(request, Utc::now())?
        };

        self.persistence.record_order_status(&outcome.order).await?;
        for counter in &outcome.touched_counter_orders {
            self.persistence.record_order_status(counter).await?;
        }
        if !outcome.fills.is_empty() {
            self.persistence.record_trades(&outcome.fills).await?;
            self.risk.publish_fills(&outcome.order, &outcome.fills).await;
        }
        self.risk.publish_order(&outcome.order, notional).await;
        for user_id in &outcome.touched_users {
            self.persist_and_publish_portfolio(user_id).await?;
        }

        let response = OrderResponse {
            order: outcome.order,
            fills: outcome.fills,
        };
        self.broadcast(EngineEvent::Order { data: response.clone() });
        Ok(response)
    }

    pub async fn order_status(&self, order_id: &str) -> Option<OrderStatus> {
        if let Some(found) = self.state.lock().await.order_status(order_id) {
            return Some(found);
        }
        match self.persistence.load_order(order_id).await {
            Ok(Some(loaded)) => {
                self.state.lock().await.load_order(loaded.clone());
                Some(loaded)
            }
            Ok(None) => None,
            Err(err) => {
                warn!(error = %err, order_id, "failed to hydrate order from durable store");
                None
            }
        }
    }

    /// Mirrors the original's read-that-writes-back behavior: a known
    /// in-memory portfolio is always re-derived, re-persisted, and
    /// re-published on every call, even a plain `GET`. Only the cold-start
    /// path (unknown in memory, found in storage) short-circuits that.
    pub async fn portfolio(&self, user_id: &str) -> Result<market_schemas::PortfolioResponse, EngineError> {
        let known = self.state.lock().await.has_ledger_in_memory(user_id);
        if !known {
            if let Some(stored) = self.persistence.load_portfolio(user_id).await? {
                self.state.lock().await.load_portfolio(&stored);
                return Ok(stored);
            }
        }
        let snapshot = self.state.lock().await.portfolio_snapshot(user_id, Utc::now());
        self.persistence.record_portfolio_snapshot(&snapshot).await?;
        self.analytics.publish_portfolio_snapshot(&snapshot).await;
        self.risk.publish_portfolio(&snapshot).await;
        Ok(snapshot)
    }

    async fn persist_and_publish_portfolio(&self, user_id: &str) -> Result<(), EngineError> {
        let snapshot = self.state.lock().await.portfolio_snapshot(user_id, Utc::now());
        self.persistence.record_portfolio_snapshot(&snapshot).await?;
        self.analytics.publish_portfolio_snapshot(&snapshot).await;
        self.risk.publish_portfolio(&snapshot).await;
        Ok(())
    }

    pub async fn recent_trades(&self, limit: usize) -> Vec<market_schemas::TradeFill> {
        let (existing, have_enough) = {
            let state = self.state.lock().await;
            (state.recent_trades(limit), state.trade_count() >= limit)
        };
        if have_enough {
            return existing;
        }
        match self.persistence.load_recent_trades(limit.min(TRADE_HYDRATION_DEPTH as usize) as i64).await {
            Ok(trades) if !trades.is_empty() => {
                let mut ascending = trades.clone();
                ascending.sort_by_key(|trade| trade.executed_at);
                let mut state = self.state.lock().await;
                for trade in ascending {
                    state.load_trade(trade);
                }
                drop(state);
                trades
            }
            _ => existing,
        }
    }
}

impl Engine {
    /// Test-support constructor: skips dataset/file loading and connects
    /// persistence, analytics, and risk in their disabled no-op states so
    /// orchestration logic can be exercised without any live infrastructure.
    /// Used by this crate's own tests and by market-daemon's router tests.
    pub async fn bootstrap_in_memory(seeds: Vec<market_matching::TickerSeed>) -> std::sync::Arc<Self> {
        let regimes = market_matching::default_regimes(Utc::now());
        let matching = MatchingService::new(seeds, regimes, false).expect("non-empty seeds/regimes");
        let persistence = Persistence::connect(None, None)
            .await
            .expect("unconfigured persistence always connects");
        let analytics = market_analytics::AnalyticsSink::connect(market_analytics::AnalyticsConnectParams {
            host: None,
            port: 0,
            user: None,
            password: None,
            database: String::new(),
            enabled: false,
        })
        .await;
        let risk = RiskGateway::new(None, Duration::from_secs(1));

        std::sync::Arc::new(Self {
            state: AsyncMutex::new(matching),
            persistence,
            analytics,
            risk,
            subscribers: StdMutex::new(HashMap::new()),
            next_subscriber_id: AtomicU64::new(0),
            tasks: AsyncMutex::new(Vec::new()),
            ready: AtomicBool::new(false),
            tick_interval: Duration::from_secs(3600),
            news_interval: Duration::from_secs(3600),
        })
    }
}

async fn warm_state(matching: &mut MatchingService, persistence: &Persistence) -> anyhow::Result<()> {
    for order in persistence.load_open_orders().await? {
        matching.load_order(order);
    }
    for portfolio in persistence.load_all_portfolios().await? {
        matching.load_portfolio(&portfolio);
    }
    let mut trades = persistence.load_recent_trades(TRADE_HYDRATION_DEPTH).await?;
    trades.sort_by_key(|trade| trade.executed_at);
    for trade in trades {
        matching.load_trade(trade);
    }
    Ok(())
}

async fn run_price_loop(engine: std::sync::Arc<Engine>) {
    loop {
        tokio::time::sleep(engine.tick_interval).await;
        let (updates, regime) = {
            let mut state = engine.state.lock().await;
            let updates = state.pricing_mut().tick();
            let regime = state.pricing().active_regime().clone();
            (updates, regime)
        };
        if updates.is_empty() {
            continue;
        }
        if let Err(err) = engine.persistence.record_ticks(&updates, &regime).await {
            warn!(error = %err, "failed to persist ticks");
        }
        if let Err(err) = engine.persistence.cache_tickers(&updates).await {
            warn!(error = %err, "failed to refresh hot ticker cache");
        }
        engine.analytics.publish_ticks(&updates, &regime).await;
        engine.broadcast(EngineEvent::Tick {
            regime,
            data: updates,
            timestamp: Utc::now(),
        });
    }
}

async fn run_news_loop(engine: std::sync::Arc<Engine>) {
    loop {
        tokio::time::sleep(engine.news_interval).await;
        let news = {
            let mut state = engine.state.lock().await;
            state.pricing_mut().generate_news()
        };
        if let Some(item) = news {
            engine.broadcast(EngineEvent::News { data: item });
        }
    }
}

async fn run_regime_loop(engine: std::sync::Arc<Engine>) {
    loop {
        tokio::time::sleep(REGIME_ROTATION_INTERVAL).await;
        let regime = {
            let mut state = engine.state.lock().await;
            state.pricing_mut().rotate_regime()
        };
        engine.broadcast(EngineEvent::Regime { data: regime });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use market_matching::TickerSeed;
    use market_schemas::{OrderType, Side};

    fn seeds() -> Vec<TickerSeed> {
        vec![TickerSeed {
            symbol: "ACME".to_string(),
            name: "Acme Corp".to_string(),
            sector: "Industrials".to_string(),
            base_price: 50.0,
            volatility: 0.1,
        }]
    }

    fn limit_order(user_id: &str, side: Side, quantity: i64, price: f64) -> OrderRequest {
        OrderRequest {
            user_id: user_id.to_string(),
            symbol: "ACME".to_string(),
            side,
            order_type: OrderType::Limit,
            quantity,
            price: Some(price),
        }
    }

    #[tokio::test]
    async fn place_order_rejects_unknown_symbol() {
        let engine = Engine::bootstrap_in_memory(seeds()).await;
        let mut order = limit_order("alice", Side::Buy, 10, 50.0);
        order.symbol = "NOPE".to_string();
        let err = engine.place_order(order).await.unwrap_err();
        assert!(matches!(err, EngineError::UnknownSymbol(symbol) if symbol == "NOPE"));
    }

    #[tokio::test]
    async fn place_order_rejects_missing_limit_price() {
        let engine = Engine::bootstrap_in_memory(seeds()).await;
        let order = OrderRequest {
            user_id: "alice".to_string(),
            symbol: "ACME".to_string(),
            side: Side::Buy,
            order_type: OrderType::Limit,
            quantity: 10,
            price: None,
        };
        let err = engine.place_order(order).await.unwrap_err();
        assert!(matches!(err, EngineError::MissingLimitPrice));
    }

    #[tokio::test]
    async fn matching_buy_and_sell_orders_produce_a_fill_and_broadcast_it() {
        let engine = Engine::bootstrap_in_memory(seeds()).await;
        let mut subscription = engine.register();

        let sell = engine
            .place_order(limit_order("bob", Side::Sell, 10, 50.0))
            .await
            .expect("sell rests on the book");
        assert!(sell.fills.is_empty());

        let buy = engine
            .place_order(limit_order("alice", Side::Buy, 10, 50.0))
            .await
            .expect("buy crosses the resting sell");
        assert_eq!(buy.fills.len(), 1);
        assert_eq!(buy.fills[0].quantity, 10);

        // Two place_order calls broadcast two EngineEvent::Order frames.
        let first = subscription.receiver.recv().await.expect("sell order event");
        assert!(matches!(first, EngineEvent::Order { .. }));
        let second = subscription.receiver.recv().await.expect("buy order event");
        assert!(matches!(second, EngineEvent::Order { .. }));
    }

    #[tokio::test]
    async fn portfolio_is_derived_and_persisted_on_every_call_once_known() {
        let engine = Engine::bootstrap_in_memory(seeds()).await;
        engine
            .place_order(limit_order("alice", Side::Buy, 5, 50.0))
            .await
            .expect("resting buy order");

        let first = engine.portfolio("alice").await.expect("known ledger");
        let second = engine.portfolio("alice").await.expect("re-derived on every call");
        assert_eq!(first.user_id, "alice");
        assert_eq!(second.user_id, "alice");
    }

    #[tokio::test]
    async fn portfolio_for_a_completely_unknown_user_has_no_holdings() {
        let engine = Engine::bootstrap_in_memory(seeds()).await;
        let snapshot = engine.portfolio("ghost").await.expect("unknown user still gets a snapshot");
        assert_eq!(snapshot.user_id, "ghost");
        assert!(snapshot.holdings.is_empty());
    }

    #[tokio::test]
    async fn recent_trades_returns_in_memory_fills_without_touching_persistence() {
        let engine = Engine::bootstrap_in_memory(seeds()).await;
        engine
            .place_order(limit_order("bob", Side::Sell, 10, 50.0))
            .await
            .unwrap();
        engine
            .place_order(limit_order("alice", Side::Buy, 10, 50.0))
            .await
            .unwrap();

        let trades = engine.recent_trades(1).await;
        assert_eq!(trades.len(), 1);
    }

    #[tokio::test]
    async fn subscription_drop_unregisters_the_subscriber() {
        let engine = Engine::bootstrap_in_memory(seeds()).await;
        {
            let _subscription = engine.register();
            assert_eq!(engine.subscribers.lock().unwrap().len(), 1);
        }
        assert_eq!(engine.subscribers.lock().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn order_status_is_visible_immediately_after_placement() {
        let engine = Engine::bootstrap_in_memory(seeds()).await;
        let response = engine
            .place_order(limit_order("alice", Side::Buy, 10, 50.0))
            .await
            .unwrap();
        let status = engine.order_status(&response.order.order_id).await;
        assert!(status.is_some());
    }

    #[tokio::test]
    async fn order_status_for_unknown_id_is_none() {
        let engine = Engine::bootstrap_in_memory(seeds()).await;
        assert!(engine.order_status("does-not-exist").await.is_none());
    }
}
