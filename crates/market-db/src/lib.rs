mod cache;
mod durable;

pub use cache::HotCache;
pub use durable::DurableStore;

use anyhow::Result;
use market_schemas::{MarketRegime, OrderStatus, PortfolioResponse, TickerSnapshot, TradeFill};

/// Combines the durable store and the hot cache behind one capability-gated
/// surface; every method is a no-op when its backing store isn't configured.
pub struct Persistence {
    durable: DurableStore,
    cache: HotCache,
}

impl Persistence {
    pub async fn connect(database_url: Option<&str>, redis_url: Option<&str>) -> Result<Self> {
        let durable = DurableStore::connect(database_url).await?;
        let cache = HotCache::connect(redis_url).await?;
        Ok(Self { durable, cache })
    }

    pub fn has_durable_store(&self) -> bool {
        self.durable.is_configured()
    }

    pub fn has_hot_cache(&self) -> bool {
        self.cache.is_configured()
    }

    pub async fn record_order_status(&self, status: &OrderStatus) -> Result<()> {
        self.durable.record_order_status(status).await
    }

    pub async fn record_trades(&self, fills: &[TradeFill]) -> Result<()> {
        self.durable.record_trades(fills).await
    }

    pub async fn record_portfolio_snapshot(&self, snapshot: &PortfolioResponse) -> Result<()> {
        self.durable.record_portfolio_snapshot(snapshot).await
    }

    pub async fn record_ticks(&self, ticks: &[TickerSnapshot], regime: &MarketRegime) -> Result<()> {
        self.durable.record_ticks(ticks, regime).await
    }

    pub async fn load_order(&self, order_id: &str) -> Result<Option<OrderStatus>> {
        self.durable.load_order(order_id).await
    }

    pub async fn load_open_orders(&self) -> Result<Vec<OrderStatus>> {
        self.durable.load_open_orders().await
    }

    pub async fn load_portfolio(&self, user_id: &str) -> Result<Option<PortfolioResponse>> {
        self.durable.load_portfolio(user_id).await
    }

    pub async fn load_all_portfolios(&self) -> Result<Vec<PortfolioResponse>> {
        self.durable.load_all_portfolios().await
    }

    pub async fn load_recent_trades(&self, limit: i64) -> Result<Vec<TradeFill>> {
        self.durable.load_recent_trades(limit).await
    }

    pub async fn cache_tickers(&self, snapshots: &[TickerSnapshot]) -> Result<()> {
        self.cache.cache_tickers(snapshots).await
    }

    pub async fn load_cached_tickers(&self) -> Result<Vec<TickerSnapshot>> {
        self.cache.load_cached_tickers().await
    }

    pub async fn durable_status(&self) -> &'static str {
        self.durable.status().await
    }
}
