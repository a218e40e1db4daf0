//! PostgreSQL-backed durable store: orders, trades, portfolios, ticks.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use market_schemas::{
    MarketRegime, OrderLifecycleStatus, OrderStatus, OrderType, PortfolioHolding,
    PortfolioResponse, Side, TickerSnapshot, TradeFill,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

pub struct DurableStore {
    pool: Option<PgPool>,
}

impl DurableStore {
    pub async fn connect(database_url: Option<&str>) -> Result<Self> {
        let Some(url) = database_url else {
            return Ok(Self { pool: None });
        };
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(5)
            .connect(url)
            .await
            .context("connect to durable store")?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("run durable store migrations")?;
        Ok(Self { pool: Some(pool) })
    }

    pub fn is_configured(&self) -> bool {
        self.pool.is_some()
    }

    pub async fn record_order_status(&self, status: &OrderStatus) -> Result<()> {
        let Some(pool) = &self.pool else { return Ok(()) };
        sqlx::query(
            r#"
            INSERT INTO market_orders (
                order_id, user_id, symbol, side, order_type, quantity,
                remaining_quantity, price, status, created_at, updated_at
            )
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11)
            ON CONFLICT (order_id)
            DO UPDATE SET
                remaining_quantity = EXCLUDED.remaining_quantity,
                status = EXCLUDED.status,
                price = EXCLUDED.price,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&status.order_id)
        .bind(&status.user_id)
        .bind(&status.symbol)
        .bind(side_str(status.side))
        .bind(order_type_str(status.order_type))
        .bind(status.quantity)
        .bind(status.remaining_quantity)
        .bind(status.price)
        .bind(lifecycle_str(status.status))
        .bind(status.created_at)
        .bind(status.updated_at)
        .execute(pool)
        .await
        .context("upsert order status")?;
        Ok(())
    }

    pub async fn record_trades(&self, fills: &[TradeFill]) -> Result<()> {
        let Some(pool) = &self.pool else { return Ok(()) };
        if fills.is_empty() {
            return Ok(());
        }
        for fill in fills {
            sqlx::query(
                r#"
                INSERT INTO market_trades (
                    order_id, counter_order_id, symbol, price, quantity, executed_at
                )
                VALUES ($1,$2,$3,$4,$5,$6)
                ON CONFLICT (order_id, executed_at, symbol) DO NOTHING
                "#,
            )
            .bind(&fill.order_id)
            .bind(&fill.counter_order_id)
            .bind(&fill.symbol)
            .bind(fill.price)
            .bind(fill.quantity)
            .bind(fill.executed_at)
            .execute(pool)
            .await
            .context("insert trade")?;
        }
        Ok(())
    }

    pub async fn record_portfolio_snapshot(&self, snapshot: &PortfolioResponse) -> Result<()> {
        let Some(pool) = &self.pool else { return Ok(()) };
        let holdings = serde_json::to_value(&snapshot.holdings).context("serialize holdings")?;
        sqlx::query(
            r#"
            INSERT INTO market_portfolios (user_id, cash, holdings, last_updated)
            VALUES ($1,$2,$3,$4)
            ON CONFLICT (user_id)
            DO UPDATE SET cash = EXCLUDED.cash, holdings = EXCLUDED.holdings, last_updated = EXCLUDED.last_updated
            "#,
        )
        .bind(&snapshot.user_id)
        .bind(snapshot.cash)
        .bind(holdings)
        .bind(snapshot.last_updated)
        .execute(pool)
        .await
        .context("upsert portfolio snapshot")?;
        Ok(())
    }

    pub async fn record_ticks(&self, ticks: &[TickerSnapshot], regime: &MarketRegime) -> Result<()> {
        let Some(pool) = &self.pool else { return Ok(()) };
        if ticks.is_empty() {
            return Ok(());
        }
        for tick in ticks {
            sqlx::query(
                r#"
                INSERT INTO market_ticks (
                    symbol, price, open_price, high_price, low_price, volume, regime, recorded_at
                )
                VALUES ($1,$2,$3,$4,$5,$6,$7,$8)
                "#,
            )
            .bind(&tick.symbol)
            .bind(tick.price)
            .bind(tick.open_price)
            .bind(tick.high_price)
            .bind(tick.low_price)
            .bind(tick.volume)
            .bind(&regime.name)
            .bind(tick.last_update)
            .execute(pool)
            .await
            .context("insert tick")?;
        }
        Ok(())
    }

    pub async fn load_order(&self, order_id: &str) -> Result<Option<OrderStatus>> {
        let Some(pool) = &self.pool else { return Ok(None) };
        let row = sqlx::query(
            r#"
            SELECT order_id, user_id, symbol, side, order_type, quantity,
                   remaining_quantity, price, status, created_at, updated_at
            FROM market_orders WHERE order_id = $1
            "#,
        )
        .bind(order_id)
        .fetch_optional(pool)
        .await
        .context("load order")?;
        Ok(row.map(order_from_row))
    }

    pub async fn load_open_orders(&self) -> Result<Vec<OrderStatus>> {
        let Some(pool) = &self.pool else { return Ok(Vec::new()) };
        let rows = sqlx::query(
            r#"
            SELECT order_id, user_id, symbol, side, order_type, quantity,
                   remaining_quantity, price, status, created_at, updated_at
            FROM market_orders WHERE status != 'FILLED'
            "#,
        )
        .fetch_all(pool)
        .await
        .context("load open orders")?;
        Ok(rows.into_iter().map(order_from_row).collect())
    }

    pub async fn load_portfolio(&self, user_id: &str) -> Result<Option<PortfolioResponse>> {
        let Some(pool) = &self.pool else { return Ok(None) };
        let row = sqlx::query(
            "SELECT user_id, cash, holdings, last_updated FROM market_portfolios WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .context("load portfolio")?;
        row.map(portfolio_from_row).transpose()
    }

    pub async fn load_all_portfolios(&self) -> Result<Vec<PortfolioResponse>> {
        let Some(pool) = &self.pool else { return Ok(Vec::new()) };
        let rows = sqlx::query("SELECT user_id, cash, holdings, last_updated FROM market_portfolios")
            .fetch_all(pool)
            .await
            .context("load all portfolios")?;
        rows.into_iter().map(portfolio_from_row).collect()
    }

    pub async fn load_recent_trades(&self, limit: i64) -> Result<Vec<TradeFill>> {
        let Some(pool) = &self.pool else { return Ok(Vec::new()) };
        let rows = sqlx::query(
            r#"
            SELECT order_id, counter_order_id, symbol, price, quantity, executed_at
            FROM market_trades ORDER BY executed_at DESC LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(pool)
        .await
        .context("load recent trades")?;
        Ok(rows.into_iter().map(trade_from_row).collect())
    }

    /// Coarse connectivity/status report surfaced by `GET /health/ready`.
    pub async fn status(&self) -> &'static str {
        match &self.pool {
            Some(pool) => {
                if sqlx::query("SELECT 1").execute(pool).await.is_ok() {
                    "connected"
                } else {
                    "unreachable"
                }
            }
            None => "not configured",
        }
    }
}

fn side_str(side: Side) -> &'static str {
    match side {
        Side::Buy => "BUY",
        Side::Sell => "SELL",
    }
}

fn order_type_str(order_type: OrderType) -> &'static str {
    match order_type {
        OrderType::Limit => "limit",
        OrderType::Market => "market",
    }
}

fn lifecycle_str(status: OrderLifecycleStatus) -> &'static str {
    match status {
        OrderLifecycleStatus::Accepted => "ACCEPTED",
        OrderLifecycleStatus::PartiallyFilled => "PARTIALLY_FILLED",
        OrderLifecycleStatus::Filled => "FILLED",
    }
}

fn side_from_str(value: &str) -> Side {
    match value {
        "SELL" => Side::Sell,
        _ => Side::Buy,
    }
}

fn order_type_from_str(value: &str) -> OrderType {
    match value {
        "market" => OrderType::Market,
        _ => OrderType::Limit,
    }
}

fn lifecycle_from_str(value: &str) -> OrderLifecycleStatus {
    match value {
        "FILLED" => OrderLifecycleStatus::Filled,
        "PARTIALLY_FILLED" => OrderLifecycleStatus::PartiallyFilled,
        _ => OrderLifecycleStatus::Accepted,
    }
}

fn order_from_row(row: sqlx::postgres::PgRow) -> OrderStatus {
    OrderStatus {
        order_id: row.get("order_id"),
        user_id: row.get("user_id"),
        symbol: row.get("symbol"),
        side: side_from_str(row.get::<String, _>("side").as_str()),
        order_type: order_type_from_str(row.get::<String, _>("order_type").as_str()),
        quantity: row.get("quantity"),
        remaining_quantity: row.get("remaining_quantity"),
        price: row.get("price"),
        status: lifecycle_from_str(row.get::<String, _>("status").as_str()),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
        updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
    }
}

fn portfolio_from_row(row: sqlx::postgres::PgRow) -> Result<PortfolioResponse> {
    let holdings_json: serde_json::Value = row.get("holdings");
    let holdings: Vec<PortfolioHolding> =
        serde_json::from_value(holdings_json).context("deserialize stored holdings")?;
    Ok(PortfolioResponse {
        user_id: row.get("user_id"),
        cash: row.get("cash"),
        holdings,
        last_updated: row.get::<DateTime<Utc>, _>("last_updated"),
    })
}

fn trade_from_row(row: sqlx::postgres::PgRow) -> TradeFill {
    TradeFill {
        order_id: row.get("order_id"),
        counter_order_id: row.get("counter_order_id"),
        symbol: row.get("symbol"),
        price: row.get("price"),
        quantity: row.get("quantity"),
        executed_at: row.get::<DateTime<Utc>, _>("executed_at"),
    }
}
