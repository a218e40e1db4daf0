//! Best-effort append-only analytics sink (ClickHouse).
//!
//! Self-disables for the process lifetime on first connection failure;
//! every `publish_*` call swallows its own errors so a down analytics
//! cluster never blocks trading.

use chrono::{DateTime, Utc};
use clickhouse::{Client, Row};
use market_schemas::{MarketRegime, PortfolioResponse, TickerSnapshot};
use serde::Serialize;
use tracing::warn;

const TICKS_TABLE: &str = "market_ticks";
const PORTFOLIO_TABLE: &str = "portfolio_snapshots";

#[derive(Debug, Clone, Serialize, Row)]
struct TickRow {
    symbol: String,
    price: f64,
    open_price: f64,
    high_price: f64,
    low_price: f64,
    volume: u64,
    regime: String,
    #[serde(with = "clickhouse::serde::chrono::datetime64::millis")]
    recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Row)]
struct PortfolioRow {
    user_id: String,
    cash: f64,
    holdings: String,
    #[serde(with = "clickhouse::serde::chrono::datetime64::millis")]
    last_updated: DateTime<Utc>,
}

pub struct AnalyticsSink {
    client: Option<Client>,
}

#[derive(Debug, Clone)]
pub struct AnalyticsConnectParams {
    pub host: Option<String>,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: String,
    pub enabled: bool,
}

impl AnalyticsSink {
    pub async fn connect(params: AnalyticsConnectParams) -> Self {
        if !params.enabled || params.host.is_none() {
            return Self { client: None };
        }
        let host = params.host.expect("checked above");
        let url = format!("http://{host}:{}", params.port);
        let mut client = Client::default().with_url(url).with_database(&params.database);
        if let Some(user) = &params.user {
            client = client.with_user(user);
        }
        if let Some(password) = &params.password {
            client = client.with_password(password);
        }
        match ensure_tables(&client).await {
            Ok(()) => Self { client: Some(client) },
            Err(err) => {
                warn!(error = %err, "clickhouse connection failed, analytics disabled for this process");
                Self { client: None }
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.client.is_some()
    }

    pub async fn publish_ticks(&self, ticks: &[TickerSnapshot], regime: &MarketRegime) {
        let Some(client) = &self.client else { return };
        if ticks.is_empty() {
            return;
        }
        let result: clickhouse::error::Result<()> = async {
            let mut insert = client.insert(TICKS_TABLE)?;
            for tick in ticks {
                insert
                    .write(&TickRow {
                        symbol: tick.symbol.clone(),
                        price: tick.price,
                        open_price: tick.open_price,
                        high_price: tick.high_price,
                        low_price: tick.low_price,
                        volume: tick.volume.max(0) as u64,
                        regime: regime.name.clone(),
                        recorded_at: tick.last_update,
                    })
                    .await?;
            }
            insert.end().await
        }
        .await;
        if let Err(err) = result {
            warn!(error = %err, "failed to publish ticks to analytics sink");
        }
    }

    pub async fn publish_portfolio_snapshot(&self, snapshot: &PortfolioResponse) {
        let Some(client) = &self.client else { return };
        let holdings = match serde_json::to_string(&snapshot.holdings) {
            Ok(json) => json,
            Err(err) => {
                warn!(error = %err, "failed to encode holdings for analytics");
                return;
            }
        };
        let result: clickhouse::error::Result<()> = async {
            let mut insert = client.insert(PORTFOLIO_TABLE)?;
            insert
                .write(&PortfolioRow {
                    user_id: snapshot.user_id.clone(),
                    cash: snapshot.cash,
                    holdings,
                    last_updated: snapshot.last_updated,
                })
                .await?;
            insert.end().await
        }
        .await;
        if let Err(err) = result {
            warn!(error = %err, "failed to publish portfolio snapshot to analytics sink");
        }
    }
}

async fn ensure_tables(client: &Client) -> clickhouse::error::Result<()> {
    client
        .query(
            r#"
            CREATE TABLE IF NOT EXISTS market_ticks (
                symbol String,
                price Float64,
                open_price Float64,
                high_price Float64,
                low_price Float64,
                volume UInt64,
                regime String,
                recorded_at DateTime64(3, 'UTC')
            )
            ENGINE = MergeTree()
            ORDER BY (symbol, recorded_at)
            "#,
        )
        .execute()
        .await?;
    client
        .query(
            r#"
            CREATE TABLE IF NOT EXISTS portfolio_snapshots (
                user_id String,
                cash Float64,
                holdings String,
                last_updated DateTime64(3, 'UTC')
            )
            ENGINE = ReplacingMergeTree(last_updated)
            ORDER BY (user_id, last_updated)
            "#,
        )
        .execute()
        .await?;
    Ok(())
}
