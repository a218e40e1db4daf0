//! Environment-driven configuration for the stock market daemon.
//!
//! Every setting is read from a `STOCKMARKET_`-prefixed environment
//! variable. Nothing here touches the filesystem beyond reading
//! `std::env`; `.env.local` loading (if any) is the binary's job.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_DATASET_PATH: &str = "./data/dataset/fake_companies.json";
const DEFAULT_TICK_INTERVAL_SECS: f64 = 1.0;
const DEFAULT_NEWS_INTERVAL_SECS: f64 = 45.0;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 5;
const DEFAULT_CLICKHOUSE_PORT: u16 = 8123;
const DEFAULT_CLICKHOUSE_DATABASE: &str = "default";

#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    pub host: Option<String>,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: String,
    pub enabled: bool,
}

impl AnalyticsConfig {
    /// Matches the original's `enabled and bool(host)` gate: analytics is
    /// only live when both the flag is set and a host was configured.
    pub fn is_active(&self) -> bool {
        self.enabled && self.host.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct MarketConfig {
    pub bind_addr: SocketAddr,
    pub dataset_path: String,
    pub tick_interval: Duration,
    pub news_interval: Duration,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub analytics: AnalyticsConfig,
    pub risk_base_url: Option<String>,
    pub http_timeout: Duration,
    pub drop_residual_market_orders: bool,
}

impl MarketConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr = env_or("STOCKMARKET_BIND_ADDR", DEFAULT_BIND_ADDR)
            .parse::<SocketAddr>()
            .context("STOCKMARKET_BIND_ADDR is not a valid socket address")?;

        let tick_interval = parse_secs_env("STOCKMARKET_TICK_INTERVAL", DEFAULT_TICK_INTERVAL_SECS)?;
        let news_interval = parse_secs_env("STOCKMARKET_NEWS_INTERVAL", DEFAULT_NEWS_INTERVAL_SECS)?;

        let http_timeout_secs = match std::env::var("STOCKMARKET_HTTP_TIMEOUT_SECS") {
            Ok(raw) => raw
                .parse::<u64>()
                .context("STOCKMARKET_HTTP_TIMEOUT_SECS must be an integer number of seconds")?,
            Err(_) => DEFAULT_HTTP_TIMEOUT_SECS,
        };

        let clickhouse_port = match std::env::var("STOCKMARKET_CLICKHOUSE_PORT") {
            Ok(raw) => raw
                .parse::<u16>()
                .context("STOCKMARKET_CLICKHOUSE_PORT must be a valid port number")?,
            Err(_) => DEFAULT_CLICKHOUSE_PORT,
        };

        let clickhouse_enabled = match std::env::var("STOCKMARKET_CLICKHOUSE_ENABLED") {
            Ok(raw) => parse_bool(&raw)
                .context("STOCKMARKET_CLICKHOUSE_ENABLED must be a boolean (true/false/1/0)")?,
            Err(_) => true,
        };

        let drop_residual_market_orders =
            match std::env::var("STOCKMARKET_DROP_RESIDUAL_MARKET_ORDERS") {
                Ok(raw) => parse_bool(&raw).context(
                    "STOCKMARKET_DROP_RESIDUAL_MARKET_ORDERS must be a boolean (true/false/1/0)",
                )?,
                Err(_) => false,
            };

        Ok(Self {
            bind_addr,
            dataset_path: env_or("STOCKMARKET_DATASET_PATH", DEFAULT_DATASET_PATH),
            tick_interval,
            news_interval,
            database_url: non_empty_env("STOCKMARKET_DATABASE_URL"),
            redis_url: non_empty_env("STOCKMARKET_REDIS_URL"),
            analytics: AnalyticsConfig {
                host: non_empty_env("STOCKMARKET_CLICKHOUSE_HOST"),
                port: clickhouse_port,
                user: non_empty_env("STOCKMARKET_CLICKHOUSE_USER"),
                password: non_empty_env("STOCKMARKET_CLICKHOUSE_PASSWORD"),
                database: env_or("STOCKMARKET_CLICKHOUSE_DATABASE", DEFAULT_CLICKHOUSE_DATABASE),
                enabled: clickhouse_enabled,
            },
            risk_base_url: non_empty_env("STOCKMARKET_RISK_BASE_URL"),
            http_timeout: Duration::from_secs(http_timeout_secs),
            drop_residual_market_orders,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn parse_secs_env(key: &str, default: f64) -> Result<Duration> {
    let seconds = match std::env::var(key) {
        Ok(raw) => raw
            .parse::<f64>()
            .with_context(|| format!("{key} must be a number of seconds"))?,
        Err(_) => default,
    };
    Ok(Duration::from_secs_f64(seconds))
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("not a boolean: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clear_env() {
        for (key, _) in std::env::vars() {
            if key.starts_with("STOCKMARKET_") {
                std::env::remove_var(key);
            }
        }
    }

    #[test]
    fn defaults_apply_when_unset() {
        clear_env();
        let cfg = MarketConfig::from_env().unwrap();
        assert_eq!(cfg.dataset_path, DEFAULT_DATASET_PATH);
        assert_eq!(cfg.tick_interval, Duration::from_secs_f64(1.0));
        assert_eq!(cfg.news_interval, Duration::from_secs_f64(45.0));
        assert!(cfg.database_url.is_none());
        assert!(!cfg.analytics.is_active());
    }

    #[test]
    fn analytics_requires_host_even_when_enabled() {
        clear_env();
        std::env::set_var("STOCKMARKET_CLICKHOUSE_ENABLED", "true");
        let cfg = MarketConfig::from_env().unwrap();
        assert!(!cfg.analytics.is_active());
        clear_env();
    }

    #[test]
    fn rejects_malformed_bind_addr() {
        clear_env();
        std::env::set_var("STOCKMARKET_BIND_ADDR", "not-an-addr");
        assert!(MarketConfig::from_env().is_err());
        clear_env();
    }
}
