//! Redis-backed hot cache of the latest ticker snapshots.

use anyhow::{Context, Result};
use market_schemas::TickerSnapshot;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

const TICKERS_KEY: &str = "market:tickers";

pub struct HotCache {
    manager: Option<ConnectionManager>,
}

impl HotCache {
    pub async fn connect(redis_url: Option<&str>) -> Result<Self> {
        let Some(url) = redis_url else {
            return Ok(Self { manager: None });
        };
        let client = redis::Client::open(url).context("parse hot cache url")?;
        let manager = ConnectionManager::new(client)
            .await
            .context("connect to hot cache")?;
        Ok(Self { manager: Some(manager) })
    }

    pub fn is_configured(&self) -> bool {
        self.manager.is_some()
    }

    pub async fn cache_tickers(&self, snapshots: &[TickerSnapshot]) -> Result<()> {
        let Some(manager) = &self.manager else { return Ok(()) };
        if snapshots.is_empty() {
            return Ok(());
        }
        let mut conn = manager.clone();
        let mapping: Vec<(String, String)> = snapshots
            .iter()
            .map(|snap| {
                let encoded = serde_json::to_string(snap).expect("TickerSnapshot always serializes");
                (snap.symbol.clone(), encoded)
            })
            .collect();
        conn.hset_multiple::<_, _, _, ()>(TICKERS_KEY, &mapping)
            .await
            .context("write hot ticker cache")?;
        Ok(())
    }

    pub async fn load_cached_tickers(&self) -> Result<Vec<TickerSnapshot>> {
        let Some(manager) = &self.manager else { return Ok(Vec::new()) };
        let mut conn = manager.clone();
        let data: std::collections::HashMap<String, String> =
            conn.hgetall(TICKERS_KEY).await.context("read hot ticker cache")?;
        let mut snapshots = Vec::with_capacity(data.len());
        for value in data.values() {
            let snapshot: TickerSnapshot =
                serde_json::from_str(value).context("decode cached ticker")?;
            snapshots.push(snapshot);
        }
        Ok(snapshots)
    }
}
