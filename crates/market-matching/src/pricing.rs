//! Tick generation, regime rotation, and news synthesis for one market.
//!
//! Owned by [`crate::MatchingService`], mirroring the original simulator
//! where pricing, matching, and the ledger are composed in one service
//! rather than split across process boundaries.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use market_schemas::{MarketNewsItem, MarketRegime, Sentiment, TickerSnapshot};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use crate::error::MatchingError;

const NEWS_RING_CAPACITY: usize = 50;
const SECTOR_BIAS_RANGE: f64 = 0.0005;

#[derive(Debug, Clone)]
pub struct TickerState {
    pub symbol: String,
    pub name: String,
    pub sector: String,
    pub volatility: f64,
    pub price: f64,
    pub open_price: f64,
    pub high_price: f64,
    pub low_price: f64,
    pub volume: i64,
    pub last_update: DateTime<Utc>,
}

impl TickerState {
    fn snapshot(&self) -> TickerSnapshot {
        TickerSnapshot {
            symbol: self.symbol.clone(),
            name: self.name.clone(),
            sector: self.sector.clone(),
            price: self.price,
            open_price: self.open_price,
            high_price: self.high_price,
            low_price: self.low_price,
            volume: self.volume,
            last_update: self.last_update,
        }
        .rounded()
    }
}

/// Seed data for one instrument, as read from the dataset loader.
#[derive(Debug, Clone)]
pub struct TickerSeed {
    pub symbol: String,
    pub name: String,
    pub sector: String,
    pub base_price: f64,
    pub volatility: f64,
}

pub fn default_regimes(now: DateTime<Utc>) -> Vec<MarketRegime> {
    vec![
        MarketRegime {
            name: "Calm".to_string(),
            description: "Low volatility baseline session with gentle drift".to_string(),
            drift: 0.0006,
            volatility_multiplier: 0.8,
            started_at: now,
        },
        MarketRegime {
            name: "Rally".to_string(),
            description: "Broad-based optimism lifts most sectors".to_string(),
            drift: 0.0015,
            volatility_multiplier: 1.2,
            started_at: now,
        },
        MarketRegime {
            name: "Turbulence".to_string(),
            description: "Event-driven chop with sharp reversals".to_string(),
            drift: -0.0002,
            volatility_multiplier: 1.8,
            started_at: now,
        },
        MarketRegime {
            name: "Correction".to_string(),
            description: "Risk-off rotation compressing valuations".to_string(),
            drift: -0.001,
            volatility_multiplier: 1.4,
            started_at: now,
        },
    ]
}

pub struct PricingService {
    /// Insertion-ordered so `tick`/`snapshot` replay instruments in the
    /// order they were seeded, matching the dataset's file order.
    tickers: IndexMap<String, TickerState>,
    regimes: Vec<MarketRegime>,
    active_regime_index: usize,
    news: std::collections::VecDeque<MarketNewsItem>,
}

impl PricingService {
    pub fn new(seeds: Vec<TickerSeed>, regimes: Vec<MarketRegime>) -> Result<Self, MatchingError> {
        if seeds.is_empty() {
            return Err(MatchingError::EmptyTickers);
        }
        if regimes.is_empty() {
            return Err(MatchingError::EmptyRegimes);
        }
        let now = Utc::now();
        let tickers = seeds
            .into_iter()
            .map(|seed| {
                (
                    seed.symbol.clone(),
                    TickerState {
                        symbol: seed.symbol,
                        name: seed.name,
                        sector: seed.sector,
                        volatility: seed.volatility,
                        price: seed.base_price,
                        open_price: seed.base_price,
                        high_price: seed.base_price,
                        low_price: seed.base_price,
                        volume: 0,
                        last_update: now,
                    },
                )
            })
            .collect();
        Ok(Self {
            tickers,
            regimes,
            active_regime_index: 0,
            news: std::collections::VecDeque::with_capacity(NEWS_RING_CAPACITY),
        })
    }

    pub fn tick(&mut self) -> Vec<TickerSnapshot> {
        let regime = self.active_regime().clone();
        let active_index = self.active_regime_index;
        let timestamp = Utc::now();
        let mut updates = Vec::with_capacity(self.tickers.len());
        for state in self.tickers.values_mut() {
            let delta = sample_return(state, &regime, active_index);
            let new_price = (state.price * delta.exp()).max(0.5);
            state.price = new_price;
            state.high_price = state.high_price.max(new_price);
            state.low_price = state.low_price.min(new_price);
            state.last_update = timestamp;
            updates.push(state.snapshot());
        }
        updates
    }

    pub fn record_trade(&mut self, symbol: &str, quantity: i64, price: f64) {
        let Some(state) = self.tickers.get_mut(symbol) else {
            return;
        };
        state.price = price;
        state.high_price = state.high_price.max(price);
        state.low_price = state.low_price.min(price);
        state.volume += quantity;
        state.last_update = Utc::now();
    }

    pub fn snapshot(&self) -> Vec<TickerSnapshot> {
        self.tickers.values().map(TickerState::snapshot).collect()
    }

    pub fn active_regime(&self) -> &MarketRegime {
        &self.regimes[self.active_regime_index]
    }

    pub fn regimes(&self) -> &[MarketRegime] {
        &self.regimes
    }

    pub fn rotate_regime(&mut self) -> MarketRegime {
        self.active_regime_index = (self.active_regime_index + 1) % self.regimes.len();
        self.regimes[self.active_regime_index].started_at = Utc::now();
        self.regimes[self.active_regime_index].clone()
    }

    pub fn generate_news(&mut self) -> Option<MarketNewsItem> {
        if self.tickers.is_empty() {
            return None;
        }
        let mut rng = rand::thread_rng();
        let index = rng.gen_range(0..self.tickers.len());
        let (symbol, ticker) = self.tickers.iter().nth(index)?;
        let sentiment = match rng.gen_range(0..3) {
            0 => Sentiment::Positive,
            1 => Sentiment::Neutral,
            _ => Sentiment::Negative,
        };
        let headline = match sentiment {
            Sentiment::Positive => format!("{} surges on upbeat community momentum", ticker.name),
            Sentiment::Neutral => format!("{} reports steady progress in quarterly briefing", ticker.name),
            Sentiment::Negative => format!("{} faces short-term headwinds amid sector rotation", ticker.name),
        };
        let item = MarketNewsItem {
            symbol: symbol.clone(),
            headline,
            sentiment,
            created_at: Utc::now(),
        };
        if self.news.len() == NEWS_RING_CAPACITY {
            self.news.pop_back();
        }
        self.news.push_front(item.clone());
        Some(item)
    }

    pub fn recent_news(&self) -> Vec<MarketNewsItem> {
        self.news.iter().cloned().collect()
    }

    pub fn price_for(&self, symbol: &str) -> Option<f64> {
        self.tickers.get(symbol).map(|state| state.price)
    }

    pub fn has_symbol(&self, symbol: &str) -> bool {
        self.tickers.contains_key(symbol)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.tickers.keys().map(String::as_str)
    }
}

fn sample_return(state: &TickerState, regime: &MarketRegime, active_regime_index: usize) -> f64 {
    let mut rng = rand::thread_rng();
    let normal = Normal::new(0.0, state.volatility * regime.volatility_multiplier)
        .expect("volatility is always positive");
    let noise = normal.sample(&mut rng);
    regime.drift + noise + sector_bias(&state.sector, active_regime_index)
}

/// Deterministic in (sector, active regime index, current hour bucket); see
/// the open design note on replayability in `market-engine`.
fn sector_bias(sector: &str, active_regime_index: usize) -> f64 {
    let hour_bucket = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_secs()
        / 3600;
    let mut hasher = DefaultHasher::new();
    (sector, active_regime_index, hour_bucket).hash(&mut hasher);
    let seed = hasher.finish();
    let mut rng = StdRng::seed_from_u64(seed);
    rng.gen_range(-SECTOR_BIAS_RANGE..=SECTOR_BIAS_RANGE)
}
