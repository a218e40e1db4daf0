//! Loads the seed instrument list from the JSON dataset file at startup.

use anyhow::{Context, Result};
use market_matching::TickerSeed;
use market_schemas::DatasetCompany;

const DEFAULT_BASE_PRICE: f64 = 25.0;
const DEFAULT_VOLATILITY: f64 = 0.08;
const MIN_VOLATILITY: f64 = 0.01;
const DEFAULT_SECTOR: &str = "General";

pub fn load_dataset(path: &str) -> Result<Vec<TickerSeed>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read dataset file at {path}"))?;
    let companies: Vec<DatasetCompany> =
        serde_json::from_str(&contents).with_context(|| format!("dataset at {path} is not valid JSON"))?;
    if companies.is_empty() {
        anyhow::bail!("dataset at {path} contains no companies");
    }
    Ok(companies.into_iter().map(seed_from_company).collect())
}

fn seed_from_company(company: DatasetCompany) -> TickerSeed {
    let symbol = company.ticker.to_uppercase();
    TickerSeed {
        name: company.name.unwrap_or_else(|| symbol.clone()),
        sector: company.sector.unwrap_or_else(|| DEFAULT_SECTOR.to_string()),
        base_price: company.base_price.unwrap_or(DEFAULT_BASE_PRICE),
        volatility: company.volatility.unwrap_or(DEFAULT_VOLATILITY).max(MIN_VOLATILITY),
        symbol,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    /// Writes `contents` to a uniquely-named file under the OS temp dir and
    /// returns its path; the file is left for the OS to reap.
    fn write_temp(contents: &str) -> std::path::PathBuf {
        let id = COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!("market-engine-dataset-test-{id}.json"));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn fills_in_defaults_for_missing_fields() {
        let path = write_temp(r#"[{"ticker":"acme"}]"#);
        let seeds = load_dataset(path.to_str().unwrap()).unwrap();
        assert_eq!(seeds.len(), 1);
        assert_eq!(seeds[0].symbol, "ACME");
        assert_eq!(seeds[0].name, "ACME");
        assert_eq!(seeds[0].sector, "General");
        assert_eq!(seeds[0].base_price, DEFAULT_BASE_PRICE);
        assert_eq!(seeds[0].volatility, DEFAULT_VOLATILITY);
    }

    #[test]
    fn clamps_volatility_floor() {
        let path = write_temp(r#"[{"ticker":"zzz","volatility":0.0}]"#);
        let seeds = load_dataset(path.to_str().unwrap()).unwrap();
        assert_eq!(seeds[0].volatility, MIN_VOLATILITY);
    }

    #[test]
    fn rejects_empty_dataset() {
        let path = write_temp("[]");
        assert!(load_dataset(path.to_str().unwrap()).is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_dataset("/nonexistent/path/does-not-exist.json").is_err());
    }
}
