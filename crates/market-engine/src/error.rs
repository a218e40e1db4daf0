use market_matching::MatchingError;
use market_risk::RiskError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown symbol {0}")]
    UnknownSymbol(String),
    #[error("limit orders require a price")]
    MissingLimitPrice,
    #[error(transparent)]
    Risk(#[from] RiskError),
    #[error("order {0} not found")]
    OrderNotFound(String),
    #[error("infrastructure error: {0}")]
    Infrastructure(#[from] anyhow::Error),
}

impl EngineError {
    /// Insufficient-credit rejections map to `409 Conflict` at the HTTP
    /// boundary; every other risk-gateway failure (transport, bad
    /// response) is an infrastructure-style `503` instead.
    pub fn is_risk_rejection(&self) -> bool {
        matches!(self, EngineError::Risk(RiskError::Rejected(_, _)))
    }
}

impl From<MatchingError> for EngineError {
    fn from(err: MatchingError) -> Self {
        match err {
            MatchingError::UnknownSymbol(symbol) => EngineError::UnknownSymbol(symbol),
            MatchingError::MissingLimitPrice => EngineError::MissingLimitPrice,
            // Both only occur at construction time, long before any request
            // can reach `place_order`; surfacing them as infrastructure
            // errors avoids inventing a dead match arm for the caller.
            MatchingError::EmptyTickers | MatchingError::EmptyRegimes => {
                EngineError::Infrastructure(anyhow::anyhow!(err))
            }
        }
    }
}
