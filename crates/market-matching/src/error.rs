use thiserror::Error;

#[derive(Debug, Error)]
pub enum MatchingError {
    #[error("unknown symbol {0}")]
    UnknownSymbol(String),
    #[error("PricingService requires at least one ticker")]
    EmptyTickers,
    #[error("PricingService requires at least one regime")]
    EmptyRegimes,
    #[error("limit orders require a price")]
    MissingLimitPrice,
}
