//! Market-data error types.

use perpsvc_venue::ClientError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MarketError {
    #[error("Unsupported timeframe: {0}")]
    InvalidTimeframe(String),

    #[error("Upstream error: {0}")]
    Upstream(#[from] ClientError),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type MarketResult<T> = Result<T, MarketError>;
