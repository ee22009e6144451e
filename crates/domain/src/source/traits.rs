use async_trait::async_trait;
use thiserror::Error;

use crate::model::RawTransfer;

/// Common result alias for provider calls.
pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("http error: {0}")]
    Http(String),
    #[error("provider returned status {0}")]
    Status(u16),
    #[error("failed to decode provider response: {0}")]
    Decode(String),
    #[error("provider reported an error: {0}")]
    Api(String),
}

/// Lists the most recent transfers seen by a network's indexer or explorer.
#[async_trait]
pub trait TransferSource: Send + Sync {
    async fn fetch_recent_transactions(&self) -> ProviderResult<Vec<RawTransfer>>;
}

/// Quotes the current USD price of a network's base token.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch_price_usd(&self) -> ProviderResult<f64>;
}
