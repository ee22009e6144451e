use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use txwatch_domain::config::ProviderOverride;
use txwatch_domain::{ProviderResult, RawTransfer, TransferSource};

use super::types::{TonTransaction, TonTransactionsResponse};
use super::{http_error, parse_decimal_nano, read_json, RECENT_BATCH_SIZE};

const DEFAULT_ENDPOINT: &str = "https://toncenter.com";

/// Latest transactions from the toncenter v3 indexer.
pub struct TonCenterSource {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl TonCenterSource {
    pub fn new(client: Client, overrides: &ProviderOverride) -> Self {
        Self {
            client,
            endpoint: overrides
                .endpoint()
                .unwrap_or(DEFAULT_ENDPOINT)
                .trim_end_matches('/')
                .to_string(),
            api_key: overrides.api_key().map(str::to_string),
        }
    }
}

#[async_trait]
impl TransferSource for TonCenterSource {
    async fn fetch_recent_transactions(&self) -> ProviderResult<Vec<RawTransfer>> {
        let limit = RECENT_BATCH_SIZE.to_string();
        let mut request = self
            .client
            .get(format!("{}/api/v3/transactions", self.endpoint))
            .query(&[("limit", limit.as_str()), ("sort", "desc")]);
        if let Some(key) = &self.api_key {
            request = request.header("X-API-Key", key);
        }

        let response = request.send().await.map_err(http_error)?;
        let body: TonTransactionsResponse = read_json(response).await?;
        Ok(convert_transactions(body))
    }
}

fn convert_transactions(body: TonTransactionsResponse) -> Vec<RawTransfer> {
    body.transactions
        .into_iter()
        .filter_map(convert_transaction)
        .collect()
}

fn convert_transaction(tx: TonTransaction) -> Option<RawTransfer> {
    let message = tx.in_msg?;
    let Some(amount) = message.value.as_deref().and_then(parse_decimal_nano) else {
        debug!(hash = %tx.hash, "skipping ton transaction without inbound value");
        return None;
    };
    if amount == 0.0 {
        return None;
    }

    Some(RawTransfer {
        hash: tx.hash,
        native_amount: amount,
        sender: message.source.unwrap_or_default(),
        receiver: message.destination.unwrap_or_default(),
        timestamp: tx.now,
    })
}
