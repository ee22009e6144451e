use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use txwatch_domain::config::ProviderOverride;
use txwatch_domain::{ProviderError, ProviderResult, RawTransfer, TransferSource};

use super::types::{SubscanResponse, SubscanTransfer, SubscanTransfersRequest};
use super::{http_error, read_json, RECENT_BATCH_SIZE};

const DEFAULT_ENDPOINT: &str = "https://humanode.api.subscan.io";

/// Recent balance transfers from a Subscan explorer (Humanode).
pub struct SubscanSource {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl SubscanSource {
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
impl TransferSource for SubscanSource {
    async fn fetch_recent_transactions(&self) -> ProviderResult<Vec<RawTransfer>> {
        let mut request = self
            .client
            .post(format!("{}/api/scan/transfers", self.endpoint))
            .json(&SubscanTransfersRequest {
                row: RECENT_BATCH_SIZE,
                page: 0,
            });
        if let Some(key) = &self.api_key {
            request = request.header("X-API-Key", key);
        }

        let response = request.send().await.map_err(http_error)?;
        let body: SubscanResponse = read_json(response).await?;
        convert_response(body)
    }
}

fn convert_response(body: SubscanResponse) -> ProviderResult<Vec<RawTransfer>> {
    if body.code != 0 {
        return Err(ProviderError::Api(format!(
            "subscan code {}: {}",
            body.code, body.message
        )));
    }

    let transfers = body
        .data
        .and_then(|data| data.transfers)
        .unwrap_or_default();

    Ok(transfers
        .into_iter()
        .take(RECENT_BATCH_SIZE)
        .filter_map(convert_transfer)
        .collect())
}

fn convert_transfer(transfer: SubscanTransfer) -> Option<RawTransfer> {
    let amount = match transfer.amount.trim().parse::<f64>() {
        Ok(amount) if amount.is_finite() && amount > 0.0 => amount,
        _ => {
            debug!(hash = %transfer.hash, amount = %transfer.amount, "skipping unusable transfer amount");
            return None;
        }
    };

    Some(RawTransfer {
        hash: transfer.hash,
        native_amount: amount,
        sender: transfer.from,
        receiver: transfer.to,
        timestamp: transfer.block_timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_transfers() {
        let body: SubscanResponse = serde_json::from_str(
            r#"{"code": 0, "message": "Success", "data": {"count": 2, "transfers": [
                {"hash": "0xabc", "from": "hmA", "to": "hmB", "amount": "1250.5", "block_timestamp": 1700000000},
                {"hash": "0xdef", "from": "hmA", "to": "hmC", "amount": "not-a-number", "block_timestamp": 1700000001}
            ]}}"#,
        )
        .unwrap();

        let transfers = convert_response(body).unwrap();
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].hash, "0xabc");
        assert_eq!(transfers[0].native_amount, 1250.5);
        assert_eq!(transfers[0].receiver, "hmB");
    }

    #[test]
    fn null_transfer_list_is_empty() {
        let body: SubscanResponse =
            serde_json::from_str(r#"{"code": 0, "message": "Success", "data": {"transfers": null}}"#)
                .unwrap();
        assert!(convert_response(body).unwrap().is_empty());
    }

    #[test]
    fn non_zero_code_is_an_api_error() {
        let body: SubscanResponse =
            serde_json::from_str(r#"{"code": 10004, "message": "Record Not Found"}"#).unwrap();
        assert_eq!(
            convert_response(body).unwrap_err(),
            ProviderError::Api("subscan code 10004: Record Not Found".into())
        );
    }
}
