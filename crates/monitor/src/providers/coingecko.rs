use async_trait::async_trait;
use reqwest::Client;

use txwatch_domain::config::ProviderOverride;
use txwatch_domain::{Network, PriceSource, ProviderError, ProviderResult};

use super::types::SimplePriceResponse;
use super::{http_error, read_json};

const DEFAULT_ENDPOINT: &str = "https://api.coingecko.com";

/// USD quote for one network's token from CoinGecko's simple price API.
pub struct CoinGeckoPriceSource {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    asset_id: &'static str,
}

impl CoinGeckoPriceSource {
    pub fn new(client: Client, network: Network, overrides: &ProviderOverride) -> Self {
        Self {
            client,
            endpoint: overrides
                .endpoint()
                .unwrap_or(DEFAULT_ENDPOINT)
                .trim_end_matches('/')
                .to_string(),
            api_key: overrides.api_key().map(str::to_string),
            asset_id: network.coingecko_id(),
        }
    }
}

#[async_trait]
impl PriceSource for CoinGeckoPriceSource {
    async fn fetch_price_usd(&self) -> ProviderResult<f64> {
        let mut request = self
            .client
            .get(format!("{}/api/v3/simple/price", self.endpoint))
            .query(&[("ids", self.asset_id), ("vs_currencies", "usd")]);
        if let Some(key) = &self.api_key {
            request = request.header("x-cg-demo-api-key", key);
        }

        let response = request.send().await.map_err(http_error)?;
        let body: SimplePriceResponse = read_json(response).await?;
        extract_usd(&body, self.asset_id)
    }
}

fn extract_usd(body: &SimplePriceResponse, asset_id: &str) -> ProviderResult<f64> {
    body.get(asset_id)
        .and_then(|quotes| quotes.get("usd"))
        .copied()
        .ok_or_else(|| ProviderError::Decode(format!("no usd quote for `{asset_id}`")))
}
