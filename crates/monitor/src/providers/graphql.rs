use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use txwatch_domain::config::ProviderOverride;
use txwatch_domain::{Network, ProviderError, ProviderResult, RawTransfer, TransferSource};

use super::types::{GraphQlRequest, GraphQlResponse, GraphQlTransaction};
use super::{http_error, parse_hex_nano, read_json, RECENT_BATCH_SIZE};

const EVERCLOUD_BASE: &str = "https://mainnet.evercloud.dev";
const EVERCLOUD_DEFAULT_PROJECT: &str = "89a3b8f46e484c2a8afc86f1fac08ccb";
const VENOM_ENDPOINT: &str = "https://gql.venom.foundation/graphql";

/// Latest transactions from an Everscale-family GraphQL indexer.
pub struct GraphQlSource {
    client: Client,
    network: Network,
    endpoint: String,
    bearer: Option<String>,
    query: String,
}

impl GraphQlSource {
    /// Evercloud addresses projects by URL, so an Everscale API key is the
    /// project id and never travels as a header. Venom sends it as a bearer
    /// token.
    pub fn new(client: Client, network: Network, overrides: &ProviderOverride) -> Self {
        let api_key = overrides.api_key();
        let (default_endpoint, bearer) = match network {
            Network::Venom => (VENOM_ENDPOINT.to_string(), api_key),
            _ => (
                format!(
                    "{EVERCLOUD_BASE}/{}/graphql",
                    api_key.unwrap_or(EVERCLOUD_DEFAULT_PROJECT)
                ),
                None,
            ),
        };

        Self {
            client,
            network,
            endpoint: overrides
                .endpoint()
                .map(str::to_string)
                .unwrap_or(default_endpoint),
            bearer: bearer.map(str::to_string),
            query: recent_transactions_query(RECENT_BATCH_SIZE),
        }
    }
}

#[async_trait]
impl TransferSource for GraphQlSource {
    async fn fetch_recent_transactions(&self) -> ProviderResult<Vec<RawTransfer>> {
        let mut request = self.client.post(&self.endpoint).json(&GraphQlRequest {
            query: &self.query,
        });
        if let Some(token) = &self.bearer {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(http_error)?;
        let body: GraphQlResponse = read_json(response).await?;
        convert_response(self.network, body)
    }
}

fn recent_transactions_query(limit: usize) -> String {
    format!(
        r#"query {{
    transactions(limit: {limit}, orderBy: {{path: "now", direction: DESC}}) {{
        id
        now
        in_message {{
            value
            src
            dst
        }}
    }}
}}"#
    )
}

fn convert_response(network: Network, body: GraphQlResponse) -> ProviderResult<Vec<RawTransfer>> {
    let Some(data) = body.data else {
        let message = body
            .errors
            .into_iter()
            .map(|entry| entry.message)
            .collect::<Vec<_>>()
            .join("; ");
        return Err(ProviderError::Api(if message.is_empty() {
            "response carried no data".to_string()
        } else {
            message
        }));
    };

    Ok(data
        .transactions
        .into_iter()
        .filter_map(|tx| convert_transaction(network, tx))
        .collect())
}

fn convert_transaction(network: Network, tx: GraphQlTransaction) -> Option<RawTransfer> {
    let message = tx.in_message?;
    let Some(amount) = message.value.as_deref().and_then(parse_hex_nano) else {
        debug!(%network, id = %tx.id, "skipping transaction without inbound value");
        return None;
    };
    if amount == 0.0 {
        return None;
    }

    Some(RawTransfer {
        hash: tx.id,
        native_amount: amount,
        sender: message.src.unwrap_or_default(),
        receiver: message.dst.unwrap_or_default(),
        timestamp: tx.now,
    })
}
