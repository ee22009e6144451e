//! Wire shapes of the upstream JSON APIs. Only the fields the adapters read
//! are modelled; everything else is ignored by serde.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// `GET /api/v3/transactions` on toncenter.
#[derive(Debug, Deserialize, Default)]
pub struct TonTransactionsResponse {
    #[serde(default)]
    pub transactions: Vec<TonTransaction>,
}

#[derive(Debug, Deserialize)]
pub struct TonTransaction {
    pub hash: String,
    pub now: u64,
    #[serde(default)]
    pub in_msg: Option<TonMessage>,
}

#[derive(Debug, Deserialize)]
pub struct TonMessage {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
    /// Nanotons as a decimal string; absent for external messages.
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GraphQlRequest<'a> {
    pub query: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct GraphQlResponse {
    #[serde(default)]
    pub data: Option<GraphQlData>,
    #[serde(default)]
    pub errors: Vec<GraphQlErrorEntry>,
}

#[derive(Debug, Deserialize)]
pub struct GraphQlErrorEntry {
    pub message: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct GraphQlData {
    #[serde(default)]
    pub transactions: Vec<GraphQlTransaction>,
}

#[derive(Debug, Deserialize)]
pub struct GraphQlTransaction {
    pub id: String,
    pub now: u64,
    #[serde(default)]
    pub in_message: Option<GraphQlMessage>,
}

#[derive(Debug, Deserialize)]
pub struct GraphQlMessage {
    /// Nano units as a `0x`-prefixed hex string.
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub src: Option<String>,
    #[serde(default)]
    pub dst: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubscanTransfersRequest {
    pub row: usize,
    pub page: usize,
}

#[derive(Debug, Deserialize)]
pub struct SubscanResponse {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<SubscanTransfersData>,
}

#[derive(Debug, Deserialize, Default)]
pub struct SubscanTransfersData {
    #[serde(default)]
    pub transfers: Option<Vec<SubscanTransfer>>,
}

#[derive(Debug, Deserialize)]
pub struct SubscanTransfer {
    pub hash: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    /// Whole tokens as a decimal string.
    pub amount: String,
    pub block_timestamp: u64,
}

/// `GET /api/v3/simple/price` keyed by asset id, then by currency.
pub type SimplePriceResponse = HashMap<String, HashMap<String, f64>>;
