//! HTTP adapters for the upstream indexers, explorers and price feed.

use std::time::Duration;

use reqwest::{Client, Response};
use txwatch_domain::ProviderError;

mod coingecko;
mod graphql;
mod subscan;
mod toncenter;
mod types;

pub use coingecko::CoinGeckoPriceSource;
pub use graphql::GraphQlSource;
pub use subscan::SubscanSource;
pub use toncenter::TonCenterSource;

/// How many recent transfers each adapter asks for per poll.
pub const RECENT_BATCH_SIZE: usize = 50;

/// Nano units per whole token on TON, Everscale and Venom.
const NANO_PER_TOKEN: f64 = 1_000_000_000.0;

/// Builds the shared client; every request inherits the bounded timeout.
pub fn build_http_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("txwatch/", env!("CARGO_PKG_VERSION")))
        .build()
}

pub(crate) fn http_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Http(format!("request timed out: {err}"))
    } else if err.is_decode() {
        ProviderError::Decode(err.to_string())
    } else {
        ProviderError::Http(err.to_string())
    }
}

pub(crate) fn ensure_success(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ProviderError::Status(status.as_u16()))
    }
}

pub(crate) async fn read_json<T>(response: Response) -> Result<T, ProviderError>
where
    T: serde::de::DeserializeOwned,
{
    let response = ensure_success(response)?;
    response.json::<T>().await.map_err(http_error)
}

fn nano_to_tokens(nano: u128) -> f64 {
    nano as f64 / NANO_PER_TOKEN
}

/// Parses a decimal nano amount such as `"1500000000"`.
pub(crate) fn parse_decimal_nano(raw: &str) -> Option<f64> {
    raw.trim().parse::<u128>().ok().map(nano_to_tokens)
}

/// Parses a hex nano amount such as `"0x3b9aca00"`.
pub(crate) fn parse_hex_nano(raw: &str) -> Option<f64> {
    let digits = raw.trim().trim_start_matches("0x");
    if digits.is_empty() {
        return None;
    }
    u128::from_str_radix(digits, 16).ok().map(nano_to_tokens)
}
