//! Data structures shared across the monitor and notifier crates.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};
use thiserror::Error;

/// Placeholder used when a provider does not report an address.
pub const UNKNOWN_ADDRESS: &str = "Unknown";

/// Blockchains the watcher knows how to poll.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr, EnumString, EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum Network {
    #[strum(serialize = "TON")]
    Ton,
    #[strum(serialize = "Everscale")]
    Everscale,
    #[strum(serialize = "Venom")]
    Venom,
    #[strum(serialize = "Humanode")]
    Humanode,
}

impl Network {
    /// Display label with a `'static` lifetime, used for metric labels.
    pub fn label(&self) -> &'static str {
        (*self).into()
    }

    /// Ticker of the network's base token.
    pub fn token_symbol(&self) -> &'static str {
        match self {
            Network::Ton => "TON",
            Network::Everscale => "EVER",
            Network::Venom => "VENOM",
            Network::Humanode => "HMND",
        }
    }

    /// Upper-case key used for `TXWATCH_<NET>_*` environment overrides.
    pub fn env_key(&self) -> &'static str {
        match self {
            Network::Ton => "TON",
            Network::Everscale => "EVERSCALE",
            Network::Venom => "VENOM",
            Network::Humanode => "HUMANODE",
        }
    }

    /// Asset id understood by the CoinGecko simple price endpoint.
    pub fn coingecko_id(&self) -> &'static str {
        match self {
            Network::Ton => "the-open-network",
            Network::Everscale => "everscale",
            Network::Venom => "venom",
            Network::Humanode => "humanode",
        }
    }

    /// Explorer URL prefix; the transaction hash is appended verbatim.
    pub fn explorer_tx_url(&self) -> &'static str {
        match self {
            Network::Ton => "https://tonscan.org/tx/",
            Network::Everscale => "https://everscan.io/transactions/",
            Network::Venom => "https://venomscan.com/transactions/",
            Network::Humanode => "https://humanode.subscan.io/extrinsic/",
        }
    }
}

/// A transfer as reported by a provider, before pricing and filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTransfer {
    pub hash: String,
    /// Amount in whole base-token units (already scaled from nano/atomic units).
    pub native_amount: f64,
    pub sender: String,
    pub receiver: String,
    /// Unix seconds as reported by the provider.
    pub timestamp: u64,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransactionError {
    #[error("native amount must be a finite non-negative number, got {0}")]
    InvalidAmount(f64),
    #[error("usd price must be a finite non-negative number, got {0}")]
    InvalidPrice(f64),
    #[error("transaction hash is empty")]
    EmptyHash,
}

/// A priced transfer that passed the monitor's filters.
///
/// The USD value is derived once from the native amount and the price used at
/// construction time and cannot be set independently.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    network: Network,
    tx_hash: String,
    amount_native: f64,
    amount_usd: f64,
    sender: String,
    receiver: String,
    timestamp: u64,
}

impl Transaction {
    pub fn priced(
        network: Network,
        raw: RawTransfer,
        price_usd: f64,
    ) -> Result<Self, TransactionError> {
        if raw.hash.trim().is_empty() {
            return Err(TransactionError::EmptyHash);
        }
        if !raw.native_amount.is_finite() || raw.native_amount < 0.0 {
            return Err(TransactionError::InvalidAmount(raw.native_amount));
        }
        if !price_usd.is_finite() || price_usd < 0.0 {
            return Err(TransactionError::InvalidPrice(price_usd));
        }

        Ok(Self {
            network,
            tx_hash: raw.hash,
            amount_native: raw.native_amount,
            amount_usd: raw.native_amount * price_usd,
            sender: non_empty_address(raw.sender),
            receiver: non_empty_address(raw.receiver),
            timestamp: raw.timestamp,
        })
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn tx_hash(&self) -> &str {
        &self.tx_hash
    }

    pub fn amount_native(&self) -> f64 {
        self.amount_native
    }

    pub fn amount_usd(&self) -> f64 {
        self.amount_usd
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn receiver(&self) -> &str {
        &self.receiver
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Provider timestamp as a UTC datetime, if it fits chrono's range.
    pub fn occurred_at(&self) -> Option<DateTime<Utc>> {
        i64::try_from(self.timestamp)
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
    }
}

fn non_empty_address(value: String) -> String {
    if value.trim().is_empty() {
        UNKNOWN_ADDRESS.to_string()
    } else {
        value
    }
}

/// Cached USD price for one network together with the moment it was fetched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceQuote {
    pub price_usd: f64,
    pub fetched_at: Instant,
}

impl PriceQuote {
    pub fn new(price_usd: f64) -> Self {
        Self {
            price_usd,
            fetched_at: Instant::now(),
        }
    }

    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }

    pub fn is_stale(&self, ttl: Duration) -> bool {
        self.age() >= ttl
    }
}

/// Details echoed in the startup notification.
#[derive(Debug, Clone, PartialEq)]
pub struct StartupSummary {
    pub networks: Vec<Network>,
    pub min_usd: f64,
    pub poll_interval: Duration,
}
