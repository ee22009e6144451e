//! Environment-driven configuration structures shared by all binaries.

use std::{collections::HashMap, env, str::FromStr, time::Duration};

use strum::IntoEnumIterator;
use thiserror::Error;
use tracing::warn;

use crate::model::Network;

/// Poll intervals below this are accepted but logged as too aggressive.
pub const RECOMMENDED_MIN_POLL_SECS: u64 = 10;

const DEFAULT_POLL_SECS: u64 = 60;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 15;
const DEFAULT_ALERT_SPACING_MS: u64 = 500;
const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 30;

/// Opaque endpoint/key pair handed to a provider adapter untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderOverride {
    endpoint: Option<String>,
    api_key: Option<String>,
}

impl ProviderOverride {
    pub fn new(endpoint: Option<String>, api_key: Option<String>) -> Self {
        Self { endpoint, api_key }
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }
}

/// Settings consumed by the monitoring engine.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    min_usd: f64,
    poll_interval: Duration,
    networks: Vec<Network>,
    overrides: HashMap<Network, ProviderOverride>,
    price_override: ProviderOverride,
    http_timeout: Duration,
    max_price_age: Option<Duration>,
    alert_spacing: Duration,
    shutdown_grace: Duration,
}

impl MonitorConfig {
    /// Hydrates `.env` (if present) and reads the `TXWATCH_*` variables. The
    /// USD threshold is required; everything else has a default.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        let min_usd = parse_threshold("TXWATCH_MIN_USD", &get_required_var("TXWATCH_MIN_USD")?)?;
        let poll_secs = get_positive_u64_or("TXWATCH_POLL_INTERVAL_SECS", DEFAULT_POLL_SECS)?;
        if poll_secs < RECOMMENDED_MIN_POLL_SECS {
            warn!(
                poll_secs,
                recommended = RECOMMENDED_MIN_POLL_SECS,
                "poll interval below recommended floor"
            );
        }

        let networks = match get_optional_var("TXWATCH_NETWORKS") {
            Some(list) => parse_networks(&list)?,
            None => Network::iter().collect(),
        };

        let overrides = Network::iter()
            .map(|network| {
                let key = network.env_key();
                let entry = ProviderOverride::new(
                    get_optional_var(&format!("TXWATCH_{key}_ENDPOINT")),
                    get_optional_var(&format!("TXWATCH_{key}_API_KEY")),
                );
                (network, entry)
            })
            .collect();

        let price_override = ProviderOverride::new(
            get_optional_var("TXWATCH_PRICE_ENDPOINT"),
            get_optional_var("TXWATCH_PRICE_API_KEY"),
        );

        let max_price_age = match get_optional_var("TXWATCH_MAX_PRICE_AGE_SECS") {
            Some(raw) => Some(Duration::from_secs(parse_u64(
                "TXWATCH_MAX_PRICE_AGE_SECS",
                &raw,
            )?)),
            None => None,
        };

        Ok(Self {
            min_usd,
            poll_interval: Duration::from_secs(poll_secs),
            networks,
            overrides,
            price_override,
            http_timeout: Duration::from_secs(get_positive_u64_or(
                "TXWATCH_HTTP_TIMEOUT_SECS",
                DEFAULT_HTTP_TIMEOUT_SECS,
            )?),
            max_price_age,
            alert_spacing: Duration::from_millis(get_u64_or(
                "TXWATCH_ALERT_SPACING_MS",
                DEFAULT_ALERT_SPACING_MS,
            )?),
            shutdown_grace: Duration::from_secs(get_u64_or(
                "TXWATCH_SHUTDOWN_GRACE_SECS",
                DEFAULT_SHUTDOWN_GRACE_SECS,
            )?),
        })
    }

    pub fn min_usd(&self) -> f64 {
        self.min_usd
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn networks(&self) -> &[Network] {
        &self.networks
    }

    pub fn provider_override(&self, network: Network) -> ProviderOverride {
        self.overrides.get(&network).cloned().unwrap_or_default()
    }

    pub fn price_override(&self) -> &ProviderOverride {
        &self.price_override
    }

    pub fn http_timeout(&self) -> Duration {
        self.http_timeout
    }

    pub fn max_price_age(&self) -> Option<Duration> {
        self.max_price_age
    }

    pub fn alert_spacing(&self) -> Duration {
        self.alert_spacing
    }

    pub fn shutdown_grace(&self) -> Duration {
        self.shutdown_grace
    }
}

/// Credentials for the Telegram alert sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelegramConfig {
    bot_token: String,
    chat_id: String,
    api_url: Option<String>,
}

impl TelegramConfig {
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        Ok(Self {
            bot_token: get_required_var("TELEGRAM_BOT_TOKEN")?,
            chat_id: get_required_var("TELEGRAM_CHAT_ID")?,
            api_url: get_optional_var("TELEGRAM_API_URL"),
        })
    }

    pub fn bot_token(&self) -> &str {
        &self.bot_token
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    pub fn api_url(&self) -> Option<&str> {
        self.api_url.as_deref()
    }
}

fn parse_threshold(key: &'static str, raw: &str) -> Result<f64, ConfigError> {
    let value: f64 = raw
        .parse()
        .map_err(|source| ConfigError::InvalidFloat { key, source })?;
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::InvalidValue {
            key,
            reason: format!("expected a finite non-negative amount, got {value}"),
        });
    }
    Ok(value)
}

fn parse_networks(list: &str) -> Result<Vec<Network>, ConfigError> {
    let mut networks = Vec::new();
    for name in list.split(',').map(str::trim).filter(|name| !name.is_empty()) {
        let network =
            Network::from_str(name).map_err(|_| ConfigError::UnknownNetwork(name.to_string()))?;
        if !networks.contains(&network) {
            networks.push(network);
        }
    }
    if networks.is_empty() {
        return Err(ConfigError::InvalidValue {
            key: "TXWATCH_NETWORKS",
            reason: "no networks listed".to_string(),
        });
    }
    Ok(networks)
}

fn parse_u64(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.parse()
        .map_err(|source| ConfigError::InvalidNumber { key, source })
}

fn get_u64_or(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    match get_optional_var(key) {
        Some(raw) => parse_u64(key, &raw),
        None => Ok(default),
    }
}

fn get_positive_u64_or(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    match get_u64_or(key, default)? {
        0 => Err(ConfigError::InvalidValue {
            key,
            reason: "must be greater than zero".to_string(),
        }),
        value => Ok(value),
    }
}

fn get_required_var(key: &'static str) -> Result<String, ConfigError> {
    get_optional_var(key).ok_or(ConfigError::MissingVar { key })
}

fn get_optional_var(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

pub fn hydrate_env_file() -> Result<(), ConfigError> {
    if env::var_os("TXWATCH_SKIP_DOTENV").is_some() {
        return Ok(());
    }
    match dotenvy::dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(ConfigError::Dotenv { source: err }),
    }

    Ok(())
}

/// Errors emitted when `.env` hydration or environment parsing fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable `{key}`")]
    MissingVar { key: &'static str },
    #[error("invalid integer in `{key}`: {source}")]
    InvalidNumber {
        key: &'static str,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("invalid number in `{key}`: {source}")]
    InvalidFloat {
        key: &'static str,
        #[source]
        source: std::num::ParseFloatError,
    },
    #[error("invalid value in `{key}`: {reason}")]
    InvalidValue { key: &'static str, reason: String },
    #[error("unknown network `{0}`")]
    UnknownNetwork(String),
    #[error("failed to load .env file: {source}")]
    Dotenv {
        #[from]
        source: dotenvy::Error,
    },
}
