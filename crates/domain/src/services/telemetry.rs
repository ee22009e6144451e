//! Tracing and Prometheus wiring for the monitor binary.

use std::{env, net::SocketAddr};

use metrics::{describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::hydrate_env_file;

const DEFAULT_LOG_FILTER: &str = "info";

static TRACING: OnceCell<()> = OnceCell::new();
static RECORDER: OnceCell<PrometheusHandle> = OnceCell::new();

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    log_filter: String,
    metrics_listener: Option<SocketAddr>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            metrics_listener: None,
        }
    }
}

impl TelemetryConfig {
    /// Reads `<PREFIX>_LOG_FILTER` and `<PREFIX>_METRICS_ADDRESS`. Both are
    /// optional; a malformed listener address is rejected here rather than
    /// when the exporter starts.
    pub fn from_env(prefix: &str) -> Result<Self, TelemetryError> {
        let _ = hydrate_env_file();
        let prefix = prefix.trim().to_ascii_uppercase();

        let log_filter = non_blank(&format!("{prefix}_LOG_FILTER"))
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
        let metrics_listener = non_blank(&format!("{prefix}_METRICS_ADDRESS"))
            .map(|raw| {
                raw.trim()
                    .parse::<SocketAddr>()
                    .map_err(|err| TelemetryError::InvalidMetricsAddress(raw, err.to_string()))
            })
            .transpose()?;

        Ok(Self {
            log_filter,
            metrics_listener,
        })
    }

    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    pub fn metrics_listener(&self) -> Option<SocketAddr> {
        self.metrics_listener
    }
}

fn non_blank(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Handle kept by the binary; renders the current Prometheus snapshot.
#[derive(Clone)]
pub struct TelemetryGuard {
    handle: PrometheusHandle,
}

impl TelemetryGuard {
    pub fn render_metrics(&self) -> String {
        self.handle.render()
    }
}

/// Installs the tracing subscriber and the Prometheus recorder. Repeated
/// calls reuse whatever the first call installed.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    TRACING.get_or_try_init(|| {
        let filter = EnvFilter::try_new(config.log_filter())
            .map_err(|err| TelemetryError::InvalidLogFilter(err.to_string()))?;
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init()
            .map_err(|err| TelemetryError::Tracing(err.to_string()))
    })?;

    let handle = RECORDER
        .get_or_try_init(|| {
            let handle = match config.metrics_listener() {
                Some(listener) => serve_metrics(listener)?,
                None => PrometheusBuilder::new()
                    .install_recorder()
                    .map_err(|err| TelemetryError::Metrics(err.to_string()))?,
            };
            describe_metrics();
            Ok::<_, TelemetryError>(handle)
        })?
        .clone();

    Ok(TelemetryGuard { handle })
}

/// Installs the recorder and spawns the scrape endpoint on the current tokio
/// runtime.
fn serve_metrics(listener: SocketAddr) -> Result<PrometheusHandle, TelemetryError> {
    let runtime = Handle::try_current().map_err(|_| TelemetryError::NoRuntime)?;
    let (recorder, exporter) = PrometheusBuilder::new()
        .with_http_listener(listener)
        .build()
        .map_err(|err| TelemetryError::Metrics(err.to_string()))?;
    let handle = recorder.handle();
    metrics::set_global_recorder(recorder)
        .map_err(|err| TelemetryError::Metrics(err.to_string()))?;

    runtime.spawn(async move {
        if let Err(err) = exporter.await {
            error!(error = ?err, "metrics exporter stopped");
        }
    });
    info!(%listener, "serving prometheus metrics");
    Ok(handle)
}

fn describe_metrics() {
    describe_counter!("txwatch_polls_total", "Network polls by result");
    describe_counter!(
        "txwatch_transactions_filtered_total",
        "Fetched transfers dropped before alerting, by reason"
    );
    describe_counter!(
        "txwatch_transactions_emitted_total",
        "Transfers that crossed the USD threshold"
    );
    describe_counter!("txwatch_alerts_total", "Alert deliveries by result");
    describe_counter!(
        "txwatch_telegram_messages_total",
        "Bot API sendMessage calls by message kind and outcome"
    );
    describe_counter!("txwatch_price_refresh_total", "Price feed refreshes by result");
    describe_histogram!(
        "txwatch_cycle_seconds",
        Unit::Seconds,
        "Wall time of one polling cycle"
    );
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid log filter: {0}")]
    InvalidLogFilter(String),
    #[error("failed to install tracing subscriber: {0}")]
    Tracing(String),
    #[error("invalid metrics address `{0}`: {1}")]
    InvalidMetricsAddress(String, String),
    #[error("failed to install metrics recorder: {0}")]
    Metrics(String),
    #[error("metrics listener needs a running tokio runtime")]
    NoRuntime,
}
