//! Monitor binary: polls every configured network and posts large transfers
//! to Telegram until interrupted.

use std::{io, sync::Arc};

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use txwatch_domain::config::{ConfigError, MonitorConfig, TelegramConfig};
use txwatch_domain::services::telemetry::{init_telemetry, TelemetryConfig, TelemetryError};
use txwatch_monitor::{build_http_client, build_network_monitor, Orchestrator, OrchestratorSettings};
use txwatch_notifier::TelegramSink;

#[tokio::main]
async fn main() -> io::Result<()> {
    if let Err(err) = bootstrap().await {
        eprintln!("[monitor] bootstrap failed: {err}");
        return Err(io::Error::other(err.to_string()));
    }

    Ok(())
}

async fn bootstrap() -> Result<(), BootstrapError> {
    let telemetry = init_telemetry(&TelemetryConfig::from_env("MONITOR")?)?;
    let config = MonitorConfig::load_from_env()?;
    let telegram = TelegramConfig::load_from_env()?;

    let client = build_http_client(config.http_timeout())?;
    let monitors = config
        .networks()
        .iter()
        .map(|network| build_network_monitor(*network, &client, &config))
        .collect();
    let sink = Arc::new(TelegramSink::new(client, &telegram));
    let settings = OrchestratorSettings {
        interval: config.poll_interval(),
        alert_spacing: config.alert_spacing(),
        shutdown_grace: config.shutdown_grace(),
    };
    let mut orchestrator = Orchestrator::new(monitors, sink, settings);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    orchestrator.run_forever(config.min_usd(), shutdown_rx).await;
    debug!(metrics = %telemetry.render_metrics(), "final metrics snapshot");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[derive(Debug, Error)]
enum BootstrapError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
}
