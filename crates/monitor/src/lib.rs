//! Monitoring engine: provider adapters, per-network monitors and the
//! orchestrator that polls them and forwards alerts. The `txwatch-monitor`
//! binary in `main.rs` wires these to the Telegram sink.

pub mod monitor;
pub mod pipeline;
pub mod providers;
pub mod worker;

pub use monitor::{build_network_monitor, MonitorPhase, NetworkMonitor, PollingMonitor};
pub use providers::{
    build_http_client, CoinGeckoPriceSource, GraphQlSource, SubscanSource, TonCenterSource,
};
pub use worker::{CycleReport, MonitorError, Orchestrator, OrchestratorSettings};
