//! Domain-level building blocks shared by the monitor and notifier crates:
//! the transaction model, environment configuration, provider and sink
//! seams, and the per-network caches the monitors own.

pub mod config;
pub mod model;
pub mod services;
pub mod sink;
pub mod source;

pub use model::{Network, PriceQuote, RawTransfer, StartupSummary, Transaction};
pub use services::cache::{DuplicateWindow, PriceCache, PriceUnavailable};
pub use sink::{AlertSink, SinkError, SinkResult};
pub use source::{PriceSource, ProviderError, ProviderResult, TransferSource};
