//! Outbound notification seam shared by the orchestrator and its sinks.

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{Network, StartupSummary, Transaction};

pub type SinkResult<T> = Result<T, SinkError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("http error: {0}")]
    Http(String),
    #[error("sink returned status {0}")]
    Status(u16),
    #[error("message rejected: {0}")]
    Rejected(String),
}

/// Operator channel receiving transaction alerts and health notices.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send_transaction_alert(&self, tx: &Transaction) -> SinkResult<()>;
    async fn send_error_notification(&self, message: &str) -> SinkResult<()>;
    /// Sent once when a network that was failing polls successfully again.
    async fn send_recovery_notification(&self, network: Network) -> SinkResult<()>;
    async fn send_startup_notification(&self, summary: &StartupSummary) -> SinkResult<()>;
}
