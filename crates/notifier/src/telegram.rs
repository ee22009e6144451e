use async_trait::async_trait;
use metrics::counter;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use txwatch_domain::config::TelegramConfig;
use txwatch_domain::{AlertSink, Network, SinkError, SinkResult, StartupSummary, Transaction};

use crate::format;

const DEFAULT_API_URL: &str = "https://api.telegram.org";

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

#[derive(Debug, Deserialize)]
struct BotApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Posts HTML messages to one chat through the Telegram Bot API.
pub struct TelegramSink {
    client: Client,
    send_url: String,
    chat_id: String,
}

impl TelegramSink {
    pub fn new(client: Client, config: &TelegramConfig) -> Self {
        let base = config
            .api_url()
            .unwrap_or(DEFAULT_API_URL)
            .trim_end_matches('/');
        Self {
            client,
            send_url: format!("{base}/bot{}/sendMessage", config.bot_token()),
            chat_id: config.chat_id().to_string(),
        }
    }

    async fn send_html(&self, kind: &'static str, text: &str) -> SinkResult<()> {
        let payload = SendMessage {
            chat_id: &self.chat_id,
            text,
            parse_mode: "HTML",
            disable_web_page_preview: true,
        };

        let result = self.post(&payload).await;
        let outcome = if result.is_ok() { "sent" } else { "failed" };
        counter!("txwatch_telegram_messages_total", "kind" => kind, "outcome" => outcome).increment(1);
        match &result {
            Ok(()) => debug!(kind, "telegram message delivered"),
            Err(err) => warn!(kind, error = %err, "telegram delivery failed"),
        }
        result
    }

    async fn post(&self, payload: &SendMessage<'_>) -> SinkResult<()> {
        let response = self
            .client
            .post(&self.send_url)
            .json(payload)
            .send()
            .await
            .map_err(|err| SinkError::Http(err.without_url().to_string()))?;

        let status = response.status();
        // The Bot API explains most 4xx responses in the body.
        match response.json::<BotApiResponse>().await {
            Ok(body) => check_reply(status.as_u16(), body),
            Err(_) if !status.is_success() => Err(SinkError::Status(status.as_u16())),
            Err(err) => Err(SinkError::Http(err.without_url().to_string())),
        }
    }
}

fn check_reply(status: u16, body: BotApiResponse) -> SinkResult<()> {
    if body.ok {
        return Ok(());
    }
    match body.description {
        Some(description) => Err(SinkError::Rejected(description)),
        None => Err(SinkError::Status(status)),
    }
}

#[async_trait]
impl AlertSink for TelegramSink {
    async fn send_transaction_alert(&self, tx: &Transaction) -> SinkResult<()> {
        self.send_html("transaction", &format::transaction_message(tx))
            .await
    }

    async fn send_error_notification(&self, message: &str) -> SinkResult<()> {
        self.send_html("error", &format::error_message(message)).await
    }

    async fn send_recovery_notification(&self, network: Network) -> SinkResult<()> {
        self.send_html("recovery", &format::recovery_message(network))
            .await
    }

    async fn send_startup_notification(&self, summary: &StartupSummary) -> SinkResult<()> {
        self.send_html("startup", &format::startup_message(summary))
            .await
    }
}
