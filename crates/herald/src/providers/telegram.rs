//! Telegram Bot API provider.
//!
//! Sends messages via `POST /bot<token>/sendMessage` and returns the
//! `result.message_id` assigned by Telegram.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::error::{Error, Result};
use crate::provider::Provider;
use crate::retry::{RetryOptions, RetryPolicy, with_retry};

/// Telegram `sendMessage` text limit (UTF-8 characters).
const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

/// Telegram provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Stable provider id, unique within the channel.
    pub id: String,
    /// Telegram Bot API token.
    pub bot_token: String,
    /// Target chat ID (user, group, or channel).
    pub chat_id: String,
    /// Parse mode for message formatting (HTML, Markdown, MarkdownV2).
    #[serde(default = "default_parse_mode")]
    pub parse_mode: String,
    /// Retry policy for the vendor call; absent disables retries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,
}

fn default_parse_mode() -> String {
    "HTML".to_string()
}

/// Telegram Bot API provider.
pub struct TelegramProvider {
    config: TelegramConfig,
    client: Client,
    retry: RetryOptions,
}

impl TelegramProvider {
    pub fn new(config: TelegramConfig) -> Self {
        let retry = match &config.retry {
            Some(policy) => RetryOptions::new(policy.clone()),
            None => RetryOptions::new(RetryPolicy {
                max_retries: 0,
                ..RetryPolicy::default()
            }),
        };
        Self {
            config,
            client: Client::new(),
            retry,
        }
    }

    /// Build the message text from the channel payload.
    fn build_text(&self, payload: &Value) -> String {
        let text = match (
            payload.get("title").and_then(Value::as_str),
            payload.get("body").and_then(Value::as_str),
        ) {
            (Some(title), Some(body)) if self.config.parse_mode == "HTML" => {
                format!("<b>{title}</b>\n\n{body}")
            }
            (Some(title), Some(body)) => format!("*{title}*\n\n{body}"),
            _ => payload
                .get("text")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| payload.to_string()),
        };
        truncate_message(&text, TELEGRAM_MESSAGE_LIMIT)
    }

    async fn send_once(&self, channel: &str, body: &Value) -> Result<String> {
        let url = format!(
            "https://api.telegram.org/bot{}/sendMessage",
            self.config.bot_token
        );
        let response = self.client.post(&url).json(body).send().await?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(Error::Network {
                status: Some(status.as_u16()),
                message: format!("telegram sendMessage returned {status}: {text}"),
            });
        }

        let message_id = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| v.get("result")?.get("message_id")?.as_i64())
            .map(|id| id.to_string());
        message_id.ok_or_else(|| {
            Error::provider(
                &self.config.id,
                channel,
                "malformed_response",
                Some(status.as_u16()),
                "telegram response carried no message_id",
            )
        })
    }
}

#[async_trait]
impl Provider for TelegramProvider {
    fn id(&self) -> &str {
        &self.config.id
    }

    async fn send(&self, channel: &str, payload: &Value) -> Result<String> {
        debug!(channel, provider = %self.config.id, "Sending Telegram message");
        let body = json!({
            "chat_id": self.config.chat_id,
            "text": self.build_text(payload),
            "parse_mode": self.config.parse_mode,
        });
        with_retry(&self.retry, || self.send_once(channel, &body)).await
    }
}

/// Truncate a message to fit within the Telegram character limit.
fn truncate_message(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let suffix = "\n\n[truncated]";
    let budget = limit - suffix.len();
    let truncated: String = text.chars().take(budget).collect();
    format!("{truncated}{suffix}")
}
