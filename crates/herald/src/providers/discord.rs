//! Discord webhook provider.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::provider::Provider;
use crate::retry::{RetryOptions, RetryPolicy, with_retry};

/// Discord provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    /// Stable provider id, unique within the channel.
    pub id: String,
    /// Discord webhook URL.
    pub webhook_url: String,
    /// Optional username for the webhook.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Optional avatar URL for the webhook.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    /// Retry policy for the vendor call; absent disables retries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,
}

/// Discord webhook provider for chat-style channels.
pub struct DiscordProvider {
    config: DiscordConfig,
    client: Client,
    retry: RetryOptions,
}

impl DiscordProvider {
    pub fn new(config: DiscordConfig) -> Self {
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

    /// Build the webhook body from the channel payload.
    ///
    /// A `title`/`body` pair becomes an embed; otherwise `content` (or the
    /// whole payload, stringified) is sent as plain message content.
    fn build_body(&self, payload: &Value) -> Value {
        let mut body = match (payload.get("title"), payload.get("body")) {
            (Some(title), Some(text)) => json!({
                "embeds": [{
                    "title": title,
                    "description": text,
                }]
            }),
            _ => {
                let content = payload
                    .get("content")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| payload.to_string());
                json!({ "content": content })
            }
        };

        if let Some(username) = &self.config.username {
            body["username"] = json!(username);
        }
        if let Some(avatar_url) = &self.config.avatar_url {
            body["avatar_url"] = json!(avatar_url);
        }

        body
    }

    async fn post_once(&self, body: &Value) -> Result<String> {
        // `wait=true` makes Discord return the created message object.
        let response = self
            .client
            .post(&self.config.webhook_url)
            .query(&[("wait", "true")])
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(Error::Network {
                status: Some(status.as_u16()),
                message: format!("discord webhook returned {status}: {text}"),
            });
        }

        let message_id = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| v.get("id").and_then(Value::as_str).map(str::to_string));
        Ok(message_id.unwrap_or_else(|| Uuid::new_v4().to_string()))
    }
}

#[async_trait]
impl Provider for DiscordProvider {
    fn id(&self) -> &str {
        &self.config.id
    }

    async fn send(&self, channel: &str, payload: &Value) -> Result<String> {
        debug!(channel, provider = %self.config.id, "Sending Discord webhook");
        let body = self.build_body(payload);
        with_retry(&self.retry, || self.post_once(&body)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(username: Option<&str>) -> DiscordProvider {
        DiscordProvider::new(DiscordConfig {
            id: "discord".to_string(),
            webhook_url: "https://example.com/hook".to_string(),
            username: username.map(str::to_string),
            avatar_url: None,
            retry: None,
        })
    }

    #[test]
    fn title_and_body_become_an_embed() {
        let body = provider(None).build_body(&json!({"title": "Hi", "body": "there"}));
        assert_eq!(body["embeds"][0]["title"], "Hi");
        assert_eq!(body["embeds"][0]["description"], "there");
    }

    #[test]
    fn content_falls_back_to_plain_message() {
        let body = provider(None).build_body(&json!({"content": "ping"}));
        assert_eq!(body["content"], "ping");
    }

    #[test]
    fn username_is_attached_when_configured() {
        let body = provider(Some("herald")).build_body(&json!({"content": "ping"}));
        assert_eq!(body["username"], "herald");
    }
}
