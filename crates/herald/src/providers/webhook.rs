//! Generic webhook provider (HTTP POST of the channel payload).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, header::HeaderMap};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::provider::Provider;
use crate::retry::{RetryOptions, RetryPolicy, with_retry};

/// Webhook provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Stable provider id, unique within the channel.
    pub id: String,
    /// Target URL.
    pub url: String,
    /// HTTP method (default: POST).
    #[serde(default = "default_method")]
    pub method: String,
    /// Custom headers.
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    /// Authentication.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<WebhookAuth>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Retry policy for the vendor call; absent disables retries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,
}

fn default_method() -> String {
    "POST".to_string()
}

fn default_timeout() -> u64 {
    30
}

/// Webhook authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WebhookAuth {
    /// Bearer token authentication.
    Bearer { token: String },
    /// Basic authentication.
    Basic { username: String, password: String },
    /// Custom header authentication.
    Header { name: String, value: String },
}

/// Generic webhook provider.
pub struct WebhookProvider {
    config: WebhookConfig,
    client: Client,
    retry: RetryOptions,
}

impl WebhookProvider {
    pub fn new(config: WebhookConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        let retry = match &config.retry {
            Some(policy) => RetryOptions::new(policy.clone()),
            None => RetryOptions::new(RetryPolicy {
                max_retries: 0,
                ..RetryPolicy::default()
            }),
        };
        Self {
            config,
            client,
            retry,
        }
    }

    /// Build the request headers.
    fn build_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        for (name, value) in &self.config.headers {
            if let (Ok(name), Ok(value)) = (
                name.parse::<reqwest::header::HeaderName>(),
                value.parse::<reqwest::header::HeaderValue>(),
            ) {
                headers.insert(name, value);
            }
        }

        if let Some(auth) = &self.config.auth {
            match auth {
                WebhookAuth::Bearer { token } => {
                    if let Ok(value) = format!("Bearer {}", token).parse() {
                        headers.insert(reqwest::header::AUTHORIZATION, value);
                    }
                }
                WebhookAuth::Header { name, value } => {
                    if let (Ok(name), Ok(value)) = (
                        name.parse::<reqwest::header::HeaderName>(),
                        value.parse::<reqwest::header::HeaderValue>(),
                    ) {
                        headers.insert(name, value);
                    }
                }
                WebhookAuth::Basic { .. } => {
                    // Handled in the request builder.
                }
            }
        }

        headers
    }

    async fn post_once(&self, payload: &Value) -> Result<String> {
        let mut request = match self.config.method.to_uppercase().as_str() {
            "PUT" => self.client.put(&self.config.url),
            _ => self.client.post(&self.config.url),
        };
        request = request.headers(self.build_headers()).json(payload);

        if let Some(WebhookAuth::Basic { username, password }) = &self.config.auth {
            request = request.basic_auth(username, Some(password));
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(Error::Network {
                status: Some(status.as_u16()),
                message: format!("webhook returned {status}: {body}"),
            });
        }

        // Prefer a vendor-assigned id when the response body carries one.
        let vendor_id = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("id").and_then(Value::as_str).map(str::to_string));
        Ok(vendor_id.unwrap_or_else(|| Uuid::new_v4().to_string()))
    }
}

#[async_trait]
impl Provider for WebhookProvider {
    fn id(&self) -> &str {
        &self.config.id
    }

    async fn send(&self, channel: &str, payload: &Value) -> Result<String> {
        debug!(channel, provider = %self.config.id, url = %self.config.url, "Sending webhook");
        with_retry(&self.retry, || self.post_once(payload)).await
    }
}
