//! Built-in logging provider.

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::error::Result;
use crate::provider::Provider;

/// Logs the payload instead of delivering it.
///
/// This is the fallback the dispatcher installs for channels configured
/// without providers, keeping the engine usable with zero vendor
/// credentials. Its id makes logger-handled sends distinguishable in the
/// aggregate result.
#[derive(Debug, Clone)]
pub struct LoggerProvider {
    id: String,
}

impl LoggerProvider {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl Default for LoggerProvider {
    fn default() -> Self {
        Self::new("logger")
    }
}

#[async_trait]
impl Provider for LoggerProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send(&self, channel: &str, payload: &Value) -> Result<String> {
        let message_id = Uuid::new_v4().to_string();
        info!(channel, message_id = %message_id, payload = %payload, "Logger provider delivery");
        Ok(message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn returns_a_fresh_message_id_per_send() {
        let provider = LoggerProvider::default();
        assert_eq!(provider.id(), "logger");

        let first = provider.send("email", &json!({"to": "a@b.c"})).await.unwrap();
        let second = provider.send("email", &json!({"to": "a@b.c"})).await.unwrap();
        assert_ne!(first, second);
    }
}
