//! Serde configuration layer.
//!
//! Mirrors the dispatcher's construction inputs as plain data so a whole
//! engine can be built from one JSON document. Provider construction goes
//! through an explicit tagged-enum table, one variant per vendor.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dispatcher::{Dispatcher, DispatcherBuilder};
use crate::error::{Error, Result};
use crate::provider::{Provider, WeightedProvider};
use crate::providers::{
    DiscordConfig, DiscordProvider, LoggerProvider, TelegramConfig, TelegramProvider,
    WebhookConfig, WebhookProvider,
};
use crate::strategy::StrategyKind;

/// Top-level dispatch configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Channel name -> channel settings. Names outside the default set are
    /// registered as custom channels.
    #[serde(default)]
    pub channels: HashMap<String, ChannelSettings>,
}

/// Settings for one channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelSettings {
    /// Selection strategy; defaults to fallback when providers are present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<StrategyKind>,
    #[serde(default)]
    pub providers: Vec<ProviderEntry>,
}

/// One provider plus its selection weight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    /// Relative selection weight, used by the weighted strategy.
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(flatten)]
    pub provider: ProviderConfig,
}

fn default_weight() -> f64 {
    1.0
}

/// Construction table mapping a type tag to a provider constructor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    /// Built-in logging provider.
    Logger {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    /// Generic webhook (HTTP POST).
    Webhook(WebhookConfig),
    /// Discord webhook.
    Discord(DiscordConfig),
    /// Telegram Bot API.
    Telegram(TelegramConfig),
}

impl ProviderConfig {
    pub fn build(&self) -> Arc<dyn Provider> {
        match self {
            Self::Logger { id } => match id {
                Some(id) => Arc::new(LoggerProvider::new(id.clone())),
                None => Arc::new(LoggerProvider::default()),
            },
            Self::Webhook(c) => Arc::new(WebhookProvider::new(c.clone())),
            Self::Discord(c) => Arc::new(DiscordProvider::new(c.clone())),
            Self::Telegram(c) => Arc::new(TelegramProvider::new(c.clone())),
        }
    }
}

impl DispatchConfig {
    /// Validate the configuration and construct the dispatcher.
    ///
    /// All configuration problems surface here; `send` never raises them.
    pub fn build(self) -> Result<Dispatcher> {
        let mut builder = DispatcherBuilder::new();
        for name in self.channels.keys() {
            builder = builder.register_channel(name.clone());
        }

        for (name, settings) in self.channels {
            let mut providers = Vec::with_capacity(settings.providers.len());
            for entry in &settings.providers {
                if entry.weight < 0.0 || !entry.weight.is_finite() {
                    return Err(Error::config(format!(
                        "channel {name}: provider weight must be a finite non-negative number, got {}",
                        entry.weight
                    )));
                }
                providers.push(WeightedProvider::with_weight(
                    entry.provider.build(),
                    entry.weight,
                ));
            }

            builder = builder.providers(name.clone(), providers);
            if let Some(kind) = settings.strategy {
                builder = builder.strategy(name, kind);
            }
        }

        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn full_config_parses_and_builds() {
        let config: DispatchConfig = serde_json::from_value(json!({
            "channels": {
                "email": {
                    "strategy": "fallback",
                    "providers": [
                        {"type": "webhook", "id": "primary", "url": "https://example.com/a"},
                        {"type": "webhook", "id": "backup", "url": "https://example.com/b"}
                    ]
                },
                "chat": {
                    "strategy": "weighted",
                    "providers": [
                        {"type": "discord", "id": "dc", "webhook_url": "https://example.com/d", "weight": 2.0},
                        {"type": "telegram", "id": "tg", "bot_token": "1:A", "chat_id": "9", "weight": 0.0}
                    ]
                },
                "sms": {
                    "providers": [{"type": "logger"}]
                }
            }
        }))
        .unwrap();

        let dispatcher = config.build().unwrap();
        assert!(dispatcher.channels().contains(&"email".to_string()));
        assert!(dispatcher.channels().contains(&"chat".to_string()));
    }

    #[test]
    fn custom_channel_names_are_registered() {
        let config: DispatchConfig = serde_json::from_value(json!({
            "channels": {
                "matrix": {
                    "providers": [{"type": "logger", "id": "matrix-log"}]
                }
            }
        }))
        .unwrap();

        let dispatcher = config.build().unwrap();
        assert!(dispatcher.channels().contains(&"matrix".to_string()));
    }

    #[test]
    fn unknown_provider_type_is_rejected() {
        let result = serde_json::from_value::<DispatchConfig>(json!({
            "channels": {
                "email": {
                    "providers": [{"type": "carrier-pigeon", "id": "p"}]
                }
            }
        }));
        assert!(result.is_err());
    }

    #[test]
    fn negative_weight_is_a_configuration_error() {
        let config: DispatchConfig = serde_json::from_value(json!({
            "channels": {
                "email": {
                    "providers": [{"type": "logger", "weight": -1.0}]
                }
            }
        }))
        .unwrap();

        let err = config.build().unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn default_weight_is_one() {
        let entry: ProviderEntry =
            serde_json::from_value(json!({"type": "logger"})).unwrap();
        assert_eq!(entry.weight, 1.0);
    }

    #[test]
    fn retry_policy_is_parsed_from_provider_config() {
        let config: WebhookConfig = serde_json::from_value(json!({
            "id": "hook",
            "url": "https://example.com",
            "retry": {"max_retries": 5, "base_delay_ms": 100}
        }))
        .unwrap();
        let retry = config.retry.unwrap();
        assert_eq!(retry.max_retries, 5);
        assert_eq!(retry.base_delay_ms, 100);
        // Unspecified knobs keep their defaults.
        assert_eq!(retry.max_delay_ms, 30_000);
    }
}
