//! Dispatcher: fans one notification out across channels and folds the
//! per-channel outcomes into a single aggregate status.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::DEFAULT_CHANNELS;
use crate::error::{Error, Result};
use crate::provider::{DeliveryReceipt, WeightedProvider};
use crate::providers::LoggerProvider;
use crate::request::{
    ChannelDelivery, DispatchStatus, NotificationRequest, NotificationStatus,
};
use crate::strategy::{SelectionStrategy, StrategyKind};

/// Per-channel outcome; the atomic unit folded into the aggregate.
///
/// Either `id` is set (delivered) or `error` is set (failed); never both,
/// never neither.
#[derive(Debug)]
struct ChannelSendResult {
    channel: String,
    provider_id: Option<String>,
    id: Option<String>,
    error: Option<Error>,
}

impl ChannelSendResult {
    fn delivered(channel: &str, receipt: DeliveryReceipt) -> Self {
        Self {
            channel: channel.to_string(),
            provider_id: Some(receipt.provider_id),
            id: Some(receipt.id),
            error: None,
        }
    }

    fn failed(channel: &str, provider_id: Option<String>, error: Error) -> Self {
        Self {
            channel: channel.to_string(),
            provider_id,
            id: None,
            error: Some(error),
        }
    }
}

/// Memoized sender for one channel: the channel's strategy applied to its
/// provider list, built once at dispatcher construction.
struct ChannelSender {
    channel: String,
    providers: Vec<WeightedProvider>,
    strategy: Arc<dyn SelectionStrategy>,
}

impl ChannelSender {
    async fn send(&self, request: &NotificationRequest) -> ChannelSendResult {
        let payload = request.merged_payload(&self.channel);
        let payload = match &request.customize {
            Some(hook) => match hook.apply(&self.channel, payload).await {
                Ok(payload) => payload,
                Err(err) => return ChannelSendResult::failed(&self.channel, None, err),
            },
            None => payload,
        };

        match self
            .strategy
            .dispatch(&self.channel, &self.providers, &payload)
            .await
        {
            Ok(receipt) => {
                debug!(
                    channel = %self.channel,
                    provider = %receipt.provider_id,
                    "Channel delivered"
                );
                ChannelSendResult::delivered(&self.channel, receipt)
            }
            Err(err) => {
                let provider_id = err.provider_id().map(str::to_string);
                ChannelSendResult::failed(&self.channel, provider_id, err)
            }
        }
    }
}

/// The dispatch engine.
///
/// Immutable after construction: channel senders are memoized once, provider
/// lists and strategies never change at runtime.
pub struct Dispatcher {
    channels: Vec<String>,
    senders: HashMap<String, ChannelSender>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("channels", &self.channels)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// Known channel names, in registration order.
    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    /// Fan the request out to every known channel it addresses.
    ///
    /// All channel sends run concurrently; one channel's failure never
    /// cancels another's in-flight call. Channel failures never surface as
    /// an error here, only through the aggregate.
    pub async fn send(&self, request: &NotificationRequest) -> NotificationStatus {
        let targets: Vec<&String> = self
            .channels
            .iter()
            .filter(|channel| request.payloads.contains_key(channel.as_str()))
            .collect();
        debug!(id = ?request.id, channels = targets.len(), "Dispatching notification");

        let sends = targets.into_iter().map(|channel| async move {
            match self.senders.get(channel) {
                Some(sender) => sender.send(request).await,
                None => ChannelSendResult::failed(
                    channel,
                    None,
                    Error::config(format!("no sender configured for channel {channel}")),
                ),
            }
        });

        aggregate(join_all(sends).await)
    }
}

/// Fold per-channel outcomes into the aggregate. Errors are flattened to
/// strings here and nowhere else.
fn aggregate(outcomes: Vec<ChannelSendResult>) -> NotificationStatus {
    let mut status = NotificationStatus {
        status: DispatchStatus::Success,
        channels: HashMap::new(),
        errors: HashMap::new(),
    };

    for outcome in outcomes {
        if let Some(err) = outcome.error {
            status.status = DispatchStatus::Error;
            status.errors.insert(outcome.channel.clone(), err.to_message());
        }
        status.channels.insert(
            outcome.channel,
            ChannelDelivery {
                id: outcome.id,
                provider_id: outcome.provider_id,
            },
        );
    }

    status
}

/// Builder for [`Dispatcher`].
///
/// Channels listed in [`DEFAULT_CHANNELS`] are known from the start; custom
/// channel names must be registered before providers or strategies can be
/// attached to them.
pub struct DispatcherBuilder {
    channels: Vec<String>,
    providers: HashMap<String, Vec<WeightedProvider>>,
    strategies: HashMap<String, Arc<dyn SelectionStrategy>>,
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self {
            channels: DEFAULT_CHANNELS.iter().map(|c| c.to_string()).collect(),
            providers: HashMap::new(),
            strategies: HashMap::new(),
        }
    }

    /// Register a custom channel name beyond the default set.
    pub fn register_channel(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.channels.contains(&name) {
            self.channels.push(name);
        }
        self
    }

    /// Configure the provider list for one channel.
    pub fn providers(
        mut self,
        channel: impl Into<String>,
        providers: Vec<WeightedProvider>,
    ) -> Self {
        self.providers.insert(channel.into(), providers);
        self
    }

    /// Pick a built-in strategy for one channel.
    pub fn strategy(self, channel: impl Into<String>, kind: StrategyKind) -> Self {
        self.custom_strategy(channel, kind.build())
    }

    /// Install a caller-supplied strategy implementation for one channel.
    pub fn custom_strategy(
        mut self,
        channel: impl Into<String>,
        strategy: Arc<dyn SelectionStrategy>,
    ) -> Self {
        self.strategies.insert(channel.into(), strategy);
        self
    }

    /// Validate the configuration and memoize one sender per configured
    /// channel. Configuration problems surface here, never from `send`.
    pub fn build(self) -> Result<Dispatcher> {
        for channel in self.providers.keys().chain(self.strategies.keys()) {
            if !self.channels.contains(channel) {
                return Err(Error::config(format!(
                    "unknown channel {channel}: register it before configuring providers"
                )));
            }
        }

        let mut senders = HashMap::new();
        for channel in &self.channels {
            let configured =
                self.providers.contains_key(channel) || self.strategies.contains_key(channel);
            if !configured {
                continue;
            }

            let providers = self.providers.get(channel).cloned().unwrap_or_default();
            let strategy = self.strategies.get(channel).cloned();

            // A configured channel with no providers gets the built-in logger
            // so the engine stays usable without any vendor credentials.
            let (providers, strategy) = if providers.is_empty() {
                warn!(
                    channel = %channel,
                    "No providers configured, falling back to the logger provider"
                );
                (
                    vec![WeightedProvider::new(Arc::new(LoggerProvider::default()))],
                    StrategyKind::NoFallback.build(),
                )
            } else {
                (
                    providers,
                    strategy.unwrap_or_else(|| StrategyKind::Fallback.build()),
                )
            };

            senders.insert(
                channel.clone(),
                ChannelSender {
                    channel: channel.clone(),
                    providers,
                    strategy,
                },
            );
        }

        info!(channels = senders.len(), "Dispatcher initialized");
        Ok(Dispatcher {
            channels: self.channels,
            senders,
        })
    }
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}
