//! Provider capability boundary.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Receipt for one delivered channel send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// Vendor-assigned message identifier.
    pub id: String,
    /// Provider that performed the send.
    pub provider_id: String,
}

/// A configured vendor integration capable of sending one channel's payload.
///
/// Providers are created once at dispatcher construction and are immutable
/// for its lifetime; all per-call state lives on the call stack.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable, human-readable identifier, unique within a channel.
    fn id(&self) -> &str;

    /// Deliver one channel payload; returns the vendor message identifier.
    async fn send(&self, channel: &str, payload: &Value) -> Result<String>;
}

/// Provider plus its relative selection weight.
///
/// Weights are relative and normalized at selection time; a zero weight keeps
/// the provider out of the weighted draw entirely.
#[derive(Clone)]
pub struct WeightedProvider {
    pub provider: Arc<dyn Provider>,
    pub weight: f64,
}

impl WeightedProvider {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            weight: 1.0,
        }
    }

    pub fn with_weight(provider: Arc<dyn Provider>, weight: f64) -> Self {
        Self { provider, weight }
    }

    pub fn id(&self) -> &str {
        self.provider.id()
    }
}

impl std::fmt::Debug for WeightedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeightedProvider")
            .field("id", &self.id())
            .field("weight", &self.weight)
            .finish()
    }
}
