//! Provider-selection strategies.
//!
//! A strategy turns one channel's provider list into a single send decision.
//! Strategies never mutate their provider list; the round-robin cursor is the
//! only cross-call state, and each strategy instance owns its own.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::provider::{DeliveryReceipt, WeightedProvider};

/// Policy for picking which provider(s) to try for one channel send.
#[async_trait]
pub trait SelectionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Perform one channel send against the given providers.
    ///
    /// The dispatcher guarantees a non-empty provider list; strategies still
    /// fail fast on an empty slice rather than panic.
    async fn dispatch(
        &self,
        channel: &str,
        providers: &[WeightedProvider],
        payload: &Value,
    ) -> Result<DeliveryReceipt>;
}

/// Built-in strategy names accepted in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    Fallback,
    #[serde(rename = "roundrobin", alias = "round-robin")]
    RoundRobin,
    NoFallback,
    Weighted,
}

impl StrategyKind {
    /// Explicit construction table, one entry per built-in policy.
    pub fn build(self) -> Arc<dyn SelectionStrategy> {
        match self {
            Self::Fallback => Arc::new(FallbackStrategy),
            Self::RoundRobin => Arc::new(RoundRobinStrategy::new()),
            Self::NoFallback => Arc::new(NoFallbackStrategy),
            Self::Weighted => Arc::new(WeightedStrategy),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fallback => "fallback",
            Self::RoundRobin => "roundrobin",
            Self::NoFallback => "no-fallback",
            Self::Weighted => "weighted",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn empty_providers(channel: &str) -> Error {
    Error::config(format!("channel {channel}: strategy built with no providers"))
}

/// Attach provider attribution to an error that lacks it.
///
/// Cancellation keeps its distinct type so callers can recognize it.
fn attribute(err: Error, provider_id: &str, channel: &str) -> Error {
    match err {
        Error::Provider { .. } | Error::Cancelled => err,
        other => Error::Provider {
            provider_id: provider_id.to_string(),
            channel: channel.to_string(),
            code: "send_failed".to_string(),
            status: other.status_code(),
            message: other.to_string(),
        },
    }
}

/// Try providers strictly in configured order, moving to the next on failure.
///
/// This is the default policy for channels that configure providers without
/// naming a strategy.
pub struct FallbackStrategy;

#[async_trait]
impl SelectionStrategy for FallbackStrategy {
    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn dispatch(
        &self,
        channel: &str,
        providers: &[WeightedProvider],
        payload: &Value,
    ) -> Result<DeliveryReceipt> {
        if providers.is_empty() {
            return Err(empty_providers(channel));
        }

        let mut failures: Vec<(String, Error)> = Vec::new();
        for entry in providers {
            match entry.provider.send(channel, payload).await {
                Ok(id) => {
                    if !failures.is_empty() {
                        debug!(
                            channel,
                            provider = entry.id(),
                            failed_before = failures.len(),
                            "Fallback succeeded after earlier provider failures"
                        );
                    }
                    return Ok(DeliveryReceipt {
                        id,
                        provider_id: entry.id().to_string(),
                    });
                }
                Err(err) => {
                    warn!(channel, provider = entry.id(), error = %err, "Provider failed, trying next");
                    failures.push((entry.id().to_string(), err));
                }
            }
        }

        let Some((last_id, last_err)) = failures.pop() else {
            return Err(empty_providers(channel));
        };
        let mut message = last_err.to_string();
        if !failures.is_empty() {
            let earlier: Vec<String> = failures
                .iter()
                .map(|(id, err)| format!("{id}: {err}"))
                .collect();
            message = format!("{message} (earlier attempts: {})", earlier.join("; "));
        }
        Err(Error::Provider {
            provider_id: last_id,
            channel: channel.to_string(),
            code: "all_providers_failed".to_string(),
            status: last_err.status_code(),
            message,
        })
    }
}

/// Rotate through providers across calls; exactly one attempt per call.
pub struct RoundRobinStrategy {
    cursor: AtomicUsize,
}

impl RoundRobinStrategy {
    pub fn new() -> Self {
        Self {
            cursor: AtomicUsize::new(0),
        }
    }
}

impl Default for RoundRobinStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SelectionStrategy for RoundRobinStrategy {
    fn name(&self) -> &'static str {
        "roundrobin"
    }

    async fn dispatch(
        &self,
        channel: &str,
        providers: &[WeightedProvider],
        payload: &Value,
    ) -> Result<DeliveryReceipt> {
        if providers.is_empty() {
            return Err(empty_providers(channel));
        }

        // fetch_add makes read-and-increment one atomic step, so two
        // concurrent sends never reuse the same slot.
        let slot = self.cursor.fetch_add(1, Ordering::Relaxed) % providers.len();
        let entry = &providers[slot];
        let id = entry
            .provider
            .send(channel, payload)
            .await
            .map_err(|err| attribute(err, entry.id(), channel))?;
        Ok(DeliveryReceipt {
            id,
            provider_id: entry.id().to_string(),
        })
    }
}

/// Always select the first provider; exactly one attempt per call.
///
/// Intended for explicit single-provider testing and debugging setups.
pub struct NoFallbackStrategy;

#[async_trait]
impl SelectionStrategy for NoFallbackStrategy {
    fn name(&self) -> &'static str {
        "no-fallback"
    }

    async fn dispatch(
        &self,
        channel: &str,
        providers: &[WeightedProvider],
        payload: &Value,
    ) -> Result<DeliveryReceipt> {
        let Some(entry) = providers.first() else {
            return Err(empty_providers(channel));
        };
        let id = entry
            .provider
            .send(channel, payload)
            .await
            .map_err(|err| attribute(err, entry.id(), channel))?;
        Ok(DeliveryReceipt {
            id,
            provider_id: entry.id().to_string(),
        })
    }
}

/// Weighted-random draw over strictly-positive weights.
///
/// Zero-weight providers stay out of the draw; they are tried sequentially,
/// in configured order, only as a last resort after the drawn provider fails.
pub struct WeightedStrategy;

#[async_trait]
impl SelectionStrategy for WeightedStrategy {
    fn name(&self) -> &'static str {
        "weighted"
    }

    async fn dispatch(
        &self,
        channel: &str,
        providers: &[WeightedProvider],
        payload: &Value,
    ) -> Result<DeliveryReceipt> {
        if providers.is_empty() {
            return Err(empty_providers(channel));
        }

        let total: f64 = providers
            .iter()
            .filter(|p| p.weight > 0.0)
            .map(|p| p.weight)
            .sum();
        if total <= 0.0 {
            return Err(Error::config(format!(
                "channel {channel}: weighted strategy requires at least one positive weight"
            )));
        }

        let draw = rand::random::<f64>() * total;
        let mut acc = 0.0;
        let mut chosen = None;
        for entry in providers.iter().filter(|p| p.weight > 0.0) {
            acc += entry.weight;
            if draw < acc {
                chosen = Some(entry);
                break;
            }
        }
        // Floating-point accumulation can leave the draw unmatched at the
        // very top of the range; settle on the last positive-weight provider.
        let chosen = match chosen {
            Some(entry) => entry,
            None => match providers.iter().rev().find(|p| p.weight > 0.0) {
                Some(entry) => entry,
                None => return Err(empty_providers(channel)),
            },
        };

        let err = match chosen.provider.send(channel, payload).await {
            Ok(id) => {
                return Ok(DeliveryReceipt {
                    id,
                    provider_id: chosen.id().to_string(),
                });
            }
            Err(err) => err,
        };
        if matches!(err, Error::Cancelled) {
            return Err(err);
        }

        let reserves: Vec<&WeightedProvider> =
            providers.iter().filter(|p| p.weight == 0.0).collect();
        if reserves.is_empty() {
            return Err(attribute(err, chosen.id(), channel));
        }

        warn!(
            channel,
            provider = chosen.id(),
            error = %err,
            reserves = reserves.len(),
            "Weighted pick failed, trying zero-weight reserves"
        );
        let mut last = attribute(err, chosen.id(), channel);
        for entry in reserves {
            match entry.provider.send(channel, payload).await {
                Ok(id) => {
                    return Ok(DeliveryReceipt {
                        id,
                        provider_id: entry.id().to_string(),
                    });
                }
                Err(err) => {
                    if matches!(err, Error::Cancelled) {
                        return Err(err);
                    }
                    last = attribute(err, entry.id(), channel);
                }
            }
        }
        Err(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Provider;
    use serde_json::json;
    use std::sync::atomic::AtomicU32;

    struct StubProvider {
        id: String,
        fail: bool,
        calls: AtomicU32,
    }

    impl StubProvider {
        fn ok(id: &str) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                fail: false,
                calls: AtomicU32::new(0),
            })
        }

        fn failing(id: &str) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                fail: true,
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Provider for StubProvider {
        fn id(&self) -> &str {
            &self.id
        }

        async fn send(&self, channel: &str, _payload: &Value) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(Error::provider(
                    &self.id,
                    channel,
                    "rejected",
                    Some(500),
                    "stub failure",
                ))
            } else {
                Ok(format!("msg-{}", self.id))
            }
        }
    }

    fn entries(providers: &[Arc<StubProvider>]) -> Vec<WeightedProvider> {
        providers
            .iter()
            .map(|p| WeightedProvider::new(p.clone() as Arc<dyn Provider>))
            .collect()
    }

    #[tokio::test]
    async fn fallback_tries_in_order_and_returns_first_success() {
        let a = StubProvider::failing("a");
        let b = StubProvider::ok("b");
        let providers = entries(&[a.clone(), b.clone()]);

        for _ in 0..3 {
            let receipt = FallbackStrategy
                .dispatch("email", &providers, &json!({}))
                .await
                .unwrap();
            assert_eq!(receipt.provider_id, "b");
        }
        assert_eq!(a.calls(), 3);
        assert_eq!(b.calls(), 3);
    }

    #[tokio::test]
    async fn fallback_surfaces_last_provider_on_total_failure() {
        let a = StubProvider::failing("a");
        let b = StubProvider::failing("b");
        let providers = entries(&[a, b]);

        let err = FallbackStrategy
            .dispatch("email", &providers, &json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.provider_id(), Some("b"));
        let message = err.to_string();
        assert!(message.contains("a:"), "earlier attempts missing: {message}");
    }

    #[tokio::test]
    async fn round_robin_rotates_across_calls() {
        let p0 = StubProvider::ok("p0");
        let p1 = StubProvider::ok("p1");
        let p2 = StubProvider::ok("p2");
        let providers = entries(&[p0, p1, p2]);
        let strategy = RoundRobinStrategy::new();

        let mut seen = Vec::new();
        for _ in 0..4 {
            let receipt = strategy
                .dispatch("sms", &providers, &json!({}))
                .await
                .unwrap();
            seen.push(receipt.provider_id);
        }
        assert_eq!(seen, ["p0", "p1", "p2", "p0"]);
    }

    #[tokio::test]
    async fn round_robin_does_not_fail_over() {
        let a = StubProvider::failing("a");
        let b = StubProvider::ok("b");
        let providers = entries(&[a.clone(), b.clone()]);
        let strategy = RoundRobinStrategy::new();

        let err = strategy
            .dispatch("sms", &providers, &json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.provider_id(), Some("a"));
        assert_eq!(b.calls(), 0);
    }

    #[tokio::test]
    async fn no_fallback_only_ever_touches_the_first_provider() {
        let a = StubProvider::failing("a");
        let b = StubProvider::ok("b");
        let providers = entries(&[a.clone(), b.clone()]);

        let err = NoFallbackStrategy
            .dispatch("push", &providers, &json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.provider_id(), Some("a"));
        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 0);
    }

    #[tokio::test]
    async fn weighted_excludes_zero_weight_from_the_draw() {
        let heavy = StubProvider::ok("heavy");
        let zero = StubProvider::ok("zero");
        let providers = vec![
            WeightedProvider::with_weight(heavy.clone() as Arc<dyn Provider>, 3.0),
            WeightedProvider::with_weight(zero.clone() as Arc<dyn Provider>, 0.0),
        ];

        for _ in 0..20 {
            let receipt = WeightedStrategy
                .dispatch("chat", &providers, &json!({}))
                .await
                .unwrap();
            assert_eq!(receipt.provider_id, "heavy");
        }
        assert_eq!(zero.calls(), 0);
    }

    #[tokio::test]
    async fn weighted_uses_zero_weight_reserve_after_failure() {
        let heavy = StubProvider::failing("heavy");
        let reserve = StubProvider::ok("reserve");
        let providers = vec![
            WeightedProvider::with_weight(heavy.clone() as Arc<dyn Provider>, 2.0),
            WeightedProvider::with_weight(reserve.clone() as Arc<dyn Provider>, 0.0),
        ];

        let receipt = WeightedStrategy
            .dispatch("chat", &providers, &json!({}))
            .await
            .unwrap();
        assert_eq!(receipt.provider_id, "reserve");
        assert_eq!(heavy.calls(), 1);
    }

    #[tokio::test]
    async fn weighted_rejects_all_zero_weights() {
        let a = StubProvider::ok("a");
        let providers = vec![WeightedProvider::with_weight(
            a as Arc<dyn Provider>,
            0.0,
        )];

        let err = WeightedStrategy
            .dispatch("chat", &providers, &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[tokio::test]
    async fn strategies_fail_fast_on_empty_providers() {
        for strategy in [
            StrategyKind::Fallback.build(),
            StrategyKind::RoundRobin.build(),
            StrategyKind::NoFallback.build(),
            StrategyKind::Weighted.build(),
        ] {
            let err = strategy.dispatch("email", &[], &json!({})).await.unwrap_err();
            assert!(matches!(err, Error::Configuration(_)), "{}", strategy.name());
        }
    }

    #[test]
    fn strategy_kind_parses_config_names() {
        for (name, kind) in [
            ("\"fallback\"", StrategyKind::Fallback),
            ("\"roundrobin\"", StrategyKind::RoundRobin),
            ("\"round-robin\"", StrategyKind::RoundRobin),
            ("\"no-fallback\"", StrategyKind::NoFallback),
            ("\"weighted\"", StrategyKind::Weighted),
        ] {
            let parsed: StrategyKind = serde_json::from_str(name).unwrap();
            assert_eq!(parsed, kind);
        }
        assert!(serde_json::from_str::<StrategyKind>("\"best-effort\"").is_err());
    }
}
