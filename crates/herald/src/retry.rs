//! Retry-with-backoff executor for individual vendor calls.
//!
//! Wraps one async operation with bounded retries, exponential backoff,
//! jitter, and cooperative cancellation. Providers use this around their own
//! vendor call; selection strategies never retry through this path.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::RngExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{Error, Result};

/// Status codes retried when no `should_retry` predicate is supplied.
pub const DEFAULT_RETRYABLE_STATUS_CODES: &[u16] = &[408, 429, 500, 502, 503, 504];

/// Serializable retry knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum retries after the initial attempt; 0 disables retries.
    pub max_retries: u32,
    /// Base delay; retry `n` waits `min(max_delay, base_delay * 2^(n-1))`.
    pub base_delay_ms: u64,
    /// Cap applied to the exponential term, before jitter.
    pub max_delay_ms: u64,
    /// When true, adds `random(0, max_jitter)` after the cap, so the total
    /// delay can slightly exceed `max_delay`.
    pub jitter: bool,
    pub max_jitter_ms: u64,
    /// Status codes eligible for retry.
    pub retryable_status_codes: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            jitter: true,
            max_jitter_ms: 1000,
            retryable_status_codes: DEFAULT_RETRYABLE_STATUS_CODES.to_vec(),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry `n` (1-based), jitter included.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1);
        let multiplier = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
        let backoff = self
            .base_delay_ms
            .saturating_mul(multiplier)
            .min(self.max_delay_ms);

        let jitter = if self.jitter && self.max_jitter_ms > 0 {
            rand::rng().random_range(0..self.max_jitter_ms)
        } else {
            0
        };

        Duration::from_millis(backoff.saturating_add(jitter))
    }

    fn status_is_retryable(&self, status: u16) -> bool {
        self.retryable_status_codes.contains(&status)
    }
}

/// Snapshot handed to a `should_retry` predicate.
pub struct RetryContext<'a> {
    /// Attempt that just failed (1-based; 1 is the initial attempt).
    pub attempt: u32,
    pub error: &'a Error,
    pub status: Option<u16>,
}

/// Snapshot handed to the `on_retry` hook just before the wait.
pub struct RetryAttemptInfo<'a> {
    /// Retry about to run (1-based).
    pub retry: u32,
    pub max_retries: u32,
    pub delay: Duration,
    pub error: &'a Error,
}

pub type ShouldRetry = Arc<dyn Fn(&RetryContext<'_>) -> bool + Send + Sync>;
pub type OnRetry = Arc<dyn Fn(&RetryAttemptInfo<'_>) + Send + Sync>;

/// Full retry configuration: serializable policy plus runtime hooks.
#[derive(Clone, Default)]
pub struct RetryOptions {
    pub policy: RetryPolicy,
    /// Overrides the status-code table when present.
    pub should_retry: Option<ShouldRetry>,
    /// Observability hook, invoked before each wait.
    pub on_retry: Option<OnRetry>,
    /// Checked before each attempt and during every wait.
    pub cancellation: Option<CancellationToken>,
}

impl RetryOptions {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            ..Default::default()
        }
    }

    pub fn with_should_retry(mut self, predicate: ShouldRetry) -> Self {
        self.should_retry = Some(predicate);
        self
    }

    pub fn with_on_retry(mut self, hook: OnRetry) -> Self {
        self.on_retry = Some(hook);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    fn is_retryable(&self, attempt: u32, error: &Error) -> bool {
        // Cancellation always wins over any predicate or status table.
        if matches!(error, Error::Cancelled) {
            return false;
        }
        let status = error.status_code();
        if let Some(predicate) = &self.should_retry {
            return predicate(&RetryContext {
                attempt,
                error,
                status,
            });
        }
        match status {
            Some(code) => self.policy.status_is_retryable(code),
            // No status at all (e.g. connection reset): retry by default.
            None => true,
        }
    }
}

impl std::fmt::Debug for RetryOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryOptions")
            .field("policy", &self.policy)
            .field("should_retry", &self.should_retry.is_some())
            .field("on_retry", &self.on_retry.is_some())
            .field("cancellation", &self.cancellation.is_some())
            .finish()
    }
}

/// Execute `operation` with bounded retries.
///
/// The last error propagates unchanged once retries are exhausted or the
/// error is ineligible. A triggered cancellation token aborts before the
/// first attempt and interrupts any wait with [`Error::Cancelled`].
pub async fn with_retry<F, Fut, T>(options: &RetryOptions, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        if let Some(token) = &options.cancellation
            && token.is_cancelled()
        {
            return Err(Error::Cancelled);
        }

        attempt += 1;
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        let retries_used = attempt - 1;
        if retries_used >= options.policy.max_retries || !options.is_retryable(attempt, &err) {
            return Err(err);
        }

        let retry = retries_used + 1;
        let delay = options.policy.delay_for_retry(retry);
        if let Some(hook) = &options.on_retry {
            hook(&RetryAttemptInfo {
                retry,
                max_retries: options.policy.max_retries,
                delay,
                error: &err,
            });
        }
        warn!(
            retry,
            max = options.policy.max_retries,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Retrying after transient failure"
        );

        match &options.cancellation {
            Some(token) => {
                tokio::select! {
                    _ = token.cancelled() => return Err(Error::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            None => tokio::time::sleep(delay).await,
        }
    }
}
