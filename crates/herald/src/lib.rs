//! Multichannel notification dispatch engine.
//!
//! One logical notification can address several channels (email, SMS, push,
//! voice, web push, chat webhooks) at once. The dispatcher fans the request
//! out across those channels concurrently, each channel picks a live provider
//! according to its configured selection strategy, individual vendor calls can
//! retry under transient failure, and all per-channel outcomes fold into a
//! single aggregate status with partial-failure semantics.
//!
//! Entry points:
//! - [`Dispatcher`] / [`DispatcherBuilder`] for programmatic construction
//! - [`DispatchConfig`] for serde-driven construction
//! - [`retry::with_retry`] for provider-internal retry of one vendor call

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod provider;
pub mod providers;
pub mod request;
pub mod retry;
pub mod strategy;

pub use config::{ChannelSettings, DispatchConfig, ProviderConfig, ProviderEntry};
pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use error::{Error, Result};
pub use provider::{DeliveryReceipt, Provider, WeightedProvider};
pub use request::{
    ChannelDelivery, Customize, DispatchStatus, NotificationRequest, NotificationStatus,
};
pub use retry::{RetryAttemptInfo, RetryContext, RetryOptions, RetryPolicy, with_retry};
pub use strategy::{SelectionStrategy, StrategyKind};

/// Channels every dispatcher knows about without explicit registration.
pub const DEFAULT_CHANNELS: &[&str] = &["email", "sms", "push", "voice", "webpush", "chat"];
