//! Built-in providers.
//!
//! The engine treats vendor wire formats as pluggable; this module ships a
//! small set behind the [`Provider`](crate::provider::Provider) capability:
//! - Logger (the no-vendor fallback)
//! - Generic webhooks (HTTP POST)
//! - Discord webhooks
//! - Telegram Bot API

mod discord;
mod logger;
mod telegram;
mod webhook;

pub use discord::{DiscordConfig, DiscordProvider};
pub use logger::LoggerProvider;
pub use telegram::{TelegramConfig, TelegramProvider};
pub use webhook::{WebhookAuth, WebhookConfig, WebhookProvider};
