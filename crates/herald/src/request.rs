//! Notification request and aggregate status types.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Per-request payload transform, applied once per channel after the metadata
/// merge and before the selection strategy runs.
#[async_trait]
pub trait Customize: Send + Sync {
    async fn apply(&self, channel: &str, payload: Value) -> Result<Value>;
}

/// One logical notification addressed to one or more channels.
///
/// `id`, `user_id`, `metadata` and `customize` are request metadata, never
/// treated as channels; only payload keys matching a known channel name are
/// dispatched.
#[derive(Clone, Default)]
pub struct NotificationRequest {
    /// Cross-channel correlation id, merged into every channel payload.
    pub id: Option<String>,
    /// Target user id, merged into every channel payload.
    pub user_id: Option<String>,
    /// Opaque caller metadata; carried along, never dispatched.
    pub metadata: Option<Value>,
    /// Channel name -> channel-specific payload.
    pub payloads: HashMap<String, Value>,
    /// Optional payload transform (see [`Customize`]).
    pub customize: Option<Arc<dyn Customize>>,
}

impl NotificationRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Attach a payload for one channel.
    pub fn channel(mut self, name: impl Into<String>, payload: Value) -> Self {
        self.payloads.insert(name.into(), payload);
        self
    }

    pub fn with_customize(mut self, hook: Arc<dyn Customize>) -> Self {
        self.customize = Some(hook);
        self
    }

    /// Channel payload with request metadata merged on top.
    ///
    /// The caller's payload is cloned, never mutated. Merging only applies to
    /// object payloads; anything else passes through untouched.
    pub(crate) fn merged_payload(&self, channel: &str) -> Value {
        let payload = self.payloads.get(channel).cloned().unwrap_or(Value::Null);
        let Value::Object(mut map) = payload else {
            return payload;
        };
        if let Some(id) = &self.id {
            map.insert("id".to_string(), Value::String(id.clone()));
        }
        if let Some(user_id) = &self.user_id {
            map.insert("userId".to_string(), Value::String(user_id.clone()));
        }
        Value::Object(map)
    }
}

impl fmt::Debug for NotificationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationRequest")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("channels", &self.payloads.keys().collect::<Vec<_>>())
            .field("customize", &self.customize.is_some())
            .finish()
    }
}

/// Overall outcome of one `send` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchStatus {
    Success,
    Error,
}

/// Per-channel slice of the aggregate result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelDelivery {
    /// Vendor message id; absent when the channel failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Provider that handled, or last attempted, the send.
    #[serde(rename = "providerId", skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
}

/// Aggregate outcome of one `send` call.
///
/// `status` is `error` iff at least one channel failed. Every attempted
/// channel appears in `channels`; failed channels additionally appear in
/// `errors` with their error flattened to a string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationStatus {
    pub status: DispatchStatus,
    pub channels: HashMap<String, ChannelDelivery>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub errors: HashMap<String, String>,
}

impl NotificationStatus {
    pub fn is_success(&self) -> bool {
        self.status == DispatchStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merged_payload_applies_metadata_on_top() {
        let request = NotificationRequest::new()
            .with_id("notif-1")
            .with_user_id("u-42")
            .channel("email", json!({"to": "a@b.c", "id": "stale"}));

        let merged = request.merged_payload("email");
        assert_eq!(merged["to"], "a@b.c");
        assert_eq!(merged["id"], "notif-1");
        assert_eq!(merged["userId"], "u-42");
        // Original request untouched.
        assert_eq!(request.payloads["email"]["id"], "stale");
    }

    #[test]
    fn merged_payload_leaves_non_objects_alone() {
        let request = NotificationRequest::new()
            .with_id("notif-1")
            .channel("sms", json!("just a string"));
        assert_eq!(request.merged_payload("sms"), json!("just a string"));
    }

    #[test]
    fn status_serializes_with_camel_case_provider_id() {
        let mut channels = HashMap::new();
        channels.insert(
            "email".to_string(),
            ChannelDelivery {
                id: Some("m-1".to_string()),
                provider_id: Some("ses".to_string()),
            },
        );
        let status = NotificationStatus {
            status: DispatchStatus::Success,
            channels,
            errors: HashMap::new(),
        };

        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["status"], "success");
        assert_eq!(value["channels"]["email"]["providerId"], "ses");
        assert!(value.get("errors").is_none());
    }

    #[test]
    fn failed_channel_serializes_without_id() {
        let mut channels = HashMap::new();
        channels.insert(
            "sms".to_string(),
            ChannelDelivery {
                id: None,
                provider_id: Some("twilio".to_string()),
            },
        );
        let mut errors = HashMap::new();
        errors.insert("sms".to_string(), "boom".to_string());
        let status = NotificationStatus {
            status: DispatchStatus::Error,
            channels,
            errors,
        };

        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["status"], "error");
        assert!(value["channels"]["sms"].get("id").is_none());
        assert_eq!(value["errors"]["sms"], "boom");
    }
}
