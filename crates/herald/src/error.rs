//! Engine-wide error types.

use thiserror::Error;

/// Engine-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Engine-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    /// The vendor accepted the connection but rejected the request.
    #[error("provider {provider_id} failed on channel {channel}: {message}")]
    Provider {
        provider_id: String,
        channel: String,
        /// Machine-readable failure code.
        code: String,
        /// HTTP status reported by the vendor, when one exists.
        status: Option<u16>,
        message: String,
    },

    /// Transport-level failure before any vendor verdict.
    #[error("network error: {message}")]
    Network {
        status: Option<u16>,
        message: String,
    },

    /// Construction-time misconfiguration; never raised by `send`.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn provider(
        provider_id: impl Into<String>,
        channel: impl Into<String>,
        code: impl Into<String>,
        status: Option<u16>,
        message: impl Into<String>,
    ) -> Self {
        Self::Provider {
            provider_id: provider_id.into(),
            channel: channel.into(),
            code: code.into(),
            status,
            message: message.into(),
        }
    }

    /// HTTP status associated with this error, when one exists.
    ///
    /// The vendor verdict is checked first, then the transport layer. Errors
    /// with no status at all are treated as retryable by the retry executor.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Provider { status, .. } | Self::Network { status, .. } => *status,
            _ => None,
        }
    }

    /// Provider attribution, when the failure reached a specific vendor.
    pub fn provider_id(&self) -> Option<&str> {
        match self {
            Self::Provider { provider_id, .. } => Some(provider_id),
            _ => None,
        }
    }

    /// Narrow conversion used only when folding the aggregate result.
    ///
    /// The structured fields (code, status, provider attribution) are dropped
    /// at that boundary so the aggregate stays serializable; anything that
    /// needs the detail must inspect the error before it reaches the fold.
    pub fn to_message(&self) -> String {
        self.to_string()
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::Network {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_code_checks_both_shapes() {
        let provider = Error::provider("sg", "email", "rejected", Some(429), "rate limited");
        assert_eq!(provider.status_code(), Some(429));

        let network = Error::Network {
            status: Some(503),
            message: "unavailable".to_string(),
        };
        assert_eq!(network.status_code(), Some(503));

        assert_eq!(Error::Cancelled.status_code(), None);
        assert_eq!(Error::Other("boom".to_string()).status_code(), None);
    }

    #[test]
    fn provider_attribution() {
        let err = Error::provider("twilio", "sms", "rejected", None, "bad number");
        assert_eq!(err.provider_id(), Some("twilio"));
        assert_eq!(Error::Cancelled.provider_id(), None);
    }

    #[test]
    fn to_message_is_plain_string() {
        let err = Error::provider("ses", "email", "rejected", Some(500), "internal");
        let msg = err.to_message();
        assert!(msg.contains("ses"));
        assert!(msg.contains("email"));
    }
}
