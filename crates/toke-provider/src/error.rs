//! Provider error types.
//!
//! Errors travel inside [`ProviderEvent::Error`](crate::ProviderEvent), so
//! like download errors they are cloneable and serializable and keep only
//! strings and status codes.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use toke_core::ErrorCategory;

#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProviderError {
    /// The provider answered with a non-2xx status.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Connection, timeout or body read failure.
    #[error("Network error: {message}")]
    Network { message: String },

    /// A response or stream chunk could not be decoded.
    #[error("Invalid response: {message}")]
    Decode { message: String },

    /// An error object sent inside an otherwise successful stream.
    #[error("stream error: {message}")]
    Stream { message: String },

    /// The credential was rejected and could not be refreshed.
    #[error("authentication failed: {message}")]
    AuthFailed { message: String },

    /// Transient failures persisted past the retry budget.
    #[error("maximum retry attempts reached: {max_retries} retries ({last})")]
    RetriesExhausted { max_retries: u32, last: String },

    /// The provider returned no choices.
    #[error("received empty response from provider")]
    EmptyResponse,

    #[error("request cancelled")]
    Cancelled,
}

impl ProviderError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Api { status, .. } => match *status {
                401 => ErrorCategory::AuthExpired,
                429 | 500..=599 => ErrorCategory::Transient,
                _ => ErrorCategory::Fatal,
            },
            Self::Network { .. } => ErrorCategory::Transient,
            Self::AuthFailed { .. } => ErrorCategory::AuthExpired,
            Self::Cancelled => ErrorCategory::Cancelled,
            Self::Decode { .. }
            | Self::Stream { .. }
            | Self::RetriesExhausted { .. }
            | Self::EmptyResponse => ErrorCategory::Fatal,
        }
    }

    /// Whether the retry loop should try again after a backoff.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// A 401 that may be cured by refreshing the credential.
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Api { status: 401, .. })
    }

    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::decode(err.to_string());
        }
        match err.status() {
            Some(status) => Self::api(status.as_u16(), err.to_string()),
            None => Self::network(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        Self::decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limits_and_server_errors_are_retried() {
        assert!(ProviderError::api(429, "slow down").is_retryable());
        assert!(ProviderError::api(500, "boom").is_retryable());
        assert!(ProviderError::api(503, "busy").is_retryable());
        assert!(ProviderError::network("reset").is_retryable());
        assert!(!ProviderError::api(400, "bad request").is_retryable());
        assert!(!ProviderError::api(401, "expired").is_retryable());
        assert!(!ProviderError::Cancelled.is_retryable());
    }

    #[test]
    fn unauthorized_is_auth_expired() {
        let err = ProviderError::api(401, "token expired");
        assert!(err.is_unauthorized());
        assert_eq!(err.category(), ErrorCategory::AuthExpired);
        assert_eq!(
            ProviderError::AuthFailed {
                message: "no refresh token".into()
            }
            .category(),
            ErrorCategory::AuthExpired
        );
    }

    #[test]
    fn serializes_with_variant_name() {
        let json = serde_json::to_value(ProviderError::api(404, "no such model")).unwrap();
        assert_eq!(json["Api"]["status"], 404);
        assert!(ProviderError::Cancelled.is_cancelled());
        assert_eq!(ProviderError::Cancelled.category(), ErrorCategory::Cancelled);
    }
}
