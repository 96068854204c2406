//! Download error types.
//!
//! These errors are serializable and do not hold `std::io::Error` or
//! `reqwest::Error` directly; kinds and messages are captured as strings.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use toke_core::ErrorCategory;

/// Error type for download operations.
#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum DownloadError {
    /// I/O error during file operations.
    #[error("I/O error ({kind}): {message}")]
    Io {
        /// The kind of I/O error (e.g., "`NotFound`", "`PermissionDenied`").
        kind: String,
        /// Detailed error message.
        message: String,
    },

    /// Network/HTTP error during download.
    #[error("Network error: {message}")]
    Network {
        message: String,
        /// HTTP status code if available.
        #[serde(skip_serializing_if = "Option::is_none")]
        status_code: Option<u16>,
    },

    /// Download was cancelled by the caller.
    #[error("Download cancelled")]
    Cancelled,

    /// The body ended or failed before the declared length arrived.
    /// The partial file is kept so the next attempt can resume.
    #[error("Download interrupted at {bytes_downloaded} bytes")]
    Interrupted { bytes_downloaded: u64 },

    /// Integrity check failed (checksum mismatch).
    #[error("Integrity check failed: expected {expected}, got {actual}")]
    IntegrityFailed { expected: String, actual: String },
}

impl DownloadError {
    /// Create an I/O error from a `std::io::Error`.
    #[must_use]
    pub fn from_io_error(err: &std::io::Error) -> Self {
        Self::Io {
            kind: format!("{:?}", err.kind()),
            message: err.to_string(),
        }
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            status_code: None,
        }
    }

    /// Create a network error with HTTP status code.
    pub fn network_with_status(message: impl Into<String>, status_code: u16) -> Self {
        Self::Network {
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Network {
                status_code: Some(code),
                ..
            } => {
                if *code == 429 || *code >= 500 {
                    ErrorCategory::Transient
                } else {
                    ErrorCategory::Fatal
                }
            }
            Self::Network {
                status_code: None, ..
            }
            | Self::Interrupted { .. } => ErrorCategory::Transient,
            Self::Cancelled => ErrorCategory::Cancelled,
            Self::IntegrityFailed { .. } => ErrorCategory::CorruptArtifact,
            Self::Io { .. } => ErrorCategory::Fatal,
        }
    }

    /// Whether another attempt may succeed.
    pub fn is_recoverable(&self) -> bool {
        self.category().is_retryable()
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<std::io::Error> for DownloadError {
    fn from(err: std::io::Error) -> Self {
        Self::from_io_error(&err)
    }
}

impl From<reqwest::Error> for DownloadError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::network_with_status(err.to_string(), status.as_u16()),
            None => Self::network(err.to_string()),
        }
    }
}
