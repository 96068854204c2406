//! Shared error taxonomy.
//!
//! Each crate keeps its own `thiserror` enum; this category is what callers
//! match on to decide whether to retry, re-authenticate or stay quiet.

use serde::{Deserialize, Serialize};

/// Coarse classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Timeouts, connection resets, 429 and 5xx responses. Retried with backoff.
    Transient,
    /// Credential rejected. One refresh-and-retry, then surfaced.
    AuthExpired,
    /// Size mismatch, checksum mismatch or stale partial file.
    CorruptArtifact,
    /// The host cannot run the requested backend.
    UnsupportedPlatform,
    /// Binary missing, crash, or readiness timeout.
    ProcessFailure,
    /// The caller cancelled the operation.
    Cancelled,
    /// Anything else. Not retried.
    Fatal,
}

impl ErrorCategory {
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Callers suppress user-facing error UI for cancellations.
    pub const fn is_cancelled(self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
