//! Download progress snapshots.

use serde::{Deserialize, Serialize};

/// A point-in-time view of one named download.
///
/// Published over bounded channels with non-blocking sends, so consumers may
/// miss intermediate updates. The terminal update for each name is always
/// sent after the work finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadProgress {
    pub name: String,
    pub current_bytes: u64,
    pub total_bytes: u64,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DownloadProgress {
    pub fn new(name: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            current_bytes: 0,
            total_bytes: 0,
            status: status.into(),
            error: None,
        }
    }

    #[must_use]
    pub const fn with_bytes(mut self, current: u64, total: u64) -> Self {
        self.current_bytes = current;
        self.total_bytes = total;
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Completion ratio in `[0, 1]`, or `None` when the total is unknown.
    pub fn fraction(&self) -> Option<f64> {
        if self.total_bytes == 0 {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let ratio = self.current_bytes as f64 / self.total_bytes as f64;
        Some(ratio.min(1.0))
    }
}
