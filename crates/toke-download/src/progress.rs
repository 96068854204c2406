//! Progress throttling.
//!
//! Rate-limits progress updates so a fast transfer does not flood a UI with
//! one event per network chunk.

use std::time::{Duration, Instant};

/// Rate-limiter for progress updates.
///
/// An update passes when the minimum interval has elapsed since the last
/// one, when at least `min_bytes` arrived since then, or when the transfer
/// is complete.
pub struct ProgressThrottle {
    last_emit: Option<Instant>,
    last_bytes: u64,
    min_interval: Duration,
    min_bytes: u64,
}

impl ProgressThrottle {
    pub const fn new(min_interval: Duration, min_bytes: u64) -> Self {
        Self {
            last_emit: None,
            last_bytes: 0,
            min_interval,
            min_bytes,
        }
    }

    /// 200ms or 1 MiB, whichever comes first.
    pub const fn default_interval() -> Self {
        Self::new(Duration::from_millis(200), 1024 * 1024)
    }

    /// Check whether an update for `downloaded` of `total` bytes should go out.
    pub fn should_emit(&mut self, downloaded: u64, total: u64) -> bool {
        let now = Instant::now();
        let finished = total > 0 && downloaded >= total;
        let due = match self.last_emit {
            None => true,
            Some(last) => {
                now.duration_since(last) >= self.min_interval
                    || downloaded.saturating_sub(self.last_bytes) >= self.min_bytes
            }
        };

        if due || finished {
            self.last_emit = Some(now);
            self.last_bytes = downloaded;
            true
        } else {
            false
        }
    }

    /// Force the next check to return true.
    pub const fn reset(&mut self) {
        self.last_emit = None;
    }
}

impl Default for ProgressThrottle {
    fn default() -> Self {
        Self::default_interval()
    }
}
