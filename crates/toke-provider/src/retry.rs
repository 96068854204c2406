//! Bounded exponential backoff.

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};

use crate::error::ProviderError;

pub const DEFAULT_MAX_RETRIES: u32 = 8;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    pub const fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Delay before retry number `attempt` (1-based).
    ///
    /// A server-provided `Retry-After` wins; otherwise the base delay doubles
    /// per attempt.
    pub fn retry_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(after) = retry_after {
            return after;
        }
        let shift = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << shift)
    }
}

/// `Retry-After` as whole seconds. HTTP-date values are ignored.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?;
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Attempt bookkeeping for one logical request.
#[derive(Debug, Default)]
pub struct RetryState {
    pub attempt: u32,
    pub last_error: Option<ProviderError>,
    refreshed: bool,
}

/// What to do after a failed attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Refresh the credential and try again without waiting.
    Refresh,
    Backoff(Duration),
    Fail(ProviderError),
}

impl RetryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a new attempt.
    pub const fn begin(&mut self) {
        self.attempt += 1;
    }

    /// Classify `err` from the current attempt.
    ///
    /// A 401 gets one refresh per request; a second 401 is an authentication
    /// failure. Transient errors back off until `max_retries` retries have
    /// been spent.
    pub fn decide(
        &mut self,
        policy: &RetryPolicy,
        err: ProviderError,
        retry_after: Option<Duration>,
    ) -> RetryDecision {
        if err.is_cancelled() {
            return RetryDecision::Fail(err);
        }
        if err.is_unauthorized() {
            if self.refreshed {
                return RetryDecision::Fail(ProviderError::AuthFailed {
                    message: err.to_string(),
                });
            }
            self.refreshed = true;
            self.last_error = Some(err);
            return RetryDecision::Refresh;
        }
        if !err.is_retryable() {
            return RetryDecision::Fail(err);
        }
        if self.attempt > policy.max_retries {
            return RetryDecision::Fail(ProviderError::RetriesExhausted {
                max_retries: policy.max_retries,
                last: err.to_string(),
            });
        }
        let delay = policy.retry_delay(self.attempt, retry_after);
        self.last_error = Some(err);
        RetryDecision::Backoff(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn delay_doubles_and_is_non_decreasing() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.retry_delay(1, None), Duration::from_secs(2));
        assert_eq!(policy.retry_delay(2, None), Duration::from_secs(4));
        assert_eq!(policy.retry_delay(4, None), Duration::from_secs(16));
        let delays: Vec<_> = (1..=40).map(|i| policy.retry_delay(i, None)).collect();
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn retry_after_overrides() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.retry_delay(5, Some(Duration::from_secs(1))),
            Duration::from_secs(1)
        );

        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static(" 3 "));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(3)));
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2026 07:28:00 GMT"),
        );
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn attempts_are_bounded() {
        let policy = RetryPolicy::new(2, Duration::from_millis(1));
        let mut state = RetryState::new();
        let mut attempts = 0;
        loop {
            state.begin();
            attempts += 1;
            match state.decide(&policy, ProviderError::api(500, "boom"), None) {
                RetryDecision::Backoff(_) => {}
                RetryDecision::Fail(err) => {
                    assert!(matches!(err, ProviderError::RetriesExhausted { max_retries: 2, .. }));
                    break;
                }
                RetryDecision::Refresh => unreachable!(),
            }
        }
        assert_eq!(attempts, 3);
    }

    #[test]
    fn one_refresh_per_request() {
        let policy = RetryPolicy::default();
        let mut state = RetryState::new();
        state.begin();
        assert_eq!(
            state.decide(&policy, ProviderError::api(401, "expired"), None),
            RetryDecision::Refresh
        );
        state.begin();
        assert!(matches!(
            state.decide(&policy, ProviderError::api(401, "expired"), None),
            RetryDecision::Fail(ProviderError::AuthFailed { .. })
        ));
    }

    #[test]
    fn cancellation_and_client_errors_fail_fast() {
        let policy = RetryPolicy::default();
        let mut state = RetryState::new();
        state.begin();
        assert_eq!(
            state.decide(&policy, ProviderError::Cancelled, None),
            RetryDecision::Fail(ProviderError::Cancelled)
        );
        assert!(matches!(
            state.decide(&policy, ProviderError::api(400, "bad"), None),
            RetryDecision::Fail(ProviderError::Api { status: 400, .. })
        ));
    }
}
