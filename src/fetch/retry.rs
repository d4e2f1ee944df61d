use std::time::Duration;

use crate::config::FetcherSettings;

/// What to do after a rate-limit rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp,
}

/// Decides whether a rate-limited attempt is re-dispatched and how long to
/// wait first.
///
/// Only 429 rejections are retryable; HTTP and transport errors are terminal
/// because retrying a bad asset id or a malformed date cannot succeed. With
/// `max_retries` unset a persistently rate-limited task retries forever at
/// backoff cadence, matching the remote ceiling being a transient condition.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    backoff: Duration,
    max_retries: Option<u32>,
}

impl RetryPolicy {
    pub fn new(backoff: Duration, max_retries: Option<u32>) -> Self {
        Self {
            backoff,
            max_retries,
        }
    }

    pub fn from_settings(settings: &FetcherSettings) -> Self {
        Self::new(
            Duration::from_secs(settings.retry_backoff_secs),
            settings.max_rate_limit_retries,
        )
    }

    /// `rejections` is the number of 429s this task has seen so far,
    /// including the one that triggered this call.
    pub fn on_rate_limited(&self, rejections: u32) -> RetryDecision {
        match self.max_retries {
            Some(max) if rejections > max => RetryDecision::GiveUp,
            _ => RetryDecision::RetryAfter(self.backoff),
        }
    }
}
