use std::time::Duration;

use crate::config::{PfpConfig, RetryConfig};

/// High-level classification of an attempt failure for retry purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Navigation did not finish within its timeout.
    Timeout,
    /// Navigation failed (network error, aborted load).
    Navigation,
    /// Page loaded but no strategy found the resource.
    NotFound,
    /// Resource download failed (HTTP status, empty body, timeout).
    Download,
    /// Engine or session failure; retrying this identifier cannot help.
    Fatal,
}

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Do not retry this error.
    NoRetry,
    /// Retry after the given delay.
    RetryAfter(Duration),
}

/// Exponential backoff with a cap.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first). Never below 1.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Upper bound on backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Duration::from_secs(1), Duration::from_secs(30))
    }
}

impl RetryPolicy {
    /// `max_attempts` below 1 is treated as 1.
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    pub fn from_config(cfg: &PfpConfig) -> Self {
        let retry = cfg.retry.clone().unwrap_or_default();
        Self::new(cfg.max_retries, base_delay(&retry), Duration::from_secs(retry.max_delay_secs))
    }

    /// Backoff before attempt `attempt + 1`: `base * 2^(attempt-1)`, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = 1u32 << attempt.saturating_sub(1).min(20);
        self.base_delay.saturating_mul(exp).min(self.max_delay)
    }

    /// Decide what to do after attempt `attempt` (1-based) failed with `kind`.
    pub fn decide(&self, attempt: u32, kind: ErrorKind) -> RetryDecision {
        if attempt >= self.max_attempts {
            return RetryDecision::NoRetry;
        }
        match kind {
            ErrorKind::Fatal => RetryDecision::NoRetry,
            ErrorKind::Timeout | ErrorKind::Navigation | ErrorKind::NotFound | ErrorKind::Download => {
                RetryDecision::RetryAfter(self.delay_for(attempt))
            }
        }
    }
}

fn base_delay(retry: &RetryConfig) -> Duration {
    Duration::try_from_secs_f64(retry.base_delay_secs).unwrap_or_else(|_| {
        tracing::warn!(
            value = retry.base_delay_secs,
            "invalid retry.base_delay_secs; using 1s"
        );
        Duration::from_secs(1)
    })
}
