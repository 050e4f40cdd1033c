//! Retry loop: run an async attempt until success, a final failure, or shutdown.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::classify;
use super::error::AttemptError;
use super::policy::{RetryDecision, RetryPolicy};

/// How the retry loop ended for one identifier.
#[derive(Debug)]
pub enum RetryOutcome<T> {
    Succeeded { value: T, attempts: u32 },
    /// Attempts used up (or a non-retryable error); carries the last error.
    Exhausted { error: AttemptError, attempts: u32 },
    /// Shutdown was requested while waiting out a backoff delay.
    Cancelled { attempts: u32 },
}

/// Runs `attempt` until it succeeds or the policy says to stop.
///
/// A started attempt always runs to completion; cancellation is only observed
/// during backoff. `on_retry(attempt, error, delay)` is called before each wait.
pub async fn run_with_retry<T, F, Fut, R>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut on_retry: R,
    mut attempt: F,
) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AttemptError>>,
    R: FnMut(u32, &AttemptError, Duration),
{
    let mut n = 1u32;
    loop {
        match attempt(n).await {
            Ok(value) => return RetryOutcome::Succeeded { value, attempts: n },
            Err(e) => match policy.decide(n, classify::classify(&e)) {
                RetryDecision::NoRetry => {
                    return RetryOutcome::Exhausted {
                        error: e,
                        attempts: n,
                    }
                }
                RetryDecision::RetryAfter(d) => {
                    on_retry(n, &e, d);
                    tokio::select! {
                        _ = cancel.cancelled() => return RetryOutcome::Cancelled { attempts: n },
                        _ = tokio::time::sleep(d) => {}
                    }
                    n += 1;
                }
            },
        }
    }
}
