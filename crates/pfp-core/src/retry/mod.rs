//! Retry and backoff policy.
//!
//! Per-attempt failures from the fetch worker are classified into an
//! `ErrorKind`; the policy turns that into either another attempt after an
//! exponential delay or a final decision. Session and engine failures are
//! fatal and never retried.

mod classify;
mod error;
mod policy;
mod run;

pub use classify::{classify, classify_curl_error};
pub use error::AttemptError;
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
pub use run::{run_with_retry, RetryOutcome};
