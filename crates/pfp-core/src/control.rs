//! Orderly shutdown: one cancellation token, tripped by SIGINT or SIGTERM.
//!
//! Workers stop taking new identifiers once the token is cancelled; attempts
//! already running finish (they are bounded by their timeouts) and identifiers
//! waiting out a backoff are left pending.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
pub struct ShutdownController {
    token: CancellationToken,
    listening: AtomicBool,
}

impl ShutdownController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token to hand to the scheduler and pipeline.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Request shutdown without a signal.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    /// Spawn the signal listener. Only the first call installs it; returns
    /// whether this call did. Must be called inside a tokio runtime.
    pub fn listen_for_signals(&self) -> bool {
        if self.listening.swap(true, Ordering::SeqCst) {
            return false;
        }
        let token = self.token.clone();
        tokio::spawn(async move {
            tokio::select! {
                name = wait_for_signal() => {
                    tracing::warn!(signal = name, "shutdown requested; finishing in-flight attempts");
                    token.cancel();
                }
                _ = token.cancelled() => {}
            }
        });
        true
    }
}

/// Resolve to `name` once `listener` reports a signal. A listener that could
/// not be installed never resolves, so it cannot be mistaken for a signal.
async fn signal_or_pending<F>(listener: F, name: &'static str) -> &'static str
where
    F: Future<Output = std::io::Result<()>>,
{
    match listener.await {
        Ok(()) => name,
        Err(e) => {
            tracing::warn!(signal = name, "cannot listen for signal: {}", e);
            std::future::pending().await
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let sigint = signal_or_pending(tokio::signal::ctrl_c(), "SIGINT");
    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            let sigterm = signal_or_pending(
                async move {
                    match term.recv().await {
                        Some(()) => Ok(()),
                        None => Err(std::io::Error::other("signal stream closed")),
                    }
                },
                "SIGTERM",
            );
            tokio::select! {
                name = sigint => name,
                name = sigterm => name,
            }
        }
        Err(e) => {
            tracing::warn!("cannot listen for SIGTERM: {}", e);
            sigint.await
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    signal_or_pending(tokio::signal::ctrl_c(), "ctrl-c").await
}
