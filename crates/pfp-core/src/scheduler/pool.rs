//! Run identifiers through the fetcher with up to `concurrency` in flight.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::fetch::Fetcher;
use crate::progress::{Identifier, Outcome, ProgressStore};
use crate::retry::{run_with_retry, AttemptError, RetryOutcome, RetryPolicy};

use super::events::{RunEvent, RunSummary};
use super::queue::WorkQueue;

/// A failure that stops the whole run.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("run aborted while processing {id}: {source}")]
    Fatal {
        id: Identifier,
        #[source]
        source: AttemptError,
    },
    #[error("worker task failed: {0}")]
    Worker(String),
}

/// Fixed-size worker pool over a `Fetcher`.
#[derive(Clone)]
pub struct Scheduler {
    fetcher: Arc<dyn Fetcher>,
    progress: Arc<ProgressStore>,
    policy: RetryPolicy,
    concurrency: usize,
    cancel: CancellationToken,
    events: Option<mpsc::Sender<RunEvent>>,
}

impl Scheduler {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        progress: Arc<ProgressStore>,
        policy: RetryPolicy,
        concurrency: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            fetcher,
            progress,
            policy,
            concurrency: concurrency.max(1),
            cancel,
            events: None,
        }
    }

    /// Send run events to `tx`. Events are dropped if the channel is full.
    pub fn with_events(mut self, tx: mpsc::Sender<RunEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Process `ids` until the queue is empty, shutdown is requested, or a
    /// fatal error occurs. Progress is flushed before returning either way.
    pub async fn run(&self, ids: Vec<Identifier>) -> Result<RunSummary, RunError> {
        let queue = Arc::new(WorkQueue::new(ids));
        let workers = self.concurrency.min(queue.len().max(1));
        tracing::info!(queued = queue.len(), workers, "scheduler starting");

        let mut join_set = JoinSet::new();
        for worker in 0..workers {
            let this = self.clone();
            let queue = Arc::clone(&queue);
            join_set.spawn(async move { this.worker_loop(worker, &queue).await });
        }

        let mut summary = RunSummary::default();
        let mut fatal: Option<RunError> = None;
        while let Some(res) = join_set.join_next().await {
            match res {
                Ok((partial, Ok(()))) => summary.merge(partial),
                Ok((partial, Err(e))) => {
                    summary.merge(partial);
                    self.cancel.cancel();
                    fatal.get_or_insert(e);
                }
                Err(e) => {
                    self.cancel.cancel();
                    fatal.get_or_insert(RunError::Worker(e.to_string()));
                }
            }
        }
        summary.skipped_by_shutdown += queue.len() as u64;

        if let Err(e) = self.progress.flush() {
            tracing::warn!("final progress flush failed: {:#}", e);
        }
        tracing::info!(
            attempted = summary.attempted,
            saved = summary.saved,
            failed = summary.failed,
            skipped = summary.skipped_by_shutdown,
            "scheduler finished"
        );
        match fatal {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }

    async fn worker_loop(&self, worker: usize, queue: &WorkQueue) -> (RunSummary, Result<(), RunError>) {
        let mut summary = RunSummary::default();
        loop {
            if self.cancel.is_cancelled() {
                tracing::debug!(worker, "shutdown requested; worker stopping");
                break;
            }
            let Some(id) = queue.pop() else {
                break;
            };
            summary.attempted += 1;
            if let Err(e) = self.process(&id, &mut summary).await {
                return (summary, Err(e));
            }
        }
        (summary, Ok(()))
    }

    /// All attempts for one identifier, then its final record.
    async fn process(&self, id: &Identifier, summary: &mut RunSummary) -> Result<(), RunError> {
        let outcome = run_with_retry(
            &self.policy,
            &self.cancel,
            |attempt, err, delay| {
                tracing::info!(id = %id, attempt, ?delay, "attempt failed, will retry: {}", err);
                self.emit(RunEvent::Retrying {
                    id: id.clone(),
                    attempt,
                    delay,
                    reason: err.to_string(),
                });
            },
            |attempt| {
                self.emit(RunEvent::Started {
                    id: id.clone(),
                    attempt,
                });
                let fetcher = Arc::clone(&self.fetcher);
                let id = id.clone();
                async move { fetcher.fetch(&id).await }
            },
        )
        .await;

        match outcome {
            RetryOutcome::Succeeded { value: path, attempts } => {
                self.progress.record_async(id, Outcome::Saved).await;
                summary.saved += 1;
                tracing::info!(id = %id, attempts, path = %path.display(), "saved");
                self.emit(RunEvent::Saved {
                    id: id.clone(),
                    path,
                    attempts,
                });
            }
            RetryOutcome::Exhausted { error, .. } if error.is_fatal() => {
                tracing::error!(id = %id, "fatal error, stopping run: {}", error);
                self.cancel.cancel();
                return Err(RunError::Fatal {
                    id: id.clone(),
                    source: error,
                });
            }
            RetryOutcome::Exhausted { error, attempts } => {
                let reason = error.to_string();
                self.progress
                    .record_async(id, Outcome::Failed(reason.clone()))
                    .await;
                summary.failed += 1;
                tracing::warn!(id = %id, attempts, "failed: {}", reason);
                self.emit(RunEvent::Failed {
                    id: id.clone(),
                    reason,
                    attempts,
                });
            }
            RetryOutcome::Cancelled { attempts } => {
                summary.skipped_by_shutdown += 1;
                tracing::info!(id = %id, attempts, "left pending for the next run");
            }
        }
        Ok(())
    }

    fn emit(&self, event: RunEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.try_send(event);
        }
    }
}
