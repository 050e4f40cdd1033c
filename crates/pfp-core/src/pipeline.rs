//! One end-to-end run: load progress, establish the session, drain the
//! pending identifiers through the worker pool, release the engine.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::PfpConfig;
use crate::engine::chromium::ChromiumLauncher;
use crate::engine::{EngineLauncher, EngineLifecycle};
use crate::extract::Extractor;
use crate::fetch::{CurlDownloader, FetchWorker, ResourceDownloader};
use crate::progress::{Identifier, ProgressStore};
use crate::retry::RetryPolicy;
use crate::scheduler::{RunEvent, RunSummary, Scheduler};
use crate::session::{CredentialProvider, SessionContext, SessionManager};

/// Result of `Pipeline::run`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunReport {
    /// Every identifier already has a final outcome.
    NothingToDo,
    Finished {
        summary: RunSummary,
        /// Totals across all runs, from the progress file.
        saved_total: u64,
        failed_total: u64,
    },
}

pub struct Pipeline {
    cfg: PfpConfig,
    launcher: Arc<dyn EngineLauncher>,
    downloader: Arc<dyn ResourceDownloader>,
    credentials: Arc<dyn CredentialProvider>,
    cancel: CancellationToken,
    events: Option<mpsc::Sender<RunEvent>>,
}

impl Pipeline {
    pub fn new(
        cfg: PfpConfig,
        launcher: Arc<dyn EngineLauncher>,
        downloader: Arc<dyn ResourceDownloader>,
        credentials: Arc<dyn CredentialProvider>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            cfg,
            launcher,
            downloader,
            credentials,
            cancel,
            events: None,
        }
    }

    /// Chromium engine and curl downloader.
    pub fn with_defaults(
        cfg: PfpConfig,
        credentials: Arc<dyn CredentialProvider>,
        cancel: CancellationToken,
    ) -> Self {
        let launcher = Arc::new(ChromiumLauncher::from_config(&cfg));
        let downloader = Arc::new(CurlDownloader::new(cfg.timeouts.download()));
        Self::new(cfg, launcher, downloader, credentials, cancel)
    }

    pub fn with_events(mut self, tx: mpsc::Sender<RunEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn config(&self) -> &PfpConfig {
        &self.cfg
    }

    /// Process every identifier in `ids` that is not already done.
    pub async fn run(&self, ids: Vec<Identifier>) -> Result<RunReport> {
        let progress_path = self.cfg.progress_path()?;
        let progress = Arc::new(ProgressStore::load(&progress_path)?);
        let pending = progress.pending(ids);
        if pending.is_empty() {
            tracing::info!("nothing pending");
            return Ok(RunReport::NothingToDo);
        }
        std::fs::create_dir_all(&self.cfg.output_dir).with_context(|| {
            format!("create output dir: {}", self.cfg.output_dir.display())
        })?;
        tracing::info!(
            pending = pending.len(),
            progress = %progress_path.display(),
            out = %self.cfg.output_dir.display(),
            "run starting"
        );

        let engine = Arc::new(EngineLifecycle::from_config(
            Arc::clone(&self.launcher),
            &self.cfg,
        ));
        let result = self.run_with_engine(&engine, &progress, pending).await;
        if let Err(e) = engine.close().await {
            tracing::warn!("engine close failed: {}", e);
        }
        if let Err(e) = progress.flush() {
            tracing::warn!("progress flush failed: {:#}", e);
        }
        result
    }

    async fn run_with_engine(
        &self,
        engine: &Arc<EngineLifecycle>,
        progress: &Arc<ProgressStore>,
        pending: Vec<Identifier>,
    ) -> Result<RunReport> {
        if self.cfg.unauthenticated {
            tracing::info!("unauthenticated mode; skipping session");
        } else {
            self.session_manager()?
                .establish(engine)
                .await
                .context("could not establish a session")?;
        }

        let extractor = Arc::new(Extractor::from_site(&self.cfg.site).context("site config")?);
        let worker = Arc::new(FetchWorker::new(
            Arc::clone(engine),
            extractor,
            Arc::clone(&self.downloader),
            &self.cfg,
        ));
        let mut scheduler = Scheduler::new(
            worker,
            Arc::clone(progress),
            RetryPolicy::from_config(&self.cfg),
            self.cfg.concurrency,
            self.cancel.clone(),
        );
        if let Some(tx) = &self.events {
            scheduler = scheduler.with_events(tx.clone());
        }

        let summary = scheduler.run(pending).await?;
        let (saved_total, failed_total) = progress.counts();
        Ok(RunReport::Finished {
            summary,
            saved_total,
            failed_total,
        })
    }

    /// Establish (and cache) a session without fetching anything.
    pub async fn login(&self) -> Result<Arc<SessionContext>> {
        let engine = EngineLifecycle::from_config(Arc::clone(&self.launcher), &self.cfg);
        let result = self.session_manager()?.establish(&engine).await;
        if let Err(e) = engine.close().await {
            tracing::warn!("engine close failed: {}", e);
        }
        Ok(result?)
    }

    fn session_manager(&self) -> Result<SessionManager> {
        SessionManager::from_config(&self.cfg, Arc::clone(&self.credentials))
    }
}
