//! One fetch attempt for one identifier: page, extraction, download.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::PfpConfig;
use crate::engine::{EngineLifecycle, PageLease};
use crate::extract::Extractor;
use crate::retry::AttemptError;
use crate::storage;

mod download;

pub use download::{CurlDownloader, ResourceDownloader};

/// Performs a single attempt for an identifier and returns the saved file.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, id: &str) -> Result<PathBuf, AttemptError>;
}

/// The real attempt: borrow a page, load the profile, extract, download.
pub struct FetchWorker {
    engine: Arc<EngineLifecycle>,
    extractor: Arc<Extractor>,
    downloader: Arc<dyn ResourceDownloader>,
    url_template: String,
    output_dir: PathBuf,
    extension: String,
    navigation_timeout: Duration,
    settle: Duration,
}

impl FetchWorker {
    pub fn new(
        engine: Arc<EngineLifecycle>,
        extractor: Arc<Extractor>,
        downloader: Arc<dyn ResourceDownloader>,
        cfg: &PfpConfig,
    ) -> Self {
        Self {
            engine,
            extractor,
            downloader,
            url_template: cfg.site.profile_url_template.clone(),
            output_dir: cfg.output_dir.clone(),
            extension: cfg.image_extension.clone(),
            navigation_timeout: cfg.timeouts.navigation(),
            settle: cfg.timeouts.settle(),
        }
    }

    pub fn target_url(&self, id: &str) -> String {
        self.url_template.replace("{id}", id)
    }

    pub fn artifact_path(&self, id: &str) -> PathBuf {
        self.output_dir
            .join(storage::artifact_file_name(id, &self.extension))
    }

    async fn attempt_on(&self, page: &PageLease, id: &str) -> Result<PathBuf, AttemptError> {
        let url = self.target_url(id);
        match tokio::time::timeout(self.navigation_timeout, page.goto(&url)).await {
            Err(_) => return Err(AttemptError::NavigationTimeout(self.navigation_timeout)),
            Ok(Err(e)) => return Err(AttemptError::Navigation(e.to_string())),
            Ok(Ok(())) => {}
        }
        tokio::time::sleep(self.settle).await;

        let found = self
            .extractor
            .extract(&**page)
            .await
            .ok_or(AttemptError::NotFound)?;
        let dest = self.artifact_path(id);
        let bytes = self
            .downloader
            .download(&found.url, &dest, page.user_agent())
            .await?;
        tracing::debug!(id, bytes, strategy = found.strategy, path = %dest.display(), "image saved");
        Ok(dest)
    }
}

#[async_trait]
impl Fetcher for FetchWorker {
    async fn fetch(&self, id: &str) -> Result<PathBuf, AttemptError> {
        // Launch failures, a closed engine and pages refused after a relaunch
        // all mean the browser is gone.
        let lease = self
            .engine
            .new_context()
            .await
            .map_err(|e| AttemptError::Engine(e.to_string()))?;
        let result = self.attempt_on(&lease, id).await;
        lease.release().await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineError, EngineLauncher, ResourceFilter, UserAgentRotation};
    use crate::testing::{FakeDoc, FakeDownloader, FakeLauncher, FakeSite};

    struct Harness {
        site: Arc<FakeSite>,
        launcher: Arc<FakeLauncher>,
        downloader: Arc<FakeDownloader>,
        worker: FetchWorker,
        _dir: tempfile::TempDir,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let site = FakeSite::new();
        let launcher = Arc::new(FakeLauncher::new(Arc::clone(&site)));
        let engine = Arc::new(EngineLifecycle::new(
            Arc::clone(&launcher) as Arc<dyn EngineLauncher>,
            UserAgentRotation::new(vec!["ua-test".into()]),
            ResourceFilter::default(),
            50,
        ));
        let downloader = FakeDownloader::new();
        let mut cfg = PfpConfig::default();
        cfg.output_dir = dir.path().join("pfp");
        cfg.site.profile_url_template = "https://site.test/{id}/".into();
        cfg.timeouts.settle_millis = 0;
        cfg.timeouts.navigation_secs = 25;
        let worker = FetchWorker::new(
            engine,
            Arc::new(Extractor::from_site(&cfg.site).unwrap()),
            Arc::clone(&downloader) as Arc<dyn ResourceDownloader>,
            &cfg,
        );
        Harness {
            site,
            launcher,
            downloader,
            worker,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn saves_image_under_identifier_name() {
        let h = harness();
        h.site.page(
            "https://site.test/alice/",
            FakeDoc::new().meta("og:image", "https://cdn.test/alice.jpg"),
        );
        let path = h.worker.fetch("alice").await.unwrap();
        assert!(path.ends_with("pfp/alice.jpg"));
        assert!(path.exists());
        let calls = h.downloader.calls();
        assert_eq!(calls[0].0, "https://cdn.test/alice.jpg");
        assert_eq!(h.launcher.pages_opened(), h.launcher.pages_closed());
    }

    #[tokio::test]
    async fn missing_image_is_not_found_and_page_released() {
        let h = harness();
        h.site.page("https://site.test/bob/", FakeDoc::new().html("<html></html>"));
        assert_eq!(h.worker.fetch("bob").await.unwrap_err(), AttemptError::NotFound);
        assert!(h.downloader.calls().is_empty());
        assert_eq!(h.launcher.pages_closed(), 1);
    }

    #[tokio::test]
    async fn navigation_error_is_recoverable() {
        let h = harness();
        h.site.page(
            "https://site.test/carol/",
            FakeDoc::new().nav_error(EngineError::Navigation("net::ERR_CONNECTION_RESET".into())),
        );
        let err = h.worker.fetch("carol").await.unwrap_err();
        assert!(matches!(err, AttemptError::Navigation(_)));
        assert!(!err.is_fatal());
        assert_eq!(h.launcher.pages_closed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_navigation_times_out() {
        let h = harness();
        h.site.page(
            "https://site.test/dave/",
            FakeDoc::new().nav_delay(Duration::from_secs(60)),
        );
        let err = h.worker.fetch("dave").await.unwrap_err();
        assert_eq!(err, AttemptError::NavigationTimeout(Duration::from_secs(25)));
        assert_eq!(h.launcher.pages_closed(), 1);
    }

    #[tokio::test]
    async fn download_failure_is_reported() {
        let h = harness();
        h.site.page(
            "https://site.test/erin/",
            FakeDoc::new().meta("og:image", "https://cdn.test/erin.jpg"),
        );
        h.downloader.fail("https://cdn.test/erin.jpg", "HTTP 403");
        assert_eq!(
            h.worker.fetch("erin").await.unwrap_err(),
            AttemptError::Download("HTTP 403".into())
        );
    }

    #[tokio::test]
    async fn launch_failure_is_fatal() {
        let h = harness();
        h.launcher.fail_launches(true);
        let err = h.worker.fetch("frank").await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn refused_page_after_relaunch_is_fatal() {
        let h = harness();
        h.launcher.fail_pages_after(0);
        let err = h.worker.fetch("gina").await.unwrap_err();
        assert!(matches!(err, AttemptError::Engine(_)));
        assert!(err.is_fatal());
        assert_eq!(h.launcher.launches(), 2);
    }

    #[test]
    fn artifact_path_is_sanitized() {
        let h = harness();
        assert!(h.worker.artifact_path("../x").ends_with("pfp/_.._x-d6b96a97.jpg"));
        assert_eq!(h.worker.target_url("alice"), "https://site.test/alice/");
    }
}
