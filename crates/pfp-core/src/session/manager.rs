//! Session state machine: reuse a cached session if it still works, else log in.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::{PfpConfig, SiteConfig};
use crate::engine::{EngineError, EngineLifecycle, PageLease};

use super::cache::SessionContext;
use super::credentials::CredentialProvider;

/// Where the manager is in establishing a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NoSession,
    ValidatingCached,
    NoValidCache,
    LoggingIn,
    Authenticated,
    LoginFailed,
}

/// Session failures. All of them abort the run.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no credentials available")]
    NoCredentials,
    #[error("login requires a challenge or verification step (landed on {0})")]
    Challenge(String),
    #[error("login failed: {0}")]
    LoginFailed(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Establishes the authenticated session and installs it into the engine.
pub struct SessionManager {
    cache_path: PathBuf,
    site: SiteConfig,
    navigation_timeout: Duration,
    settle: Duration,
    credentials: Arc<dyn CredentialProvider>,
    state: Mutex<SessionState>,
}

impl SessionManager {
    pub fn new(
        cache_path: PathBuf,
        site: SiteConfig,
        navigation_timeout: Duration,
        settle: Duration,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            cache_path,
            site,
            navigation_timeout,
            settle,
            credentials,
            state: Mutex::new(SessionState::NoSession),
        }
    }

    pub fn from_config(
        cfg: &PfpConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> anyhow::Result<Self> {
        Ok(Self::new(
            cfg.session_cache_path()?,
            cfg.site.clone(),
            cfg.timeouts.navigation(),
            cfg.timeouts.settle(),
            credentials,
        ))
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn transition(&self, to: SessionState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        tracing::debug!(from = ?*state, to = ?to, "session state");
        *state = to;
    }

    /// Validate the cached session, logging in if it is missing or stale.
    /// On success the session is installed into `engine` and returned.
    pub async fn establish(
        &self,
        engine: &EngineLifecycle,
    ) -> Result<Arc<SessionContext>, SessionError> {
        if let Some(session) = self.validate_cached(engine).await? {
            return Ok(session);
        }
        match self.login(engine).await {
            Ok(session) => Ok(session),
            Err(e) => {
                self.transition(SessionState::LoginFailed);
                tracing::error!("login failed: {}", e);
                Err(e)
            }
        }
    }

    /// `Ok(None)` for any cache problem short of an engine failure.
    pub async fn validate_cached(
        &self,
        engine: &EngineLifecycle,
    ) -> Result<Option<Arc<SessionContext>>, SessionError> {
        self.transition(SessionState::ValidatingCached);
        let cached = match SessionContext::load(&self.cache_path) {
            Ok(Some(ctx)) if !ctx.is_empty() => ctx,
            Ok(_) => {
                tracing::info!(path = %self.cache_path.display(), "no cached session");
                self.transition(SessionState::NoValidCache);
                return Ok(None);
            }
            Err(e) => {
                tracing::warn!("ignoring unreadable session cache: {:#}", e);
                self.transition(SessionState::NoValidCache);
                return Ok(None);
            }
        };

        engine.install_session(Arc::new(cached.clone()));
        let lease = engine.new_context().await?;
        let valid = self.is_signed_in(&lease).await;
        lease.release().await;

        if valid {
            let session = Arc::new(cached.into_validated());
            engine.install_session(Arc::clone(&session));
            tracing::info!("cached session is valid");
            self.transition(SessionState::Authenticated);
            Ok(Some(session))
        } else {
            engine.install_session(Arc::new(SessionContext::default()));
            tracing::info!("cached session is no longer valid");
            self.transition(SessionState::NoValidCache);
            Ok(None)
        }
    }

    /// Navigate to the check page and look for the signed-in indicator.
    async fn is_signed_in(&self, page: &PageLease) -> bool {
        match tokio::time::timeout(self.navigation_timeout, page.goto(&self.site.check_url)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!("session check navigation failed: {}", e);
                return false;
            }
            Err(_) => {
                tracing::debug!("session check navigation timed out");
                return false;
            }
        }
        match page.exists(&self.site.auth_indicator).await {
            Ok(found) => found,
            Err(e) => {
                tracing::debug!("session check evaluation failed: {}", e);
                false
            }
        }
    }

    /// Drive the login form, then harvest and persist the cookies.
    pub async fn login(&self, engine: &EngineLifecycle) -> Result<Arc<SessionContext>, SessionError> {
        self.transition(SessionState::LoggingIn);
        let creds = self
            .credentials
            .credentials()
            .await
            .ok_or(SessionError::NoCredentials)?;

        engine.install_session(Arc::new(SessionContext::default()));
        let lease = engine.new_context().await?;
        let result = self.submit_login(&lease, &creds.username, &creds.password).await;
        let result = match result {
            Ok(()) => lease
                .cookies()
                .await
                .map_err(SessionError::from),
            Err(e) => Err(e),
        };
        lease.release().await;
        let cookies = result?;

        let session = Arc::new(SessionContext::new(cookies).into_validated());
        if let Err(e) = session.save(&self.cache_path) {
            tracing::warn!("could not persist session cache: {:#}", e);
        }
        engine.install_session(Arc::clone(&session));
        self.transition(SessionState::Authenticated);
        tracing::info!(user = %creds.username, "logged in");
        Ok(session)
    }

    async fn submit_login(
        &self,
        page: &PageLease,
        username: &str,
        password: &str,
    ) -> Result<(), SessionError> {
        let site = &self.site;
        match tokio::time::timeout(self.navigation_timeout, page.goto(&site.login_url)).await {
            Ok(res) => res?,
            Err(_) => return Err(SessionError::LoginFailed("login page timed out".into())),
        }
        page.fill(&site.username_selector, username).await?;
        page.fill(&site.password_selector, password).await?;
        page.click(&site.submit_selector).await?;
        // Single-page logins may not navigate at all.
        match tokio::time::timeout(self.navigation_timeout, page.wait_for_navigation()).await {
            Ok(Err(e)) => tracing::debug!("post-login navigation: {}", e),
            Err(_) => tracing::debug!("post-login navigation timed out"),
            Ok(Ok(())) => {}
        }
        tokio::time::sleep(self.settle).await;

        let landed = page.current_url().await?;
        if site.challenge_markers.iter().any(|m| landed.contains(m.as_str())) {
            return Err(SessionError::Challenge(landed));
        }
        if !self.is_signed_in(page).await {
            return Err(SessionError::LoginFailed(
                "signed-in indicator absent after submitting credentials".into(),
            ));
        }
        Ok(())
    }
}
