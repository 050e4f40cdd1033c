//! Browsing engine seam.
//!
//! The rest of the crate talks to the browser only through these traits:
//! an `EngineLauncher` starts an `Engine` process, an `Engine` opens isolated
//! `PageContext`s. `EngineLifecycle` owns the one shared engine, applies the
//! session, user agent and resource filter to every context, and recycles the
//! process after a threshold. The real binding is `chromium::ChromiumLauncher`.

use async_trait::async_trait;
use std::sync::Arc;

use crate::session::SessionCookie;

pub mod chromium;
mod filter;
mod lease;
mod lifecycle;
mod user_agent;

pub use filter::{ResourceFilter, ResourceKind};
pub use lease::PageLease;
pub use lifecycle::EngineLifecycle;
pub use user_agent::UserAgentRotation;

/// Failure inside the engine binding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("engine launch failed: {0}")]
    Launch(String),
    #[error("page setup failed: {0}")]
    Page(String),
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("page evaluation failed: {0}")]
    Evaluate(String),
    #[error("no element matches {0}")]
    NoElement(String),
    #[error("engine is closed")]
    Closed,
}

/// What a new page context is prepared with before it is handed out.
#[derive(Debug, Clone, Default)]
pub struct PageSetup {
    pub user_agent: Option<String>,
    pub cookies: Vec<SessionCookie>,
    pub filter: ResourceFilter,
}

/// Starts an engine process.
#[async_trait]
pub trait EngineLauncher: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn Engine>, EngineError>;
}

/// One running engine process.
#[async_trait]
pub trait Engine: Send + Sync {
    async fn new_page(&self, setup: &PageSetup) -> Result<Box<dyn PageContext>, EngineError>;

    /// Shut the process down. Called once by `EngineLifecycle`.
    async fn close(&self) -> Result<(), EngineError>;
}

/// An isolated, short-lived page borrowed from the engine.
#[async_trait]
pub trait PageContext: Send + Sync {
    /// Navigate and wait for the document to load.
    async fn goto(&self, url: &str) -> Result<(), EngineError>;

    async fn current_url(&self) -> Result<String, EngineError>;

    /// Serialized DOM of the current document.
    async fn content(&self) -> Result<String, EngineError>;

    /// `content` of `<meta property="..">` (or `name=".."`), if present.
    async fn meta_content(&self, property: &str) -> Result<Option<String>, EngineError>;

    /// Attribute of the first element matching `selector`.
    async fn attribute(&self, selector: &str, attr: &str) -> Result<Option<String>, EngineError>;

    async fn exists(&self, selector: &str) -> Result<bool, EngineError>;

    async fn fill(&self, selector: &str, value: &str) -> Result<(), EngineError>;

    async fn click(&self, selector: &str) -> Result<(), EngineError>;

    async fn wait_for_navigation(&self) -> Result<(), EngineError>;

    /// Cookies currently held by the browser for this page.
    async fn cookies(&self) -> Result<Vec<SessionCookie>, EngineError>;

    async fn close(self: Box<Self>) -> Result<(), EngineError>;
}
