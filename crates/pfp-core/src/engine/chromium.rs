//! Headless Chromium binding over CDP (`chromiumoxide`).

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams, EventRequestPaused, FailRequestParams,
};
use chromiumoxide::cdp::browser_protocol::network::{
    Cookie, CookieParam, ErrorReason, ResourceType, SetUserAgentOverrideParams, TimeSinceEpoch,
};
use chromiumoxide::Page;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::config::PfpConfig;
use crate::session::SessionCookie;

use super::{Engine, EngineError, EngineLauncher, PageContext, PageSetup, ResourceFilter, ResourceKind};

/// Launches a local Chromium with the configured options.
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    headless: bool,
    no_sandbox: bool,
    request_timeout: Duration,
}

impl ChromiumLauncher {
    pub fn from_config(cfg: &PfpConfig) -> Self {
        Self {
            headless: cfg.headless,
            no_sandbox: cfg.no_sandbox,
            request_timeout: cfg.timeouts.protocol(),
        }
    }
}

#[async_trait]
impl EngineLauncher for ChromiumLauncher {
    async fn launch(&self) -> Result<Arc<dyn Engine>, EngineError> {
        let mut builder = BrowserConfig::builder()
            .request_timeout(self.request_timeout)
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--mute-audio");
        if !self.headless {
            builder = builder.with_head();
        }
        if self.no_sandbox {
            builder = builder.no_sandbox();
        }
        let config = builder.build().map_err(EngineError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| EngineError::Launch(e.to_string()))?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("chromium handler event error: {}", e);
                }
            }
        });
        tracing::debug!(headless = self.headless, "chromium launched");

        Ok(Arc::new(ChromiumEngine {
            browser: tokio::sync::Mutex::new(browser),
            handler_task,
        }))
    }
}

struct ChromiumEngine {
    browser: tokio::sync::Mutex<Browser>,
    handler_task: JoinHandle<()>,
}

#[async_trait]
impl Engine for ChromiumEngine {
    async fn new_page(&self, setup: &PageSetup) -> Result<Box<dyn PageContext>, EngineError> {
        let page = {
            let browser = self.browser.lock().await;
            browser.new_page("about:blank").await.map_err(page_err)?
        };
        if let Some(ua) = &setup.user_agent {
            page.execute(SetUserAgentOverrideParams::new(ua.clone()))
                .await
                .map_err(page_err)?;
        }
        if !setup.cookies.is_empty() {
            page.set_cookies(setup.cookies.iter().map(cookie_param).collect())
                .await
                .map_err(page_err)?;
        }
        let interceptor = if setup.filter.is_permissive() {
            None
        } else {
            Some(install_filter(&page, setup.filter.clone()).await?)
        };
        Ok(Box::new(ChromiumPage { page, interceptor }))
    }

    async fn close(&self) -> Result<(), EngineError> {
        let mut browser = self.browser.lock().await;
        let res = browser
            .close()
            .await
            .map(|_| ())
            .map_err(|e| EngineError::Page(e.to_string()));
        if let Err(e) = browser.wait().await {
            tracing::debug!("waiting for chromium exit: {}", e);
        }
        self.handler_task.abort();
        res
    }
}

/// Enable the Fetch domain and answer every paused request per `filter`.
async fn install_filter(page: &Page, filter: ResourceFilter) -> Result<JoinHandle<()>, EngineError> {
    let mut paused = page
        .event_listener::<EventRequestPaused>()
        .await
        .map_err(page_err)?;
    page.execute(EnableParams::default()).await.map_err(page_err)?;

    let page = page.clone();
    Ok(tokio::spawn(async move {
        while let Some(event) = paused.next().await {
            let kind = resource_kind(&event.resource_type);
            let res = if filter.allows(kind) {
                page.execute(ContinueRequestParams::new(event.request_id.clone()))
                    .await
                    .map(|_| ())
            } else {
                page.execute(FailRequestParams::new(
                    event.request_id.clone(),
                    ErrorReason::BlockedByClient,
                ))
                .await
                .map(|_| ())
            };
            if let Err(e) = res {
                tracing::trace!(?kind, "request interception reply failed: {}", e);
            }
        }
    }))
}

fn resource_kind(t: &ResourceType) -> ResourceKind {
    match t {
        ResourceType::Document => ResourceKind::Document,
        ResourceType::Stylesheet => ResourceKind::Stylesheet,
        ResourceType::Image => ResourceKind::Image,
        ResourceType::Media => ResourceKind::Media,
        ResourceType::Font => ResourceKind::Font,
        ResourceType::Script => ResourceKind::Script,
        ResourceType::Xhr => ResourceKind::Xhr,
        ResourceType::Fetch => ResourceKind::Fetch,
        ResourceType::WebSocket => ResourceKind::WebSocket,
        _ => ResourceKind::Other,
    }
}

fn cookie_param(c: &SessionCookie) -> CookieParam {
    let mut p = CookieParam::new(c.name.clone(), c.value.clone());
    p.domain = Some(c.domain.clone());
    p.path = Some(c.path.clone());
    p.secure = Some(c.secure);
    p.http_only = Some(c.http_only);
    p.expires = c.expires.map(TimeSinceEpoch::new);
    p
}

fn session_cookie(c: Cookie) -> SessionCookie {
    SessionCookie {
        expires: (!c.session && c.expires > 0.0).then_some(c.expires),
        name: c.name,
        value: c.value,
        domain: c.domain,
        path: c.path,
        secure: c.secure,
        http_only: c.http_only,
    }
}

fn page_err(e: impl std::fmt::Display) -> EngineError {
    EngineError::Page(e.to_string())
}

fn eval_err(e: impl std::fmt::Display) -> EngineError {
    EngineError::Evaluate(e.to_string())
}

/// JS string literal for `s`.
fn js_str(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

struct ChromiumPage {
    page: Page,
    interceptor: Option<JoinHandle<()>>,
}

impl ChromiumPage {
    async fn eval_string(&self, js: String) -> Result<Option<String>, EngineError> {
        let s: String = self
            .page
            .evaluate(js)
            .await
            .map_err(eval_err)?
            .into_value()
            .map_err(eval_err)?;
        Ok(Some(s).filter(|s| !s.is_empty()))
    }
}

#[async_trait]
impl PageContext for ChromiumPage {
    async fn goto(&self, url: &str) -> Result<(), EngineError> {
        self.page
            .goto(url)
            .await
            .map(|_| ())
            .map_err(|e| EngineError::Navigation(e.to_string()))
    }

    async fn current_url(&self) -> Result<String, EngineError> {
        Ok(self.page.url().await.map_err(page_err)?.unwrap_or_default())
    }

    async fn content(&self) -> Result<String, EngineError> {
        self.page.content().await.map_err(eval_err)
    }

    async fn meta_content(&self, property: &str) -> Result<Option<String>, EngineError> {
        let selector = format!(
            "meta[property=\"{p}\"], meta[name=\"{p}\"]",
            p = property.replace('"', "\\\"")
        );
        self.attribute(&selector, "content").await
    }

    async fn attribute(&self, selector: &str, attr: &str) -> Result<Option<String>, EngineError> {
        // Empty string stands in for null: a null result carries no value over CDP.
        let js = format!(
            "(() => {{ const el = document.querySelector({}); return el ? (el.getAttribute({}) || '') : ''; }})()",
            js_str(selector),
            js_str(attr)
        );
        self.eval_string(js).await
    }

    async fn exists(&self, selector: &str) -> Result<bool, EngineError> {
        let js = format!("document.querySelector({}) !== null", js_str(selector));
        self.page
            .evaluate(js)
            .await
            .map_err(eval_err)?
            .into_value()
            .map_err(eval_err)
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<(), EngineError> {
        let el = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| EngineError::NoElement(selector.to_string()))?;
        el.click().await.map_err(page_err)?;
        el.type_str(value).await.map_err(page_err)?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<(), EngineError> {
        let el = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| EngineError::NoElement(selector.to_string()))?;
        el.click().await.map_err(page_err)?;
        Ok(())
    }

    async fn wait_for_navigation(&self) -> Result<(), EngineError> {
        self.page
            .wait_for_navigation()
            .await
            .map(|_| ())
            .map_err(|e| EngineError::Navigation(e.to_string()))
    }

    async fn cookies(&self) -> Result<Vec<SessionCookie>, EngineError> {
        let cookies = self.page.get_cookies().await.map_err(page_err)?;
        Ok(cookies.into_iter().map(session_cookie).collect())
    }

    async fn close(self: Box<Self>) -> Result<(), EngineError> {
        if let Some(task) = &self.interceptor {
            task.abort();
        }
        self.page.close().await.map_err(page_err)
    }
}
