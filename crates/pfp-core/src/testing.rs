//! In-crate fakes for the engine, page, downloader and fetch seams.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::engine::{Engine, EngineError, EngineLauncher, PageContext, PageSetup};
use crate::fetch::{Fetcher, ResourceDownloader};
use crate::retry::AttemptError;
use crate::session::SessionCookie;

pub(crate) fn cookie(name: &str, value: &str) -> SessionCookie {
    SessionCookie {
        name: name.to_string(),
        value: value.to_string(),
        domain: ".site.test".to_string(),
        path: "/".to_string(),
        expires: None,
        secure: true,
        http_only: true,
    }
}

/// A document served by `FakeSite` at one URL.
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeDoc {
    html: String,
    meta: HashMap<String, String>,
    attrs: HashMap<(String, String), String>,
    present: HashSet<String>,
    requires_cookie: Option<(String, String)>,
    nav_error: Option<EngineError>,
    nav_delay: Option<Duration>,
    eval_error: bool,
    bad_selectors: HashSet<String>,
}

impl FakeDoc {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn html(mut self, html: &str) -> Self {
        self.html = html.to_string();
        self
    }

    pub(crate) fn meta(mut self, property: &str, content: &str) -> Self {
        self.meta.insert(property.to_string(), content.to_string());
        self
    }

    pub(crate) fn attr(mut self, selector: &str, attr: &str, value: &str) -> Self {
        self.attrs
            .insert((selector.to_string(), attr.to_string()), value.to_string());
        self.present.insert(selector.to_string());
        self
    }

    pub(crate) fn present(mut self, selector: &str) -> Self {
        self.present.insert(selector.to_string());
        self
    }

    /// Served only to pages holding this cookie; others get an empty document.
    pub(crate) fn requires_cookie(mut self, name: &str, value: &str) -> Self {
        self.requires_cookie = Some((name.to_string(), value.to_string()));
        self
    }

    pub(crate) fn nav_error(mut self, e: EngineError) -> Self {
        self.nav_error = Some(e);
        self
    }

    pub(crate) fn nav_delay(mut self, d: Duration) -> Self {
        self.nav_delay = Some(d);
        self
    }

    pub(crate) fn eval_error(mut self) -> Self {
        self.eval_error = true;
        self
    }

    /// Queries for `selector` fail to evaluate; other selectors still work.
    pub(crate) fn bad_selector(mut self, selector: &str) -> Self {
        self.bad_selectors.insert(selector.to_string());
        self
    }
}

/// Login form behaviour: matching credentials land on `landing` with `cookies` set.
#[derive(Debug, Clone)]
pub(crate) struct FakeLogin {
    pub username: String,
    pub password: String,
    pub landing: String,
    pub cookies: Vec<SessionCookie>,
}

/// A scripted website shared by every fake page.
#[derive(Default)]
pub(crate) struct FakeSite {
    docs: Mutex<HashMap<String, FakeDoc>>,
    login: Mutex<Option<FakeLogin>>,
    visits: Mutex<Vec<String>>,
    submits: AtomicUsize,
}

impl FakeSite {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn page(&self, url: &str, doc: FakeDoc) {
        self.docs.lock().unwrap().insert(url.to_string(), doc);
    }

    pub(crate) fn login(&self, login: FakeLogin) {
        *self.login.lock().unwrap() = Some(login);
    }

    pub(crate) fn visits(&self) -> Vec<String> {
        self.visits.lock().unwrap().clone()
    }

    pub(crate) fn submits(&self) -> usize {
        self.submits.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct Counters {
    launches: AtomicUsize,
    closes: AtomicUsize,
    pages_opened: AtomicUsize,
    pages_closed: AtomicUsize,
    setups: Mutex<Vec<PageSetup>>,
    /// Pages handed out before every engine starts refusing; `None` is unlimited.
    page_limit: Mutex<Option<usize>>,
    fail_next_page: AtomicBool,
}

pub(crate) struct FakeLauncher {
    site: Arc<FakeSite>,
    counters: Arc<Counters>,
    fail: AtomicBool,
}

impl FakeLauncher {
    pub(crate) fn new(site: Arc<FakeSite>) -> Self {
        Self {
            site,
            counters: Arc::new(Counters::default()),
            fail: AtomicBool::new(false),
        }
    }

    pub(crate) fn fail_launches(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Every engine refuses new pages once `n` have been opened in total.
    pub(crate) fn fail_pages_after(&self, n: usize) {
        *self.counters.page_limit.lock().unwrap() = Some(n);
    }

    /// The next `new_page` call fails, as after a renderer crash.
    pub(crate) fn fail_next_page(&self) {
        self.counters.fail_next_page.store(true, Ordering::SeqCst);
    }

    pub(crate) fn launches(&self) -> usize {
        self.counters.launches.load(Ordering::SeqCst)
    }

    pub(crate) fn closes(&self) -> usize {
        self.counters.closes.load(Ordering::SeqCst)
    }

    pub(crate) fn pages_opened(&self) -> usize {
        self.counters.pages_opened.load(Ordering::SeqCst)
    }

    pub(crate) fn pages_closed(&self) -> usize {
        self.counters.pages_closed.load(Ordering::SeqCst)
    }

    pub(crate) fn setups(&self) -> Vec<PageSetup> {
        self.counters.setups.lock().unwrap().clone()
    }
}

#[async_trait]
impl EngineLauncher for FakeLauncher {
    async fn launch(&self) -> Result<Arc<dyn Engine>, EngineError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(EngineError::Launch("no browser binary".into()));
        }
        self.counters.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeEngine {
            site: Arc::clone(&self.site),
            counters: Arc::clone(&self.counters),
        }))
    }
}

struct FakeEngine {
    site: Arc<FakeSite>,
    counters: Arc<Counters>,
}

#[async_trait]
impl Engine for FakeEngine {
    async fn new_page(&self, setup: &PageSetup) -> Result<Box<dyn PageContext>, EngineError> {
        if self.counters.fail_next_page.swap(false, Ordering::SeqCst) {
            return Err(EngineError::Page("target crashed".into()));
        }
        let limit = *self.counters.page_limit.lock().unwrap();
        if matches!(limit, Some(n) if self.counters.pages_opened.load(Ordering::SeqCst) >= n) {
            return Err(EngineError::Page("target crashed".into()));
        }
        self.counters.pages_opened.fetch_add(1, Ordering::SeqCst);
        self.counters.setups.lock().unwrap().push(setup.clone());
        Ok(Box::new(FakePage {
            site: Arc::clone(&self.site),
            counters: Arc::clone(&self.counters),
            url: Mutex::new("about:blank".to_string()),
            cookies: Mutex::new(setup.cookies.clone()),
            filled: Mutex::new(Vec::new()),
        }))
    }

    async fn close(&self) -> Result<(), EngineError> {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FakePage {
    site: Arc<FakeSite>,
    counters: Arc<Counters>,
    url: Mutex<String>,
    cookies: Mutex<Vec<SessionCookie>>,
    filled: Mutex<Vec<String>>,
}

impl FakePage {
    /// Current document as this page sees it.
    fn doc(&self) -> Result<FakeDoc, EngineError> {
        let url = self.url.lock().unwrap().clone();
        let doc = self.site.docs.lock().unwrap().get(&url).cloned();
        let Some(doc) = doc else {
            return Ok(FakeDoc::default());
        };
        if doc.eval_error {
            return Err(EngineError::Evaluate("execution context destroyed".into()));
        }
        if let Some((name, value)) = &doc.requires_cookie {
            let ok = self
                .cookies
                .lock()
                .unwrap()
                .iter()
                .any(|c| &c.name == name && &c.value == value);
            if !ok {
                return Ok(FakeDoc::default());
            }
        }
        Ok(doc)
    }
}

#[async_trait]
impl PageContext for FakePage {
    async fn goto(&self, url: &str) -> Result<(), EngineError> {
        self.site.visits.lock().unwrap().push(url.to_string());
        let doc = self.site.docs.lock().unwrap().get(url).cloned();
        if let Some(doc) = doc {
            if let Some(d) = doc.nav_delay {
                tokio::time::sleep(d).await;
            }
            if let Some(e) = doc.nav_error {
                return Err(e);
            }
        }
        *self.url.lock().unwrap() = url.to_string();
        Ok(())
    }

    async fn current_url(&self) -> Result<String, EngineError> {
        Ok(self.url.lock().unwrap().clone())
    }

    async fn content(&self) -> Result<String, EngineError> {
        Ok(self.doc()?.html)
    }

    async fn meta_content(&self, property: &str) -> Result<Option<String>, EngineError> {
        Ok(self.doc()?.meta.get(property).cloned())
    }

    async fn attribute(&self, selector: &str, attr: &str) -> Result<Option<String>, EngineError> {
        let doc = self.doc()?;
        if doc.bad_selectors.contains(selector) {
            return Err(EngineError::Evaluate(format!("invalid selector: {}", selector)));
        }
        Ok(doc
            .attrs
            .get(&(selector.to_string(), attr.to_string()))
            .cloned())
    }

    async fn exists(&self, selector: &str) -> Result<bool, EngineError> {
        Ok(self.doc()?.present.contains(selector))
    }

    async fn fill(&self, _selector: &str, value: &str) -> Result<(), EngineError> {
        self.filled.lock().unwrap().push(value.to_string());
        Ok(())
    }

    async fn click(&self, _selector: &str) -> Result<(), EngineError> {
        self.site.submits.fetch_add(1, Ordering::SeqCst);
        let login = self.site.login.lock().unwrap().clone();
        if let Some(login) = login {
            let filled = self.filled.lock().unwrap().clone();
            if filled.contains(&login.username) && filled.contains(&login.password) {
                *self.url.lock().unwrap() = login.landing.clone();
                self.cookies.lock().unwrap().extend(login.cookies.iter().cloned());
            }
        }
        Ok(())
    }

    async fn wait_for_navigation(&self) -> Result<(), EngineError> {
        Ok(())
    }

    async fn cookies(&self) -> Result<Vec<SessionCookie>, EngineError> {
        Ok(self.cookies.lock().unwrap().clone())
    }

    async fn close(self: Box<Self>) -> Result<(), EngineError> {
        self.counters.pages_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Downloader that writes fixed bytes, or fails for URLs registered with `fail`.
#[derive(Default)]
pub(crate) struct FakeDownloader {
    failures: Mutex<HashMap<String, String>>,
    calls: Mutex<Vec<(String, PathBuf)>>,
}

impl FakeDownloader {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn fail(&self, url: &str, reason: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert(url.to_string(), reason.to_string());
    }

    pub(crate) fn calls(&self) -> Vec<(String, PathBuf)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResourceDownloader for FakeDownloader {
    async fn download(&self, url: &str, dest: &Path, _user_agent: Option<&str>) -> Result<u64, AttemptError> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), dest.to_path_buf()));
        if let Some(reason) = self.failures.lock().unwrap().get(url) {
            return Err(AttemptError::Download(reason.clone()));
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AttemptError::Download(e.to_string()))?;
        }
        std::fs::write(dest, b"\xff\xd8jpeg").map_err(|e| AttemptError::Download(e.to_string()))?;
        Ok(6)
    }
}

/// Fetcher with per-identifier scripted results, a fixed per-attempt duration,
/// and a record of concurrency.
#[derive(Default)]
pub(crate) struct ScriptedFetcher {
    scripts: Mutex<HashMap<String, Vec<Result<(), AttemptError>>>>,
    duration: Duration,
    attempts: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    active_ids: Mutex<HashSet<String>>,
    overlap: AtomicBool,
}

impl ScriptedFetcher {
    pub(crate) fn new(duration: Duration) -> Self {
        Self {
            duration,
            ..Self::default()
        }
    }

    /// Results for successive attempts of `id`; attempts past the end succeed.
    pub(crate) fn script(self, id: &str, results: Vec<Result<(), AttemptError>>) -> Self {
        self.scripts.lock().unwrap().insert(id.to_string(), results);
        self
    }

    pub(crate) fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }

    pub(crate) fn attempts_for(&self, id: &str) -> usize {
        self.attempts().iter().filter(|a| *a == id).count()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// True if the same identifier was ever attempted by two workers at once.
    pub(crate) fn saw_overlap(&self) -> bool {
        self.overlap.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, id: &str) -> Result<PathBuf, AttemptError> {
        let n = {
            let mut attempts = self.attempts.lock().unwrap();
            attempts.push(id.to_string());
            attempts.iter().filter(|a| *a == id).count()
        };
        if !self.active_ids.lock().unwrap().insert(id.to_string()) {
            self.overlap.store(true, Ordering::SeqCst);
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.duration).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.active_ids.lock().unwrap().remove(id);
        let result = self
            .scripts
            .lock()
            .unwrap()
            .get(id)
            .and_then(|r| r.get(n - 1).cloned())
            .unwrap_or(Ok(()));
        result.map(|()| PathBuf::from(format!("{}.jpg", id)))
    }
}
