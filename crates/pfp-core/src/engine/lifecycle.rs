//! Owner of the shared engine process: lazy launch, recycling, close.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedRwLockReadGuard, RwLock};

use crate::config::PfpConfig;
use crate::session::SessionContext;

use super::lease::PageLease;
use super::{Engine, EngineError, EngineLauncher, PageSetup, ResourceFilter, UserAgentRotation};

/// The engine slot. Leases hold it shared; launch, recycle and close hold it exclusively.
pub(crate) struct Slot {
    engine: Option<Arc<dyn Engine>>,
    generation: u64,
    contexts: AtomicUsize,
    /// Set when the engine stopped handing out pages; the next claim relaunches.
    dead: AtomicBool,
}

impl Slot {
    /// Count one more context against the current engine, if it has room.
    fn try_claim(&self, recycle_after: usize) -> bool {
        if self.engine.is_none() || self.dead.load(Ordering::SeqCst) {
            return false;
        }
        recycle_after == 0 || self.contexts.fetch_add(1, Ordering::SeqCst) < recycle_after
    }

    fn exhausted(&self, recycle_after: usize) -> bool {
        self.engine.is_none()
            || self.dead.load(Ordering::SeqCst)
            || (recycle_after > 0 && self.contexts.load(Ordering::SeqCst) >= recycle_after)
    }
}

/// Hands out page contexts from one shared engine, relaunching it every
/// `recycle_after` contexts (0 disables recycling).
pub struct EngineLifecycle {
    launcher: Arc<dyn EngineLauncher>,
    slot: Arc<RwLock<Slot>>,
    session: std::sync::RwLock<Option<Arc<SessionContext>>>,
    agents: UserAgentRotation,
    filter: ResourceFilter,
    recycle_after: usize,
    closed: AtomicBool,
}

impl EngineLifecycle {
    pub fn new(
        launcher: Arc<dyn EngineLauncher>,
        agents: UserAgentRotation,
        filter: ResourceFilter,
        recycle_after: usize,
    ) -> Self {
        Self {
            launcher,
            slot: Arc::new(RwLock::new(Slot {
                engine: None,
                generation: 0,
                contexts: AtomicUsize::new(0),
                dead: AtomicBool::new(false),
            })),
            session: std::sync::RwLock::new(None),
            agents,
            filter,
            recycle_after,
            closed: AtomicBool::new(false),
        }
    }

    pub fn from_config(launcher: Arc<dyn EngineLauncher>, cfg: &PfpConfig) -> Self {
        Self::new(
            launcher,
            UserAgentRotation::new(cfg.user_agents.clone()),
            ResourceFilter::default(),
            cfg.recycle_after,
        )
    }

    /// Apply `session` to every context created from now on.
    pub fn install_session(&self, session: Arc<SessionContext>) {
        *self.session.write().unwrap_or_else(|e| e.into_inner()) = Some(session);
    }

    pub fn session(&self) -> Option<Arc<SessionContext>> {
        self.session.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of launches so far.
    pub async fn generation(&self) -> u64 {
        self.slot.read().await.generation
    }

    /// Open a page context, launching or recycling the engine first if needed.
    /// A page that cannot be created marks the engine dead; it is relaunched
    /// once and a second failure is returned.
    pub async fn new_context(&self) -> Result<PageLease, EngineError> {
        let mut relaunched = false;
        loop {
            let slot = self.claim().await?;
            let engine = slot.engine.clone().ok_or(EngineError::Closed)?;
            let generation = slot.generation;
            let setup = PageSetup {
                user_agent: self.agents.next(),
                cookies: self
                    .session()
                    .map(|s| s.cookies.clone())
                    .unwrap_or_default(),
                filter: self.filter.clone(),
            };
            match engine.new_page(&setup).await {
                Ok(page) => return Ok(PageLease::new(page, slot, generation, setup.user_agent)),
                Err(e) => {
                    slot.dead.store(true, Ordering::SeqCst);
                    if relaunched {
                        tracing::error!(generation, "page creation failed after relaunch: {}", e);
                        return Err(e);
                    }
                    tracing::warn!(generation, "page creation failed, relaunching engine: {}", e);
                    relaunched = true;
                }
            }
        }
    }

    async fn claim(&self) -> Result<OwnedRwLockReadGuard<Slot>, EngineError> {
        loop {
            self.ensure_open()?;
            let slot = Arc::clone(&self.slot).read_owned().await;
            if slot.try_claim(self.recycle_after) {
                return Ok(slot);
            }
            drop(slot);
            self.refresh().await?;
        }
    }

    /// Under the exclusive lock: launch if there is no engine, or close and
    /// relaunch if the current one has served its share of contexts.
    async fn refresh(&self) -> Result<(), EngineError> {
        let mut slot = self.slot.write().await;
        self.ensure_open()?;
        if !slot.exhausted(self.recycle_after) {
            return Ok(());
        }
        if let Some(old) = slot.engine.take() {
            tracing::info!(generation = slot.generation, "recycling engine");
            if let Err(e) = old.close().await {
                tracing::warn!(generation = slot.generation, "engine close failed: {}", e);
            }
        }
        let engine = self.launcher.launch().await?;
        slot.engine = Some(engine);
        slot.generation += 1;
        slot.contexts.store(0, Ordering::SeqCst);
        slot.dead.store(false, Ordering::SeqCst);
        tracing::info!(generation = slot.generation, "engine launched");
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), EngineError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EngineError::Closed);
        }
        Ok(())
    }

    /// Release the engine. Waits for outstanding leases. Later calls are no-ops.
    pub async fn close(&self) -> Result<(), EngineError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let mut slot = self.slot.write().await;
        match slot.engine.take() {
            Some(engine) => {
                tracing::info!(generation = slot.generation, "closing engine");
                engine.close().await
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionCookie;
    use crate::testing::{FakeLauncher, FakeSite};
    use std::time::Duration;

    fn lifecycle(launcher: &Arc<FakeLauncher>, threshold: usize) -> EngineLifecycle {
        EngineLifecycle::new(
            Arc::clone(launcher) as Arc<dyn EngineLauncher>,
            UserAgentRotation::new(vec!["ua-1".into(), "ua-2".into()]),
            ResourceFilter::default(),
            threshold,
        )
    }

    #[tokio::test]
    async fn recycles_after_threshold() {
        let launcher = Arc::new(FakeLauncher::new(FakeSite::new()));
        let engine = lifecycle(&launcher, 2);
        for _ in 0..5 {
            engine.new_context().await.unwrap().release().await;
        }
        assert_eq!(launcher.launches(), 3);
        assert_eq!(launcher.closes(), 2);
        assert_eq!(engine.generation().await, 3);

        engine.close().await.unwrap();
        engine.close().await.unwrap();
        assert_eq!(launcher.closes(), 3);
        assert!(matches!(
            engine.new_context().await,
            Err(EngineError::Closed)
        ));
    }

    #[tokio::test]
    async fn launch_is_lazy_and_failure_is_reported() {
        let launcher = Arc::new(FakeLauncher::new(FakeSite::new()));
        launcher.fail_launches(true);
        let engine = lifecycle(&launcher, 50);
        assert_eq!(launcher.launches(), 0);
        assert!(matches!(
            engine.new_context().await,
            Err(EngineError::Launch(_))
        ));

        launcher.fail_launches(false);
        let lease = engine.new_context().await.unwrap();
        assert_eq!(lease.generation(), 1);
        lease.release().await;
    }

    #[tokio::test]
    async fn contexts_get_session_cookies_and_rotated_agents() {
        let launcher = Arc::new(FakeLauncher::new(FakeSite::new()));
        let engine = lifecycle(&launcher, 0);
        engine.install_session(Arc::new(SessionContext::new(vec![SessionCookie {
            name: "sessionid".into(),
            value: "s1".into(),
            domain: ".example.test".into(),
            path: "/".into(),
            expires: None,
            secure: true,
            http_only: true,
        }])));

        engine.new_context().await.unwrap().release().await;
        engine.new_context().await.unwrap().release().await;
        engine.new_context().await.unwrap().release().await;

        let setups = launcher.setups();
        assert_eq!(setups.len(), 3);
        assert_eq!(setups[0].cookies[0].value, "s1");
        let agents: Vec<_> = setups.iter().map(|s| s.user_agent.clone().unwrap()).collect();
        assert_eq!(agents, vec!["ua-1", "ua-2", "ua-1"]);
        assert!(!setups[0].filter.allows(crate::engine::ResourceKind::Font));
        // Threshold 0 never recycles.
        assert_eq!(launcher.launches(), 1);
    }

    #[tokio::test]
    async fn recycle_waits_for_in_flight_lease() {
        let launcher = Arc::new(FakeLauncher::new(FakeSite::new()));
        let engine = Arc::new(lifecycle(&launcher, 1));
        let first = engine.new_context().await.unwrap();

        let next = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.new_context().await.map(|l| l.generation()) }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!next.is_finished());
        assert_eq!(launcher.closes(), 0);

        first.release().await;
        let generation = next.await.unwrap().unwrap();
        assert_eq!(generation, 2);
        assert_eq!(launcher.closes(), 1);
    }

    #[tokio::test]
    async fn crashed_engine_is_relaunched_once() {
        let launcher = Arc::new(FakeLauncher::new(FakeSite::new()));
        let engine = lifecycle(&launcher, 50);
        engine.new_context().await.unwrap().release().await;

        launcher.fail_next_page();
        let lease = engine.new_context().await.unwrap();
        assert_eq!(lease.generation(), 2);
        lease.release().await;
        assert_eq!(launcher.launches(), 2);
        assert_eq!(launcher.closes(), 1);
    }

    #[tokio::test]
    async fn page_failure_after_relaunch_is_returned() {
        let launcher = Arc::new(FakeLauncher::new(FakeSite::new()));
        let engine = lifecycle(&launcher, 50);
        launcher.fail_pages_after(0);
        assert!(matches!(
            engine.new_context().await,
            Err(EngineError::Page(_))
        ));
        assert_eq!(launcher.launches(), 2);
    }

    #[tokio::test]
    async fn dropped_lease_still_closes_page() {
        let launcher = Arc::new(FakeLauncher::new(FakeSite::new()));
        let engine = lifecycle(&launcher, 50);
        {
            let _lease = engine.new_context().await.unwrap();
        }
        engine.close().await.unwrap();
        assert_eq!(launcher.pages_opened(), 1);
        assert_eq!(launcher.pages_closed(), 1);
    }
}
