//! RAII lease on a page context.

use std::ops::Deref;
use tokio::sync::OwnedRwLockReadGuard;

use super::lifecycle::Slot;
use super::PageContext;

/// A page context borrowed from the shared engine.
///
/// Holds a shared lock on the engine slot, so the engine cannot be recycled
/// or closed underneath it. Call `release` when done; if the lease is dropped
/// instead, the page close is scheduled on the runtime and the slot lock is
/// held until it finishes.
pub struct PageLease {
    page: Option<Box<dyn PageContext>>,
    slot: Option<OwnedRwLockReadGuard<Slot>>,
    generation: u64,
    user_agent: Option<String>,
    runtime: tokio::runtime::Handle,
}

impl PageLease {
    pub(super) fn new(
        page: Box<dyn PageContext>,
        slot: OwnedRwLockReadGuard<Slot>,
        generation: u64,
        user_agent: Option<String>,
    ) -> Self {
        Self {
            page: Some(page),
            slot: Some(slot),
            generation,
            user_agent,
            runtime: tokio::runtime::Handle::current(),
        }
    }

    /// Engine generation this page belongs to (1 for the first launch).
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// User agent the page was opened with, if one was set.
    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    /// Close the page and give the slot back.
    pub async fn release(mut self) {
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                tracing::debug!(generation = self.generation, "page close failed: {}", e);
            }
        }
        self.slot.take();
    }
}

impl Deref for PageLease {
    type Target = dyn PageContext;

    fn deref(&self) -> &Self::Target {
        self.page.as_deref().expect("PageLease: page already released")
    }
}

impl Drop for PageLease {
    fn drop(&mut self) {
        let Some(page) = self.page.take() else {
            return;
        };
        let slot = self.slot.take();
        let generation = self.generation;
        self.runtime.spawn(async move {
            if let Err(e) = page.close().await {
                tracing::debug!(generation, "page close on drop failed: {}", e);
            }
            drop(slot);
        });
    }
}
