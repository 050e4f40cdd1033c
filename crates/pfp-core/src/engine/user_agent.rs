use std::sync::atomic::{AtomicUsize, Ordering};

/// Round-robin over a fixed pool of user-agent strings.
#[derive(Debug, Default)]
pub struct UserAgentRotation {
    agents: Vec<String>,
    next: AtomicUsize,
}

impl UserAgentRotation {
    pub fn new(agents: Vec<String>) -> Self {
        Self {
            agents: agents.into_iter().filter(|a| !a.trim().is_empty()).collect(),
            next: AtomicUsize::new(0),
        }
    }

    /// Next agent in the pool; `None` leaves the engine default in place.
    pub fn next(&self) -> Option<String> {
        if self.agents.is_empty() {
            return None;
        }
        let i = self.next.fetch_add(1, Ordering::Relaxed) % self.agents.len();
        Some(self.agents[i].clone())
    }
}
