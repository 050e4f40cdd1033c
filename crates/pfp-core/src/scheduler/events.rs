//! What the scheduler reports while running and when done.

use std::path::PathBuf;
use std::time::Duration;

use crate::progress::Identifier;

/// Per-identifier run event (CLI-friendly).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    Started {
        id: Identifier,
        attempt: u32,
    },
    Saved {
        id: Identifier,
        path: PathBuf,
        attempts: u32,
    },
    Retrying {
        id: Identifier,
        attempt: u32,
        delay: Duration,
        reason: String,
    },
    Failed {
        id: Identifier,
        reason: String,
        attempts: u32,
    },
}

/// Totals for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Identifiers that had at least one attempt.
    pub attempted: u64,
    pub saved: u64,
    pub failed: u64,
    /// Identifiers left Pending because shutdown was requested.
    pub skipped_by_shutdown: u64,
}

impl RunSummary {
    pub fn merge(&mut self, other: RunSummary) {
        self.attempted += other.attempted;
        self.saved += other.saved;
        self.failed += other.failed;
        self.skipped_by_shutdown += other.skipped_by_shutdown;
    }
}
