//! Crash-safe progress store: in-memory record, whole-file JSON snapshot after every change.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use super::record::{Applied, Identifier, Outcome, ProgressFile, ProgressRecord};
use crate::storage;

/// What happened to a `record` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recorded {
    /// Applied and persisted.
    Flushed,
    /// Applied in memory; the snapshot write failed and will be retried on the next flush.
    Unflushed,
    /// Rejected: the identifier already has a terminal outcome.
    AlreadyFinal,
}

struct State {
    record: ProgressRecord,
    dirty: bool,
}

/// Owner of the progress record for a run. Shared between workers via `Arc`.
pub struct ProgressStore {
    path: PathBuf,
    state: Mutex<State>,
}

impl ProgressStore {
    /// Load the record at `path`. A missing file yields an empty record; a
    /// corrupt file is an error so earlier progress is never silently dropped.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let record = match std::fs::read(&path) {
            Ok(bytes) => {
                let file: ProgressFile = serde_json::from_slice(&bytes)
                    .with_context(|| format!("parse progress file: {}", path.display()))?;
                let mut record = file.into_record();
                if record.recount() {
                    tracing::warn!(path = %path.display(), "progress counters did not match outcomes; recounted");
                }
                record
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => ProgressRecord::default(),
            Err(e) => {
                return Err(e).with_context(|| format!("read progress file: {}", path.display()))
            }
        };
        tracing::debug!(
            path = %path.display(),
            saved = record.saved_count,
            failed = record.failed_count,
            "progress loaded"
        );
        Ok(Self {
            path,
            state: Mutex::new(State {
                record,
                dirty: false,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_done(&self, id: &str) -> bool {
        self.lock().record.is_done(id)
    }

    pub fn outcome(&self, id: &str) -> Option<Outcome> {
        self.lock().record.outcome(id).cloned()
    }

    /// `(saved_count, failed_count)`.
    pub fn counts(&self) -> (u64, u64) {
        let state = self.lock();
        (state.record.saved_count, state.record.failed_count)
    }

    pub fn snapshot(&self) -> ProgressRecord {
        self.lock().record.clone()
    }

    /// Identifiers from `ids` that still need work, in input order, duplicates collapsed.
    pub fn pending<I>(&self, ids: I) -> Vec<Identifier>
    where
        I: IntoIterator<Item = Identifier>,
    {
        let state = self.lock();
        let mut seen = HashSet::new();
        ids.into_iter()
            .filter(|id| !state.record.is_done(id))
            .filter(|id| seen.insert(id.clone()))
            .collect()
    }

    /// Apply an outcome and persist the full record. Concurrent callers are
    /// serialized, so counters stay exact and snapshots never interleave.
    pub fn record(&self, id: &str, outcome: Outcome) -> Recorded {
        let mut state = self.lock();
        if state.record.apply(id, outcome) == Applied::AlreadyFinal {
            tracing::warn!(id, "outcome already recorded; ignoring second result");
            return Recorded::AlreadyFinal;
        }
        state.dirty = true;
        match write_snapshot(&self.path, &state.record) {
            Ok(()) => {
                state.dirty = false;
                Recorded::Flushed
            }
            Err(e) => {
                tracing::warn!(id, "progress write failed, continuing in memory: {:#}", e);
                Recorded::Unflushed
            }
        }
    }

    /// `record` on the blocking pool, so the snapshot write and fsync stay off
    /// the async worker threads.
    pub async fn record_async(self: &Arc<Self>, id: &str, outcome: Outcome) -> Recorded {
        let store = Arc::clone(self);
        let owned = id.to_string();
        match tokio::task::spawn_blocking(move || store.record(&owned, outcome)).await {
            Ok(recorded) => recorded,
            Err(e) => {
                tracing::error!(id, "progress write task failed: {}", e);
                Recorded::Unflushed
            }
        }
    }

    /// Persist the current record. Used on shutdown and to repair an earlier failed write.
    pub fn flush(&self) -> Result<()> {
        let mut state = self.lock();
        write_snapshot(&self.path, &state.record)?;
        state.dirty = false;
        Ok(())
    }

    /// True while some applied outcome is not yet on disk.
    pub fn is_dirty(&self) -> bool {
        self.lock().dirty
    }

    /// Forget every outcome and persist the empty record.
    pub fn clear(&self) -> Result<()> {
        let mut state = self.lock();
        state.record = ProgressRecord::default();
        state.dirty = true;
        write_snapshot(&self.path, &state.record)?;
        state.dirty = false;
        tracing::info!(path = %self.path.display(), "progress cleared");
        Ok(())
    }
}

fn write_snapshot(path: &Path, record: &ProgressRecord) -> Result<()> {
    let json = serde_json::to_vec_pretty(record).context("serialize progress")?;
    storage::write_atomic(path, &json)
        .with_context(|| format!("write progress file: {}", path.display()))
}
