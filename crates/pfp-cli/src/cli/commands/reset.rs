//! `pfp reset` – clear the progress file.

use anyhow::{Context, Result};
use pfp_core::config::PfpConfig;
use pfp_core::progress::ProgressStore;
use std::path::Path;

pub fn run_reset(cfg: &PfpConfig) -> Result<()> {
    let path = cfg.progress_path()?;
    clear_progress(&path)?;
    println!("Progress cleared: {}", path.display());
    Ok(())
}

/// Empty the progress file. An unreadable file is removed instead, so a
/// corrupt record can always be reset.
pub(crate) fn clear_progress(path: &Path) -> Result<()> {
    match ProgressStore::load(path) {
        Ok(store) => store.clear(),
        Err(e) => {
            tracing::warn!(path = %path.display(), "discarding unreadable progress file: {:#}", e);
            std::fs::remove_file(path)
                .with_context(|| format!("remove progress file: {}", path.display()))
        }
    }
}
