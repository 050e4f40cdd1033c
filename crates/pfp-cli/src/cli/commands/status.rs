//! `pfp status` – show recorded outcomes.

use anyhow::Result;
use pfp_core::config::PfpConfig;
use pfp_core::progress::{Outcome, ProgressStore};

pub fn run_status(cfg: &PfpConfig) -> Result<()> {
    let path = cfg.progress_path()?;
    let record = ProgressStore::load(&path)?.snapshot();
    if record.outcomes.is_empty() {
        println!("No progress recorded at {}.", path.display());
        return Ok(());
    }

    println!(
        "saved: {}  failed: {}  ({})",
        record.saved_count,
        record.failed_count,
        path.display()
    );
    println!("{:<32} {:<8} {}", "IDENTIFIER", "STATUS", "REASON");
    for (id, outcome) in &record.outcomes {
        let reason = match outcome {
            Outcome::Failed(reason) => reason.as_str(),
            _ => "",
        };
        println!("{:<32} {:<8} {}", id, outcome.as_str(), reason);
    }
    Ok(())
}
