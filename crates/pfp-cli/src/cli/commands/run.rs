//! `pfp run` – fetch every pending identifier from the input file.

use anyhow::Result;
use pfp_core::config::PfpConfig;
use pfp_core::control::ShutdownController;
use pfp_core::pipeline::{Pipeline, RunReport};
use pfp_core::scheduler::RunEvent;

use super::reset::clear_progress;
use crate::cli::credentials;
use crate::cli::input::{self, InputOptions};
use crate::cli::RunArgs;

const EVENT_BUFFER: usize = 64;

pub async fn run_pipeline(cfg: PfpConfig, args: &RunArgs) -> Result<()> {
    let opts = InputOptions {
        column: args.column.clone(),
        json_key: args.json_key.clone(),
    };
    let ids = input::read_identifiers(&args.input, &opts)?;
    tracing::info!(count = ids.len(), input = %args.input.display(), "identifiers loaded");

    if args.reset_progress {
        clear_progress(&cfg.progress_path()?)?;
    }

    let shutdown = ShutdownController::new();
    shutdown.listen_for_signals();

    let (event_tx, mut event_rx) = tokio::sync::mpsc::channel::<RunEvent>(EVENT_BUFFER);
    let printer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            println!("{}", format_event(&event));
        }
    });

    let creds = credentials::chain(&cfg);
    let pipeline = Pipeline::with_defaults(cfg, creds, shutdown.token()).with_events(event_tx);
    let report = pipeline.run(ids).await;
    drop(pipeline);
    let _ = printer.await;

    match report? {
        RunReport::NothingToDo => {
            println!("Everything already scraped. Nothing to do.");
        }
        RunReport::Finished {
            summary,
            saved_total,
            failed_total,
        } => {
            println!("Finished  saved:{}  failed:{}", summary.saved, summary.failed);
            if summary.skipped_by_shutdown > 0 || shutdown.is_shutdown_requested() {
                println!(
                    "Interrupted: {} identifier(s) left pending. Progress saved.",
                    summary.skipped_by_shutdown
                );
            }
            tracing::info!(saved_total, failed_total, "run completed");
        }
    }
    Ok(())
}

/// One human-readable line per run event.
pub(crate) fn format_event(event: &RunEvent) -> String {
    match event {
        RunEvent::Started { id, attempt } if *attempt > 1 => {
            format!("[try]   {} (attempt {})", id, attempt)
        }
        RunEvent::Started { id, .. } => format!("[try]   {}", id),
        RunEvent::Saved { id, path, .. } => format!("[saved] {} -> {}", id, path.display()),
        RunEvent::Retrying {
            id,
            attempt,
            delay,
            reason,
        } => format!(
            "[retry] {}: {} (attempt {} failed, retrying in {:.1}s)",
            id,
            reason,
            attempt,
            delay.as_secs_f64()
        ),
        RunEvent::Failed {
            id,
            reason,
            attempts,
        } => format!("[fail]  {}: {} (after {} attempt(s))", id, reason, attempts),
    }
}
