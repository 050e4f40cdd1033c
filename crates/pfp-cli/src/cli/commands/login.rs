//! `pfp login` – establish the session without fetching anything.

use anyhow::Result;
use pfp_core::config::PfpConfig;
use pfp_core::control::ShutdownController;
use pfp_core::pipeline::Pipeline;

use crate::cli::credentials;

pub async fn run_login(cfg: PfpConfig) -> Result<()> {
    let cache_path = cfg.session_cache_path()?;
    let creds = credentials::chain(&cfg);
    let shutdown = ShutdownController::new();
    let session = Pipeline::with_defaults(cfg, creds, shutdown.token())
        .login()
        .await?;
    println!(
        "Session ready ({} cookies), cached at {}",
        session.cookies.len(),
        cache_path.display()
    );
    Ok(())
}
