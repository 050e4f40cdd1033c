//! CLI for pfp, the resumable profile-picture fetcher.

mod commands;
mod credentials;
mod input;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use pfp_core::config::{self, PfpConfig};
use std::path::PathBuf;

use commands::{run_login, run_pipeline, run_reset, run_status};

/// Top-level CLI for pfp.
#[derive(Debug, Parser)]
#[command(name = "pfp")]
#[command(about = "pfp: fetch profile pictures for a list of accounts, resumably", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Fetch the profile picture of every identifier in the input file.
    Run(RunArgs),

    /// Establish or validate the login session and write the session cache.
    Login {
        /// Session cache file (overrides config).
        #[arg(long, value_name = "PATH")]
        session_cache: Option<PathBuf>,
        /// Show the browser window.
        #[arg(long)]
        headful: bool,
    },

    /// Show saved/failed counters and each identifier's outcome.
    Status {
        /// Progress file (overrides config).
        #[arg(long, value_name = "PATH")]
        progress_file: Option<PathBuf>,
    },

    /// Forget all recorded outcomes.
    Reset {
        /// Progress file (overrides config).
        #[arg(long, value_name = "PATH")]
        progress_file: Option<PathBuf>,
    },
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Identifier list: .txt (one per line), .csv or .json.
    #[arg(short, long, value_name = "FILE")]
    pub input: PathBuf,
    /// CSV column: 0-based index or header name.
    #[arg(short, long, default_value = "0")]
    pub column: String,
    /// Field to read when the JSON input is an array of objects.
    #[arg(short = 'k', long, value_name = "KEY")]
    pub json_key: Option<String>,
    /// Directory that receives the images.
    #[arg(short, long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,
    /// Pages fetched in parallel.
    #[arg(short = 'n', long, value_name = "N", value_parser = parse_positive)]
    pub concurrency: Option<usize>,
    /// Attempts per identifier, including the first.
    #[arg(short = 'r', long, value_name = "N", value_parser = parse_positive_u32)]
    pub max_retries: Option<u32>,
    /// Skip the login session entirely.
    #[arg(long)]
    pub unauthenticated: bool,
    /// Session cache file (overrides config).
    #[arg(long, value_name = "PATH")]
    pub session_cache: Option<PathBuf>,
    /// Progress file (overrides config).
    #[arg(long, value_name = "PATH")]
    pub progress_file: Option<PathBuf>,
    /// Clear recorded outcomes before starting.
    #[arg(long)]
    pub reset_progress: bool,
    /// Show the browser window.
    #[arg(long)]
    pub headful: bool,
}

impl RunArgs {
    /// Flags win over config file values.
    pub fn apply_to(&self, cfg: &mut PfpConfig) {
        if let Some(dir) = &self.out_dir {
            cfg.output_dir = dir.clone();
        }
        if let Some(n) = self.concurrency {
            cfg.concurrency = n;
        }
        if let Some(n) = self.max_retries {
            cfg.max_retries = n;
        }
        if self.unauthenticated {
            cfg.unauthenticated = true;
        }
        if self.headful {
            cfg.headless = false;
        }
        if let Some(p) = &self.session_cache {
            cfg.session_cache_path = Some(p.clone());
        }
        if let Some(p) = &self.progress_file {
            cfg.progress_path = Some(p.clone());
        }
    }
}

fn parse_positive(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

fn parse_positive_u32(s: &str) -> Result<u32, String> {
    parse_positive(s).and_then(|n| u32::try_from(n).map_err(|e| e.to_string()))
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let mut cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Run(args) => {
                args.apply_to(&mut cfg);
                run_pipeline(cfg, &args).await?;
            }
            CliCommand::Login {
                session_cache,
                headful,
            } => {
                if session_cache.is_some() {
                    cfg.session_cache_path = session_cache;
                }
                if headful {
                    cfg.headless = false;
                }
                run_login(cfg).await?;
            }
            CliCommand::Status { progress_file } => {
                if progress_file.is_some() {
                    cfg.progress_path = progress_file;
                }
                run_status(&cfg)?;
            }
            CliCommand::Reset { progress_file } => {
                if progress_file.is_some() {
                    cfg.progress_path = progress_file;
                }
                run_reset(&cfg)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
