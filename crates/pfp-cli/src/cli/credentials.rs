//! Credential sources for the CLI: config file, environment, then a terminal prompt.

use async_trait::async_trait;
use inquire::{Password, PasswordDisplayMode, Text};
use pfp_core::config::PfpConfig;
use pfp_core::session::{ChainCredentials, CredentialProvider, Credentials, StaticCredentials};
use std::io::IsTerminal;
use std::sync::Arc;

pub const USERNAME_VAR: &str = "PFP_USERNAME";
pub const PASSWORD_VAR: &str = "PFP_PASSWORD";

/// Config `[credentials]`, then `PFP_USERNAME`/`PFP_PASSWORD`, then the prompt.
pub fn chain(cfg: &PfpConfig) -> Arc<dyn CredentialProvider> {
    Arc::new(
        ChainCredentials::new()
            .with(Arc::new(StaticCredentials::from_config(cfg)))
            .with(Arc::new(EnvCredentials::new(USERNAME_VAR, PASSWORD_VAR)))
            .with(Arc::new(PromptCredentials)),
    )
}

/// Reads a username/password pair from two environment variables.
#[derive(Debug, Clone)]
pub struct EnvCredentials {
    username_var: String,
    password_var: String,
}

impl EnvCredentials {
    pub fn new(username_var: impl Into<String>, password_var: impl Into<String>) -> Self {
        Self {
            username_var: username_var.into(),
            password_var: password_var.into(),
        }
    }
}

#[async_trait]
impl CredentialProvider for EnvCredentials {
    async fn credentials(&self) -> Option<Credentials> {
        let username = std::env::var(&self.username_var).ok()?;
        let password = std::env::var(&self.password_var).ok()?;
        if username.trim().is_empty() {
            return None;
        }
        tracing::debug!(var = %self.username_var, "credentials from environment");
        Some(Credentials {
            username: username.trim().to_string(),
            password,
        })
    }
}

/// Asks on the terminal with `inquire`; the password is masked. Yields nothing
/// when stdin is not a terminal or the prompt is cancelled.
#[derive(Debug, Clone, Copy)]
pub struct PromptCredentials;

#[async_trait]
impl CredentialProvider for PromptCredentials {
    async fn credentials(&self) -> Option<Credentials> {
        if !std::io::stdin().is_terminal() {
            tracing::debug!("stdin is not a terminal; not prompting for credentials");
            return None;
        }
        tokio::task::spawn_blocking(prompt_credentials)
            .await
            .ok()
            .flatten()
    }
}

fn prompt_credentials() -> Option<Credentials> {
    let username = match Text::new("Username:").prompt() {
        Ok(u) => u,
        Err(e) => {
            tracing::debug!("username prompt ended: {}", e);
            return None;
        }
    };
    if username.trim().is_empty() {
        return None;
    }
    let password = match Password::new("Password:")
        .without_confirmation()
        .with_display_mode(PasswordDisplayMode::Masked)
        .prompt()
    {
        Ok(p) => p,
        Err(e) => {
            tracing::debug!("password prompt ended: {}", e);
            return None;
        }
    };
    credentials_from_answers(&username, password)
}

/// An empty username means the user declined to log in.
fn credentials_from_answers(username: &str, password: String) -> Option<Credentials> {
    let username = username.trim().trim_start_matches('@').trim();
    if username.is_empty() {
        return None;
    }
    Some(Credentials {
        username: username.to_string(),
        password,
    })
}
