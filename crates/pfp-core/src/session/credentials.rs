//! Where login credentials come from.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::config::PfpConfig;

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Supplies credentials when a login is needed. `None` means none are available.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn credentials(&self) -> Option<Credentials>;
}

/// Fixed credentials, typically from the `[credentials]` config section.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials(Option<Credentials>);

impl StaticCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self(Some(Credentials {
            username: username.into(),
            password: password.into(),
        }))
    }

    pub fn none() -> Self {
        Self(None)
    }

    pub fn from_config(cfg: &PfpConfig) -> Self {
        match &cfg.credentials {
            Some(c) if !c.username.is_empty() => Self::new(c.username.clone(), c.password.clone()),
            _ => Self::none(),
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn credentials(&self) -> Option<Credentials> {
        self.0.clone()
    }
}

/// Tries each provider in order; the first one with credentials wins.
#[derive(Default)]
pub struct ChainCredentials {
    providers: Vec<Arc<dyn CredentialProvider>>,
}

impl ChainCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.providers.push(provider);
        self
    }
}

#[async_trait]
impl CredentialProvider for ChainCredentials {
    async fn credentials(&self) -> Option<Credentials> {
        for p in &self.providers {
            if let Some(c) = p.credentials().await {
                return Some(c);
            }
        }
        None
    }
}
