//! Session cache file: the cookie set of a signed-in browser, persisted as JSON.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::storage;

/// One browser cookie, in a shape independent of the engine binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "default_path")]
    pub path: String,
    /// Seconds since the epoch; `None` for session cookies.
    #[serde(default)]
    pub expires: Option<f64>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
}

fn default_path() -> String {
    "/".to_string()
}

/// Authentication artifacts shared read-only by every page context.
///
/// Never mutated once established; re-authentication replaces it wholesale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    pub cookies: Vec<SessionCookie>,
    /// Set once the session has been confirmed against the site. Not persisted.
    #[serde(skip)]
    pub validated: bool,
    /// Unix seconds when the cookies were harvested.
    #[serde(default)]
    pub saved_at: u64,
}

impl SessionContext {
    pub fn new(cookies: Vec<SessionCookie>) -> Self {
        Self {
            cookies,
            validated: false,
            saved_at: unix_now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// Copy marked as confirmed against the site.
    pub fn into_validated(mut self) -> Self {
        self.validated = true;
        self
    }

    /// Load the cache at `path`. Missing file yields `Ok(None)`.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let data = match std::fs::read(path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("read session cache: {}", path.display()))
            }
        };
        let ctx: SessionContext = serde_json::from_slice(&data)
            .with_context(|| format!("parse session cache: {}", path.display()))?;
        Ok(Some(ctx))
    }

    /// Replace the cache at `path` atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self).context("serialize session")?;
        storage::write_atomic(path, &json)
            .with_context(|| format!("write session cache: {}", path.display()))
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
