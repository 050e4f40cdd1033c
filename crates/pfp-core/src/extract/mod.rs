//! Locate the profile image URL on a loaded page.
//!
//! An `Extractor` runs an ordered list of `ExtractionStrategy`s; the first
//! strategy that yields an absolute http(s) URL wins. A strategy that errors
//! is logged and skipped. Not finding anything is a normal outcome.

use async_trait::async_trait;
use url::Url;

use crate::config::SiteConfig;
use crate::engine::{EngineError, PageContext};

mod embedded;
mod meta;
mod selector;

pub use embedded::EmbeddedStateStrategy;
pub use meta::MetaTagStrategy;
pub use selector::SelectorStrategy;

/// One heuristic for finding the resource URL.
#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Raw candidate, before URL validation.
    async fn candidate(&self, page: &dyn PageContext) -> Result<Option<String>, EngineError>;
}

/// A URL found on the page and the strategy that found it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub url: String,
    pub strategy: &'static str,
}

pub struct Extractor {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl Extractor {
    pub fn new(strategies: Vec<Box<dyn ExtractionStrategy>>) -> Self {
        Self { strategies }
    }

    /// Embedded state, then meta tag, then DOM selectors.
    pub fn from_site(site: &SiteConfig) -> anyhow::Result<Self> {
        Ok(Self::new(vec![
            Box::new(EmbeddedStateStrategy::new(&site.embedded_fields)?),
            Box::new(MetaTagStrategy::new(&site.meta_property)),
            Box::new(SelectorStrategy::new(
                site.image_selectors.clone(),
                &site.placeholder_pattern,
            )?),
        ]))
    }

    pub async fn extract(&self, page: &dyn PageContext) -> Option<Extracted> {
        for strategy in &self.strategies {
            match strategy.candidate(page).await {
                Ok(Some(raw)) => match absolute_http_url(&raw) {
                    Some(url) => {
                        tracing::debug!(strategy = strategy.name(), "resource url found");
                        return Some(Extracted {
                            url,
                            strategy: strategy.name(),
                        });
                    }
                    None => {
                        tracing::debug!(strategy = strategy.name(), candidate = %raw, "rejected candidate")
                    }
                },
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(strategy = strategy.name(), "extraction strategy failed: {}", e)
                }
            }
        }
        None
    }
}

/// `raw` trimmed, if it parses as an absolute http or https URL.
pub(crate) fn absolute_http_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let url = Url::parse(raw).ok()?;
    match url.scheme() {
        "http" | "https" if url.host().is_some() => Some(raw.to_string()),
        _ => None,
    }
}
