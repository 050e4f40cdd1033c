use async_trait::async_trait;
use regex::Regex;

use crate::engine::{EngineError, PageContext};

use super::{absolute_http_url, ExtractionStrategy};

/// First `src` among the prioritized image selectors that is not a placeholder.
pub struct SelectorStrategy {
    selectors: Vec<String>,
    placeholder: Option<Regex>,
}

impl SelectorStrategy {
    /// An empty `placeholder_pattern` disables placeholder rejection.
    pub fn new(selectors: Vec<String>, placeholder_pattern: &str) -> anyhow::Result<Self> {
        let placeholder = if placeholder_pattern.is_empty() {
            None
        } else {
            Some(Regex::new(placeholder_pattern)?)
        };
        Ok(Self {
            selectors,
            placeholder,
        })
    }

    fn is_placeholder(&self, url: &str) -> bool {
        self.placeholder.as_ref().is_some_and(|re| re.is_match(url))
    }
}

#[async_trait]
impl ExtractionStrategy for SelectorStrategy {
    fn name(&self) -> &'static str {
        "dom-selector"
    }

    async fn candidate(&self, page: &dyn PageContext) -> Result<Option<String>, EngineError> {
        for sel in &self.selectors {
            let src = match page.attribute(sel, "src").await {
                Ok(Some(src)) => src,
                Ok(None) => continue,
                Err(e) => {
                    tracing::debug!(selector = %sel, "selector query failed: {}", e);
                    continue;
                }
            };
            if absolute_http_url(&src).is_none() {
                continue;
            }
            if self.is_placeholder(&src) {
                tracing::debug!(selector = %sel, "skipping placeholder image");
                continue;
            }
            return Ok(Some(src));
        }
        Ok(None)
    }
}
