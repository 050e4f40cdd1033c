use async_trait::async_trait;
use regex::Regex;

use crate::engine::{EngineError, PageContext};

use super::ExtractionStrategy;

/// Looks for `"<field>":"<url>"` in the page source (inline script state),
/// trying each field in order.
pub struct EmbeddedStateStrategy {
    patterns: Vec<Regex>,
}

impl EmbeddedStateStrategy {
    pub fn new(fields: &[String]) -> anyhow::Result<Self> {
        let patterns = fields
            .iter()
            .map(|f| Regex::new(&format!(r#""{}"\s*:\s*"((?:[^"\\]|\\.)+)""#, regex::escape(f))))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    fn find(&self, source: &str) -> Option<String> {
        self.patterns
            .iter()
            .find_map(|re| re.captures(source))
            .map(|c| unescape(&c[1]))
    }
}

/// Undo JSON string escaping of separators as it appears in inline state.
pub(crate) fn unescape(s: &str) -> String {
    s.replace("\\u0026", "&")
        .replace("\\u003d", "=")
        .replace("\\/", "/")
}

#[async_trait]
impl ExtractionStrategy for EmbeddedStateStrategy {
    fn name(&self) -> &'static str {
        "embedded-state"
    }

    async fn candidate(&self, page: &dyn PageContext) -> Result<Option<String>, EngineError> {
        let html = page.content().await?;
        Ok(self.find(&html))
    }
}
