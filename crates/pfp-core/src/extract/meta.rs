use async_trait::async_trait;

use crate::engine::{EngineError, PageContext};

use super::ExtractionStrategy;

/// `<meta property="og:image" content="...">`.
pub struct MetaTagStrategy {
    property: String,
}

impl MetaTagStrategy {
    pub fn new(property: &str) -> Self {
        Self {
            property: property.to_string(),
        }
    }
}

#[async_trait]
impl ExtractionStrategy for MetaTagStrategy {
    fn name(&self) -> &'static str {
        "meta-tag"
    }

    async fn candidate(&self, page: &dyn PageContext) -> Result<Option<String>, EngineError> {
        page.meta_content(&self.property).await
    }
}
