//! Network resource filter applied to every page context.

/// Resource class of an outgoing request, as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Document,
    Stylesheet,
    Image,
    Media,
    Font,
    Script,
    Xhr,
    Fetch,
    WebSocket,
    Other,
}

/// Predicate deciding which requests a page may make.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceFilter {
    allowed: Vec<ResourceKind>,
}

impl Default for ResourceFilter {
    /// Documents, images and XHR/fetch only.
    fn default() -> Self {
        Self::only(&[
            ResourceKind::Document,
            ResourceKind::Image,
            ResourceKind::Xhr,
            ResourceKind::Fetch,
        ])
    }
}

impl ResourceFilter {
    pub fn only(kinds: &[ResourceKind]) -> Self {
        Self {
            allowed: kinds.to_vec(),
        }
    }

    pub fn allows(&self, kind: ResourceKind) -> bool {
        self.allowed.contains(&kind)
    }

    /// True when nothing would be blocked; the binding can skip interception.
    pub fn is_permissive(&self) -> bool {
        use ResourceKind::*;
        [
            Document, Stylesheet, Image, Media, Font, Script, Xhr, Fetch, WebSocket, Other,
        ]
        .iter()
        .all(|k| self.allows(*k))
    }
}
