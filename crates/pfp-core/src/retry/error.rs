//! Error type for a single fetch attempt.

use std::time::Duration;

/// Why one attempt for an identifier did not produce a saved image.
///
/// The `Display` text is what ends up as the `Failed` reason in the progress file.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttemptError {
    #[error("navigation timed out after {}s", .0.as_secs())]
    NavigationTimeout(Duration),
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("resource url not found on page")]
    NotFound,
    #[error("download failed: {0}")]
    Download(String),
    /// The browser could not be launched or relaunched. Not retried.
    #[error("engine unavailable: {0}")]
    Engine(String),
}

impl AttemptError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, AttemptError::Engine(_))
    }
}
