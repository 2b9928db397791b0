//! Post-processing seams for the final report.
//!
//! PPT and podcast generation are opaque collaborators: the
//! orchestrator hands them the response markdown and attaches whatever
//! they return to the `Response` event.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("post-processing failed: {0}")]
pub struct PostProcessError(pub String);

/// Produces a PPT artifact URL from the final report.
#[async_trait]
pub trait PptGenerator: Send + Sync {
    async fn generate(&self, markdown: &str) -> Result<String, PostProcessError>;
}

/// Produces a podcast payload (speaker/text lines or an opaque object)
/// from the final report.
#[async_trait]
pub trait PodcastGenerator: Send + Sync {
    async fn generate(&self, markdown: &str) -> Result<Value, PostProcessError>;
}
