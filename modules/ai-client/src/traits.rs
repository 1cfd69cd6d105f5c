use anyhow::Result;
use async_trait::async_trait;

use breakwire_common::EntitySet;

// =============================================================================
// EmbedAgent Trait
// =============================================================================

#[async_trait]
pub trait EmbedAgent: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;
}

// =============================================================================
// EntityAgent Trait
// =============================================================================

/// Extracts structured named entities from a news item. Callers must treat
/// any error as "no signal available" — provider health never blocks a
/// submission.
#[async_trait]
pub trait EntityAgent: Send + Sync {
    async fn extract_entities(
        &self,
        title: &str,
        description: &str,
        url: Option<&str>,
    ) -> Result<EntitySet>;
}
