//! Deterministic provider fake for tests. The real provider is
//! non-deterministic and rate-limited; every engine test runs against this.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use breakwire_common::EntitySet;

use crate::traits::{EmbedAgent, EntityAgent};

const FAKE_DIM: usize = 32;

/// Deterministic embedding + entity provider. Embeddings are derived from
/// token hashes, so texts sharing words produce similar vectors and
/// unrelated texts do not. Entities come from a keyword table seeded per
/// test. Failure injection covers the degraded-provider paths.
#[derive(Default)]
pub struct FakeProvider {
    entities: Vec<(String, EntitySet)>,
    fail_embeddings: AtomicBool,
    fail_entities: AtomicBool,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity set returned when the extracted text contains
    /// `keyword` (case-insensitive).
    pub fn with_entities(mut self, keyword: &str, entities: EntitySet) -> Self {
        self.entities.push((keyword.to_lowercase(), entities));
        self
    }

    pub fn set_fail_embeddings(&self, fail: bool) {
        self.fail_embeddings.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_entities(&self, fail: bool) {
        self.fail_entities.store(fail, Ordering::SeqCst);
    }

    /// Hash each whitespace token into one of `FAKE_DIM` buckets and
    /// L2-normalize. Shared vocabulary → high cosine similarity.
    pub fn embedding_for(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; FAKE_DIM];
        for token in text.to_lowercase().split_whitespace() {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let bucket = (hasher.finish() as usize) % FAKE_DIM;
            v[bucket] += 1.0;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

#[async_trait]
impl EmbedAgent for FakeProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.fail_embeddings.load(Ordering::SeqCst) {
            return Err(anyhow!("fake embedding provider unavailable"));
        }
        Ok(Self::embedding_for(text))
    }

    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if self.fail_embeddings.load(Ordering::SeqCst) {
            return Err(anyhow!("fake embedding provider unavailable"));
        }
        Ok(texts.iter().map(|t| Self::embedding_for(t)).collect())
    }
}

#[async_trait]
impl EntityAgent for FakeProvider {
    async fn extract_entities(
        &self,
        title: &str,
        description: &str,
        _url: Option<&str>,
    ) -> Result<EntitySet> {
        if self.fail_entities.load(Ordering::SeqCst) {
            return Err(anyhow!("fake entity provider unavailable"));
        }
        let haystack = format!("{title} {description}").to_lowercase();
        for (keyword, entities) in &self.entities {
            if haystack.contains(keyword) {
                return Ok(entities.clone());
            }
        }
        Ok(EntitySet::default())
    }
}
