//! Semantic similarity between a query and an artifact's text.
//!
//! Thin layer over an [`EmbeddingProvider`]: embeds both sides and maps
//! cosine similarity onto the configured 0-100 band. Returns `None` when
//! either embedding is unavailable so the caller can fall back to
//! keyword-only scoring.

use std::sync::Arc;

use anyhow::{bail, Result};

use crate::embedding::{cosine_similarity, EmbeddingProvider};
use crate::models::ArtifactView;

#[derive(Clone)]
pub struct SemanticScorer {
    provider: Arc<dyn EmbeddingProvider>,
    min_score: f64,
    max_score: f64,
}

impl SemanticScorer {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, min_score: f64, max_score: f64) -> Result<Self> {
        if !(0.0..=100.0).contains(&min_score)
            || !(0.0..=100.0).contains(&max_score)
            || min_score > max_score
        {
            bail!(
                "semantic score bounds must satisfy 0 <= min <= max <= 100 (got {} / {})",
                min_score,
                max_score
            );
        }
        Ok(Self {
            provider,
            min_score,
            max_score,
        })
    }

    pub async fn is_available(&self) -> bool {
        self.provider.is_available().await
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Score in `[min, max]`, or `None` when either embedding could not be
    /// produced. An artifact with no text at all scores the floor.
    pub async fn score(&self, query: &str, artifact: &ArtifactView) -> Result<Option<f64>> {
        let text = artifact.combined_text();
        if text.trim().is_empty() {
            return Ok(Some(self.min_score));
        }

        let query_vec = self.provider.embed(query).await?;
        let artifact_vec = self.provider.embed(&text).await?;

        match (query_vec, artifact_vec) {
            (Some(q), Some(a)) => {
                // Orthogonal-or-opposite is "no relation", not negative.
                let cosine = cosine_similarity(&q, &a).max(0.0) as f64;
                Ok(Some((cosine * 100.0).clamp(self.min_score, self.max_score)))
            }
            _ => Ok(None),
        }
    }
}
