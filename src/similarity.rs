//! Composite similarity scoring and candidate search.
//!
//! Blends the fingerprint breakdown with an optional embedding-based
//! semantic component into a single `[0, 1]` composite. Artifact
//! embeddings are persisted in `artifact_embeddings` keyed by model name,
//! so each artifact is embedded at most once per model; semantic work runs
//! under a per-call wall-clock budget and silently drops out of the blend
//! when it cannot finish.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sqlx::{Row, SqlitePool};
use tracing::warn;

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob, EmbeddingProvider};
use crate::fingerprint::FingerprintComparator;
use crate::models::{ArtifactRecord, Fingerprint, ScoreBreakdown, SimilarityResult};
use crate::store::{ArtifactStore, SourceFilter};
use crate::timeout::run_with_budget;

const KEYWORD_WEIGHT: f64 = 0.30;
const CONTENT_WEIGHT: f64 = 0.25;
const STRUCTURE_WEIGHT: f64 = 0.20;
const METADATA_WEIGHT: f64 = 0.15;
const SEMANTIC_WEIGHT: f64 = 0.10;

/// Weighted composite of a breakdown, in `[0, 1]`.
///
/// When the semantic component is absent its weight is redistributed
/// proportionally across the other four, so a fully-identical pair still
/// reaches 1.0 without embeddings.
pub fn composite_score(breakdown: &ScoreBreakdown) -> f64 {
    let base = KEYWORD_WEIGHT * breakdown.keyword
        + CONTENT_WEIGHT * breakdown.content
        + STRUCTURE_WEIGHT * breakdown.structure
        + METADATA_WEIGHT * breakdown.metadata;

    let score = match breakdown.semantic {
        Some(semantic) => base + SEMANTIC_WEIGHT * semantic,
        None => base / (1.0 - SEMANTIC_WEIGHT),
    };
    score.clamp(0.0, 1.0)
}

pub struct SimilarityService {
    store: Arc<dyn ArtifactStore>,
    provider: Arc<dyn EmbeddingProvider>,
    pool: SqlitePool,
    comparator: FingerprintComparator,
    semantic_budget: Duration,
}

impl SimilarityService {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        provider: Arc<dyn EmbeddingProvider>,
        pool: SqlitePool,
        semantic_budget: Duration,
    ) -> Self {
        Self {
            store,
            provider,
            pool,
            comparator: FingerprintComparator::new(),
            semantic_budget,
        }
    }

    /// Rank artifacts similar to `source_id` within the filtered
    /// population. An unknown source id yields an empty result, not an
    /// error.
    pub async fn find_similar(
        &self,
        source_id: &str,
        filter: SourceFilter,
        min_score: f64,
        limit: usize,
    ) -> Result<Vec<SimilarityResult>> {
        let Some(source) = self.store.get(source_id).await? else {
            return Ok(Vec::new());
        };

        let candidates: Vec<ArtifactRecord> = self
            .store
            .list(filter)
            .await?
            .into_iter()
            .filter(|r| r.id != source_id)
            .collect();

        self.score_candidates(&source, &candidates, min_score, limit)
            .await
    }

    /// Score `source` against each candidate and keep the top results.
    /// Shared with the cache manager, which supplies prefiltered
    /// candidates.
    pub(crate) async fn score_candidates(
        &self,
        source: &ArtifactRecord,
        candidates: &[ArtifactRecord],
        min_score: f64,
        limit: usize,
    ) -> Result<Vec<SimilarityResult>> {
        let source_fp = Fingerprint::from_record(source);
        let source_vec = self.artifact_embedding(source).await;

        let mut results: Vec<SimilarityResult> = Vec::new();
        for candidate in candidates {
            let mut breakdown = self.comparator.compare(&source_fp, &Fingerprint::from_record(candidate));

            if let Some(source_vec) = &source_vec {
                if let Some(candidate_vec) = self.artifact_embedding(candidate).await {
                    let cosine = cosine_similarity(source_vec, &candidate_vec).max(0.0);
                    breakdown.semantic = Some(cosine as f64);
                }
            }

            let composite = composite_score(&breakdown);
            if composite >= min_score {
                results.push(SimilarityResult::new(&candidate.id, composite, breakdown));
            }
        }

        results.sort_by(|a, b| {
            b.composite_score()
                .partial_cmp(&a.composite_score())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.artifact_id().cmp(b.artifact_id()))
        });
        results.truncate(limit);
        Ok(results)
    }

    /// Embedding for one artifact, reused from `artifact_embeddings` when
    /// a row for the current model exists, computed under the semantic
    /// budget and persisted otherwise. Any failure yields `None`; the
    /// composite then proceeds without the semantic component.
    async fn artifact_embedding(&self, record: &ArtifactRecord) -> Option<Vec<f32>> {
        if !self.provider.is_available().await {
            return None;
        }
        let model_name = self.provider.model_name().to_string();

        let cached = sqlx::query(
            "SELECT vector FROM artifact_embeddings WHERE artifact_id = ? AND model_name = ?",
        )
        .bind(&record.id)
        .bind(&model_name)
        .fetch_optional(&self.pool)
        .await;

        match cached {
            Ok(Some(row)) => {
                let blob: Vec<u8> = row.get("vector");
                return Some(blob_to_vec(&blob));
            }
            Ok(None) => {}
            Err(e) => {
                warn!("artifact embedding lookup failed for {}: {}", record.id, e);
            }
        }

        let provider = self.provider.clone();
        let text = format!("{} {}", record.name, record.view().combined_text());
        let attempt = run_with_budget(self.semantic_budget, async move {
            provider.embed(&text).await
        })
        .await;

        let vector = match attempt {
            None => {
                warn!("embedding timed out for artifact {}", record.id);
                return None;
            }
            Some(Err(e)) => {
                warn!("embedding failed for artifact {}: {}", record.id, e);
                return None;
            }
            Some(Ok(None)) => return None,
            Some(Ok(Some(vector))) => vector,
        };

        let stored = sqlx::query(
            r#"
            INSERT OR REPLACE INTO artifact_embeddings
                (artifact_id, vector, model_name, dimension, computed_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(vec_to_blob(&vector))
        .bind(&model_name)
        .bind(vector.len() as i64)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await;
        if let Err(e) = stored {
            warn!("failed to persist embedding for {}: {}", record.id, e);
        }

        Some(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::embedding::DisabledProvider;
    use crate::migrate::run_migrations;
    use crate::models::MatchType;
    use crate::store::MemoryArtifactStore;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use tempfile::TempDir;

    struct StubProvider;

    #[async_trait]
    impl EmbeddingProvider for StubProvider {
        fn model_name(&self) -> &str {
            "stub"
        }

        fn dimension(&self) -> usize {
            2
        }

        async fn is_available(&self) -> bool {
            true
        }

        async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>> {
            let vec = if text.contains("pdf") {
                vec![1.0, 0.0]
            } else {
                vec![0.0, 1.0]
            };
            Ok(Some(vec))
        }
    }

    fn record(id: &str, name: &str, description: &str, tags: &[&str], content_hash: &str) -> ArtifactRecord {
        ArtifactRecord {
            id: id.to_string(),
            name: name.to_string(),
            kind: "skill".to_string(),
            title: None,
            description: Some(description.to_string()),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            extra: HashMap::new(),
            content_hash: content_hash.to_string(),
            structure_hash: format!("structure-{}", content_hash),
            total_size: 4096,
            file_count: 3,
            source: "collection".to_string(),
        }
    }

    async fn service(provider: Arc<dyn EmbeddingProvider>) -> (SimilarityService, Arc<MemoryArtifactStore>, TempDir) {
        let tmp = TempDir::new().unwrap();
        let pool = db::connect(&tmp.path().join("rank.sqlite")).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let store = Arc::new(MemoryArtifactStore::new());
        let svc = SimilarityService::new(
            store.clone(),
            provider,
            pool,
            Duration::from_millis(800),
        );
        (svc, store, tmp)
    }

    fn full_breakdown(semantic: Option<f64>) -> ScoreBreakdown {
        ScoreBreakdown {
            keyword: 1.0,
            content: 1.0,
            structure: 1.0,
            metadata: 1.0,
            semantic,
        }
    }

    #[test]
    fn test_composite_weights_sum_to_one() {
        assert_eq!(composite_score(&full_breakdown(Some(1.0))), 1.0);
        // Redistribution keeps an identical pair at 1.0 without semantic.
        assert!((composite_score(&full_breakdown(None)) - 1.0).abs() < 1e-9);
        assert_eq!(
            composite_score(&ScoreBreakdown {
                keyword: 0.0,
                content: 0.0,
                structure: 0.0,
                metadata: 0.0,
                semantic: None,
            }),
            0.0
        );
    }

    #[test]
    fn test_composite_redistribution_is_proportional() {
        let keyword_only = ScoreBreakdown {
            keyword: 1.0,
            content: 0.0,
            structure: 0.0,
            metadata: 0.0,
            semantic: None,
        };
        assert!((composite_score(&keyword_only) - 0.30 / 0.90).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_unknown_source_yields_empty() {
        let (svc, _store, _tmp) = service(Arc::new(DisabledProvider)).await;
        let results = svc
            .find_similar("missing", SourceFilter::All, 0.0, 10)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_outranks_unrelated() {
        let (svc, store, _tmp) = service(Arc::new(DisabledProvider)).await;
        store.insert(record("src", "pdf-skill", "extract pdf text", &["pdf"], "same"));
        store.insert(record("dup", "pdf-skill", "extract pdf text", &["pdf"], "same"));
        store.insert(record(
            "other",
            "image-processor",
            "resize images",
            &["images"],
            "different",
        ));

        let results = svc
            .find_similar("src", SourceFilter::All, 0.0, 10)
            .await
            .unwrap();
        assert_eq!(results[0].artifact_id(), "dup");
        assert_eq!(results[0].match_type(), MatchType::Exact);
        assert!(!results.iter().any(|r| r.artifact_id() == "src"));
    }

    #[tokio::test]
    async fn test_min_score_filters_results() {
        let (svc, store, _tmp) = service(Arc::new(DisabledProvider)).await;
        store.insert(record("src", "pdf-skill", "extract pdf text", &["pdf"], "c1"));
        store.insert(record(
            "other",
            "image-processor",
            "resize images",
            &["images"],
            "c2",
        ));

        let results = svc
            .find_similar("src", SourceFilter::All, 0.8, 10)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_semantic_component_fills_in_and_persists() {
        let (svc, store, _tmp) = service(Arc::new(StubProvider)).await;
        store.insert(record("src", "pdf-skill", "extract pdf text", &["pdf"], "c1"));
        store.insert(record("viewer", "pdf-viewer", "view pdf files", &["pdf"], "c2"));

        let results = svc
            .find_similar("src", SourceFilter::All, 0.0, 10)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        // Both texts mention pdf, so the stub reports full agreement.
        assert_eq!(results[0].breakdown().semantic, Some(1.0));

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM artifact_embeddings")
            .fetch_one(&svc.pool)
            .await
            .unwrap();
        assert_eq!(rows, 2);
    }

    #[tokio::test]
    async fn test_disabled_provider_leaves_semantic_absent() {
        let (svc, store, _tmp) = service(Arc::new(DisabledProvider)).await;
        store.insert(record("src", "pdf-skill", "extract pdf text", &["pdf"], "c1"));
        store.insert(record("viewer", "pdf-viewer", "view pdf files", &["pdf"], "c2"));

        let results = svc
            .find_similar("src", SourceFilter::All, 0.0, 10)
            .await
            .unwrap();
        assert_eq!(results[0].breakdown().semantic, None);
    }
}
