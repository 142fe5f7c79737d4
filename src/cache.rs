//! Persisted similarity cache.
//!
//! Pairwise scoring is the expensive path, so results are precomputed per
//! source artifact and stored in `similarity_cache`. Reads never trigger
//! computation; writes replace a source's rows atomically. A text-index
//! prefilter keeps each recompute from scoring the whole population, with
//! a full-scan fallback when the index is unavailable or returns nothing.

use std::sync::Arc;

use anyhow::Result;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info, warn};

use crate::keyword::tokenize;
use crate::models::{ArtifactRecord, ScoreBreakdown, SimilarityResult};
use crate::similarity::SimilarityService;
use crate::store::{ArtifactStore, SourceFilter, TextIndex};

pub struct SimilarityCacheManager {
    pool: SqlitePool,
    store: Arc<dyn ArtifactStore>,
    index: Arc<dyn TextIndex>,
    service: SimilarityService,
    /// Rows kept per source artifact.
    top_n: usize,
    prefilter_limit: usize,
    prefilter_tokens: usize,
}

impl SimilarityCacheManager {
    pub fn new(
        pool: SqlitePool,
        store: Arc<dyn ArtifactStore>,
        index: Arc<dyn TextIndex>,
        service: SimilarityService,
        top_n: usize,
        prefilter_limit: usize,
        prefilter_tokens: usize,
    ) -> Self {
        Self {
            pool,
            store,
            index,
            service,
            top_n,
            prefilter_limit,
            prefilter_tokens,
        }
    }

    /// Cached similar artifacts for `source_id`, best first. Purely a
    /// read; an empty result may mean "not computed yet".
    pub async fn get_similar(&self, source_id: &str, limit: usize) -> Result<Vec<SimilarityResult>> {
        let rows = sqlx::query(
            r#"
            SELECT target_id, composite_score, breakdown
            FROM similarity_cache
            WHERE source_id = ?
            ORDER BY composite_score DESC, target_id
            LIMIT ?
            "#,
        )
        .bind(source_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let target_id: String = row.get("target_id");
            let composite_score: f64 = row.get("composite_score");
            let raw_breakdown: String = row.get("breakdown");
            let breakdown = ScoreBreakdown::from_json(&raw_breakdown)?;
            results.push(SimilarityResult::new(target_id, composite_score, breakdown));
        }
        Ok(results)
    }

    /// Recompute and persist the top similarity rows for one source
    /// artifact, replacing any existing rows in a single transaction.
    /// Returns the number of rows stored; an unknown source stores none.
    pub async fn compute_and_store(&self, source_id: &str, filter: SourceFilter) -> Result<usize> {
        let Some(source) = self.store.get(source_id).await? else {
            return Ok(0);
        };

        let candidates = self.candidates(&source, filter).await?;
        let results = self
            .service
            .score_candidates(&source, &candidates, 0.0, self.top_n)
            .await?;

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM similarity_cache WHERE source_id = ?")
            .bind(source_id)
            .execute(&mut *tx)
            .await?;
        for result in &results {
            sqlx::query(
                r#"
                INSERT INTO similarity_cache
                    (source_id, target_id, composite_score, breakdown, computed_at)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(source_id)
            .bind(result.artifact_id())
            .bind(result.composite_score())
            .bind(result.breakdown().to_json())
            .bind(chrono::Utc::now().timestamp())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        debug!(source_id, rows = results.len(), "similarity cache updated");
        Ok(results.len())
    }

    /// Drop every cached row that involves `artifact_id`, on either side
    /// of the pair. Called when an artifact changes or is removed.
    pub async fn invalidate(&self, artifact_id: &str) -> Result<u64> {
        let deleted = sqlx::query(
            "DELETE FROM similarity_cache WHERE source_id = ? OR target_id = ?",
        )
        .bind(artifact_id)
        .bind(artifact_id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(deleted)
    }

    /// Truncate the cache and recompute for every artifact in the
    /// filtered population. Returns the total rows stored.
    pub async fn rebuild_all(&self, filter: SourceFilter) -> Result<usize> {
        sqlx::query("DELETE FROM similarity_cache")
            .execute(&self.pool)
            .await?;

        let records = self.store.list(filter).await?;
        let mut total = 0;
        for record in &records {
            total += self.compute_and_store(&record.id, filter).await?;
        }
        info!(artifacts = records.len(), rows = total, "similarity cache rebuilt");
        Ok(total)
    }

    /// Candidate records for one recompute: text-index prefilter when
    /// possible, full population otherwise. The source itself is always
    /// excluded.
    async fn candidates(
        &self,
        source: &ArtifactRecord,
        filter: SourceFilter,
    ) -> Result<Vec<ArtifactRecord>> {
        let query = build_match_query(source, self.prefilter_tokens);

        if !query.is_empty() && self.index.is_available().await {
            match self.index.top_candidates(&query, self.prefilter_limit).await {
                Ok(ids) if !ids.is_empty() => {
                    let mut records = Vec::with_capacity(ids.len());
                    for id in ids {
                        if id == source.id {
                            continue;
                        }
                        if let Some(record) = self.store.get(&id).await? {
                            if filter.matches(&record.source) {
                                records.push(record);
                            }
                        }
                    }
                    return Ok(records);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("text-index prefilter failed, scanning all candidates: {}", e);
                }
            }
        }

        Ok(self
            .store
            .list(filter)
            .await?
            .into_iter()
            .filter(|r| r.id != source.id)
            .collect())
    }
}

/// FTS match query from the source's name, description, and tags: each
/// token quoted, OR-joined, capped at `max_tokens`.
fn build_match_query(source: &ArtifactRecord, max_tokens: usize) -> String {
    let text = format!(
        "{} {} {}",
        source.name,
        source.description.as_deref().unwrap_or(""),
        source.tags.join(" ")
    );
    tokenize(&text)
        .into_iter()
        .take(max_tokens)
        .map(|t| format!("\"{}\"", t))
        .collect::<Vec<_>>()
        .join(" OR ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::embedding::DisabledProvider;
    use crate::migrate::run_migrations;
    use crate::store::{MemoryArtifactStore, MemoryTextIndex};
    use std::collections::HashMap;
    use std::time::Duration;
    use tempfile::TempDir;

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

    struct Fixture {
        manager: SimilarityCacheManager,
        store: Arc<MemoryArtifactStore>,
        index: Arc<MemoryTextIndex>,
        _tmp: TempDir,
    }

    async fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let pool = db::connect(&tmp.path().join("rank.sqlite")).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let store = Arc::new(MemoryArtifactStore::new());
        let index = Arc::new(MemoryTextIndex::new());
        let service = SimilarityService::new(
            store.clone(),
            Arc::new(DisabledProvider),
            pool.clone(),
            Duration::from_millis(800),
        );
        let manager = SimilarityCacheManager::new(
            pool,
            store.clone(),
            index.clone(),
            service,
            20,
            50,
            20,
        );
        Fixture {
            manager,
            store,
            index,
            _tmp: tmp,
        }
    }

    fn seed(fixture: &Fixture) {
        for r in [
            record("src", "pdf-skill", "extract pdf text", &["pdf"], "same"),
            record("dup", "pdf-skill", "extract pdf text", &["pdf"], "same"),
            record("viewer", "pdf-viewer", "view pdf files", &["pdf"], "c3"),
            record("other", "image-processor", "resize images", &["images"], "c4"),
        ] {
            fixture
                .index
                .index(&r.id, &format!("{} {}", r.name, r.description.as_deref().unwrap_or("")));
            fixture.store.insert(r);
        }
    }

    #[test]
    fn test_build_match_query() {
        let r = record("src", "pdf-skill", "extract text", &["documents"], "c");
        assert_eq!(
            build_match_query(&r, 20),
            "\"pdf-skill\" OR \"extract\" OR \"text\" OR \"documents\""
        );
        assert_eq!(build_match_query(&r, 2), "\"pdf-skill\" OR \"extract\"");

        let empty = record("src", "", "", &[], "c");
        assert!(build_match_query(&empty, 20).is_empty());
    }

    #[tokio::test]
    async fn test_get_similar_is_read_only() {
        let f = fixture().await;
        seed(&f);
        // Nothing computed yet, so nothing comes back.
        assert!(f.manager.get_similar("src", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_compute_then_read() {
        let f = fixture().await;
        seed(&f);

        let stored = f
            .manager
            .compute_and_store("src", SourceFilter::All)
            .await
            .unwrap();
        assert!(stored >= 2);

        let results = f.manager.get_similar("src", 10).await.unwrap();
        assert_eq!(results[0].artifact_id(), "dup");
        for pair in results.windows(2) {
            assert!(pair[0].composite_score() >= pair[1].composite_score());
        }
        assert!(!results.iter().any(|r| r.artifact_id() == "src"));
    }

    #[tokio::test]
    async fn test_unknown_source_stores_nothing() {
        let f = fixture().await;
        seed(&f);
        let stored = f
            .manager
            .compute_and_store("missing", SourceFilter::All)
            .await
            .unwrap();
        assert_eq!(stored, 0);
    }

    #[tokio::test]
    async fn test_recompute_replaces_rows() {
        let f = fixture().await;
        seed(&f);
        f.manager.compute_and_store("src", SourceFilter::All).await.unwrap();

        // The duplicate disappears from the store and the index; the
        // recompute must not leave its stale row behind.
        f.store.remove("dup");
        f.index.remove("dup");
        f.manager.compute_and_store("src", SourceFilter::All).await.unwrap();

        let results = f.manager.get_similar("src", 10).await.unwrap();
        assert!(!results.iter().any(|r| r.artifact_id() == "dup"));
    }

    #[tokio::test]
    async fn test_invalidate_clears_both_sides() {
        let f = fixture().await;
        seed(&f);
        f.manager.compute_and_store("src", SourceFilter::All).await.unwrap();
        f.manager.compute_and_store("dup", SourceFilter::All).await.unwrap();

        let deleted = f.manager.invalidate("dup").await.unwrap();
        assert!(deleted >= 2);
        assert!(f.manager.get_similar("dup", 10).await.unwrap().is_empty());
        let remaining = f.manager.get_similar("src", 10).await.unwrap();
        assert!(!remaining.iter().any(|r| r.artifact_id() == "dup"));
    }

    #[tokio::test]
    async fn test_unavailable_index_falls_back_to_full_scan() {
        let f = fixture().await;
        seed(&f);
        f.index.set_available(false);

        let stored = f
            .manager
            .compute_and_store("src", SourceFilter::All)
            .await
            .unwrap();
        assert!(stored >= 2);
        let results = f.manager.get_similar("src", 10).await.unwrap();
        assert_eq!(results[0].artifact_id(), "dup");
    }

    #[tokio::test]
    async fn test_rebuild_all() {
        let f = fixture().await;
        seed(&f);
        let total = f.manager.rebuild_all(SourceFilter::All).await.unwrap();
        assert!(total > 0);
        assert!(!f.manager.get_similar("viewer", 10).await.unwrap().is_empty());
    }
}
