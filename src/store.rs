//! Collaborator traits and reference implementations.
//!
//! The engine reads artifacts, ratings, and text-index candidates through
//! these traits; it never owns that data. [`MemoryArtifactStore`],
//! [`MemoryRatingStore`], and [`MemoryTextIndex`] back tests and embedded
//! use; [`SqliteFtsIndex`] is a concrete [`TextIndex`] over the FTS5 table
//! created by the migrations.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use anyhow::{bail, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::keyword::tokenize;
use crate::models::ArtifactRecord;

/// Which artifact population to compare against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFilter {
    Collection,
    Marketplace,
    All,
}

impl SourceFilter {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "collection" => Ok(SourceFilter::Collection),
            "marketplace" => Ok(SourceFilter::Marketplace),
            "all" => Ok(SourceFilter::All),
            other => bail!(
                "Unknown source filter: '{}'. Must be collection, marketplace, or all.",
                other
            ),
        }
    }

    pub fn matches(&self, source: &str) -> bool {
        match self {
            SourceFilter::Collection => source == "collection",
            SourceFilter::Marketplace => source == "marketplace",
            SourceFilter::All => true,
        }
    }
}

/// Enumerable source of artifact records.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<ArtifactRecord>>;
    async fn list(&self, filter: SourceFilter) -> Result<Vec<ArtifactRecord>>;
}

/// Per-artifact user ratings on the 1-5 scale.
#[async_trait]
pub trait RatingStore: Send + Sync {
    async fn ratings(&self, artifact_id: &str) -> Result<Vec<u8>>;
}

/// "Top-K candidates matching these terms" query, used only as a cheap
/// prefilter before pairwise scoring.
#[async_trait]
pub trait TextIndex: Send + Sync {
    async fn is_available(&self) -> bool {
        true
    }

    async fn top_candidates(&self, query: &str, limit: usize) -> Result<Vec<String>>;
}

// ============ In-memory implementations ============

/// In-memory artifact store for testing and embedded environments.
pub struct MemoryArtifactStore {
    artifacts: RwLock<HashMap<String, ArtifactRecord>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self {
            artifacts: RwLock::new(HashMap::new()),
        }
    }

    pub fn insert(&self, record: ArtifactRecord) {
        let mut artifacts = self.artifacts.write().unwrap();
        artifacts.insert(record.id.clone(), record);
    }

    pub fn remove(&self, id: &str) {
        let mut artifacts = self.artifacts.write().unwrap();
        artifacts.remove(id);
    }
}

impl Default for MemoryArtifactStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn get(&self, id: &str) -> Result<Option<ArtifactRecord>> {
        let artifacts = self.artifacts.read().unwrap();
        Ok(artifacts.get(id).cloned())
    }

    async fn list(&self, filter: SourceFilter) -> Result<Vec<ArtifactRecord>> {
        let artifacts = self.artifacts.read().unwrap();
        let mut records: Vec<ArtifactRecord> = artifacts
            .values()
            .filter(|r| filter.matches(&r.source))
            .cloned()
            .collect();
        // Stable iteration order for callers that enumerate.
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }
}

/// In-memory rating store.
pub struct MemoryRatingStore {
    ratings: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryRatingStore {
    pub fn new() -> Self {
        Self {
            ratings: RwLock::new(HashMap::new()),
        }
    }

    pub fn add_rating(&self, artifact_id: &str, stars: u8) -> Result<()> {
        if !(1..=5).contains(&stars) {
            bail!("rating must be between 1 and 5 (got {})", stars);
        }
        let mut ratings = self.ratings.write().unwrap();
        ratings.entry(artifact_id.to_string()).or_default().push(stars);
        Ok(())
    }
}

impl Default for MemoryRatingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RatingStore for MemoryRatingStore {
    async fn ratings(&self, artifact_id: &str) -> Result<Vec<u8>> {
        let ratings = self.ratings.read().unwrap();
        Ok(ratings.get(artifact_id).cloned().unwrap_or_default())
    }
}

/// In-memory text index: brute-force token-overlap ranking.
///
/// `set_available(false)` simulates an index outage so fallback paths can
/// be exercised.
pub struct MemoryTextIndex {
    docs: RwLock<HashMap<String, Vec<String>>>,
    available: AtomicBool,
}

impl MemoryTextIndex {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    pub fn index(&self, artifact_id: &str, text: &str) {
        let mut docs = self.docs.write().unwrap();
        docs.insert(artifact_id.to_string(), tokenize(text));
    }

    pub fn remove(&self, artifact_id: &str) {
        let mut docs = self.docs.write().unwrap();
        docs.remove(artifact_id);
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }
}

impl Default for MemoryTextIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextIndex for MemoryTextIndex {
    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn top_candidates(&self, query: &str, limit: usize) -> Result<Vec<String>> {
        if !self.available.load(Ordering::SeqCst) {
            bail!("text index unavailable");
        }
        // Queries arrive quoted and OR-joined; strip the syntax back to
        // plain tokens.
        let terms = tokenize(&query.replace("OR", " "));
        let docs = self.docs.read().unwrap();

        let mut hits: Vec<(String, usize)> = docs
            .iter()
            .map(|(id, tokens)| {
                let overlap = terms.iter().filter(|t| tokens.contains(t)).count();
                (id.clone(), overlap)
            })
            .filter(|(_, overlap)| *overlap > 0)
            .collect();

        hits.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        hits.truncate(limit);
        Ok(hits.into_iter().map(|(id, _)| id).collect())
    }
}

// ============ SQLite FTS index ============

/// [`TextIndex`] backed by the `artifacts_fts` FTS5 table.
///
/// Deployments without an external index populate it through
/// [`index_artifact`](SqliteFtsIndex::index_artifact) and still get the
/// cheap prefilter.
pub struct SqliteFtsIndex {
    pool: SqlitePool,
}

impl SqliteFtsIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn index_artifact(&self, record: &ArtifactRecord) -> Result<()> {
        let text = format!(
            "{} {} {}",
            record.name,
            record.view().combined_text(),
            record.kind
        );

        sqlx::query("DELETE FROM artifacts_fts WHERE artifact_id = ?")
            .bind(&record.id)
            .execute(&self.pool)
            .await?;
        sqlx::query("INSERT INTO artifacts_fts (artifact_id, text) VALUES (?, ?)")
            .bind(&record.id)
            .bind(&text)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn remove(&self, artifact_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM artifacts_fts WHERE artifact_id = ?")
            .bind(artifact_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl TextIndex for SqliteFtsIndex {
    async fn top_candidates(&self, query: &str, limit: usize) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT artifact_id
            FROM artifacts_fts
            WHERE artifacts_fts MATCH ?
            ORDER BY rank
            LIMIT ?
            "#,
        )
        .bind(query)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|row| row.get("artifact_id")).collect())
    }
}
