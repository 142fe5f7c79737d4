//! Core data models used throughout the scoring and similarity engine.
//!
//! These types represent artifact snapshots, fingerprints, score breakdowns,
//! and scoring results that flow through the matching and deduplication
//! pipeline. Types whose fields are derived from other fields (match type,
//! confidence) compute them at construction and expose read-only accessors.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// Current schema version for [`ArtifactScore`] values.
pub const SCORE_SCHEMA_VERSION: u32 = 1;

/// Read-only snapshot of an artifact, as supplied by the artifact store.
#[derive(Debug, Clone)]
pub struct ArtifactView {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub title: Option<String>,
    pub description: Option<String>,
    /// Ordered, de-duplicated tag list.
    pub tags: Vec<String>,
    /// Free-form string metadata (e.g. `aliases`, `source_type`).
    pub extra: HashMap<String, String>,
}

impl ArtifactView {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        kind: impl Into<String>,
        title: Option<String>,
        description: Option<String>,
        tags: Vec<String>,
        extra: HashMap<String, String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: kind.into(),
            title,
            description,
            tags: dedupe_preserving_order(tags),
            extra,
        }
    }

    /// The text used for semantic comparison and context boosting:
    /// title, description, and tags joined with single spaces.
    pub fn combined_text(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        if let Some(title) = &self.title {
            parts.push(title);
        }
        if let Some(description) = &self.description {
            parts.push(description);
        }
        let tags = self.tags.join(" ");
        if !tags.is_empty() {
            parts.push(&tags);
        }
        parts.join(" ")
    }

    /// Alias list from `extra["aliases"]`, comma-separated.
    pub fn aliases(&self) -> Vec<String> {
        self.extra
            .get("aliases")
            .map(|raw| {
                raw.split(',')
                    .map(|a| a.trim().to_string())
                    .filter(|a| !a.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Source type used for the static trust lookup, defaulting to `unknown`.
    pub fn source_type(&self) -> &str {
        self.extra
            .get("source_type")
            .map(String::as_str)
            .unwrap_or("unknown")
    }
}

/// Full artifact row as enumerated by the artifact store.
///
/// Extends [`ArtifactView`] with the content/structure hashes and size
/// figures needed for fingerprint comparison, plus the `source` label
/// (`collection` or `marketplace`) used for candidate filtering.
#[derive(Debug, Clone)]
pub struct ArtifactRecord {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub extra: HashMap<String, String>,
    pub content_hash: String,
    pub structure_hash: String,
    pub total_size: u64,
    pub file_count: u32,
    pub source: String,
}

impl ArtifactRecord {
    /// Project the record down to the read-only view used by scorers.
    pub fn view(&self) -> ArtifactView {
        ArtifactView {
            id: self.id.clone(),
            name: self.name.clone(),
            kind: self.kind.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            tags: self.tags.clone(),
            extra: self.extra.clone(),
        }
    }
}

/// Comparison-oriented summary of an artifact. Built on demand per
/// comparison, never persisted.
#[derive(Debug, Clone)]
pub struct Fingerprint {
    pub name: String,
    pub kind: String,
    pub content_hash: String,
    pub structure_hash: String,
    pub metadata_hash: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub file_count: u32,
    pub total_size: u64,
}

impl Fingerprint {
    pub fn from_record(record: &ArtifactRecord) -> Self {
        let mut sorted_tags = record.tags.clone();
        sorted_tags.sort();

        let mut hasher = Sha256::new();
        hasher.update(record.name.as_bytes());
        hasher.update(b"|");
        hasher.update(record.kind.as_bytes());
        hasher.update(b"|");
        hasher.update(sorted_tags.join(",").as_bytes());
        let metadata_hash = hex::encode(hasher.finalize());

        Self {
            name: record.name.clone(),
            kind: record.kind.clone(),
            content_hash: record.content_hash.clone(),
            structure_hash: record.structure_hash.clone(),
            metadata_hash,
            title: record.title.clone(),
            description: record.description.clone(),
            tags: record.tags.clone(),
            file_count: record.file_count,
            total_size: record.total_size,
        }
    }
}

/// Per-component similarity scores, each in `[0, 1]`.
///
/// `semantic == None` means "unavailable or timed out", not zero; the
/// composite weighting redistributes the semantic share when absent.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreBreakdown {
    pub keyword: f64,
    pub content: f64,
    pub structure: f64,
    pub metadata: f64,
    pub semantic: Option<f64>,
}

impl ScoreBreakdown {
    /// Serialize as a flat `key → float` JSON map. The `semantic` key is
    /// omitted entirely when the component was not computed — absence, not
    /// `null`, signals "unavailable".
    pub fn to_json(&self) -> String {
        let mut map = serde_json::Map::new();
        map.insert("keyword".into(), self.keyword.into());
        map.insert("content".into(), self.content.into());
        map.insert("structure".into(), self.structure.into());
        map.insert("metadata".into(), self.metadata.into());
        if let Some(semantic) = self.semantic {
            map.insert("semantic".into(), semantic.into());
        }
        serde_json::Value::Object(map).to_string()
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        let get = |key: &str| value.get(key).and_then(|v| v.as_f64());
        Ok(Self {
            keyword: get("keyword").unwrap_or(0.0),
            content: get("content").unwrap_or(0.0),
            structure: get("structure").unwrap_or(0.0),
            metadata: get("metadata").unwrap_or(0.0),
            semantic: get("semantic"),
        })
    }
}

/// Discrete similarity classification, derived from the composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    Exact,
    NearDuplicate,
    Similar,
    Related,
}

impl MatchType {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.95 {
            MatchType::Exact
        } else if score >= 0.80 {
            MatchType::NearDuplicate
        } else if score >= 0.50 {
            MatchType::Similar
        } else {
            MatchType::Related
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Exact => "exact",
            MatchType::NearDuplicate => "near_duplicate",
            MatchType::Similar => "similar",
            MatchType::Related => "related",
        }
    }
}

/// One pairwise similarity result. The match type is derived from the
/// composite score at construction and cannot be set independently.
#[derive(Debug, Clone)]
pub struct SimilarityResult {
    artifact_id: String,
    composite_score: f64,
    breakdown: ScoreBreakdown,
    match_type: MatchType,
}

impl SimilarityResult {
    pub fn new(
        artifact_id: impl Into<String>,
        composite_score: f64,
        breakdown: ScoreBreakdown,
    ) -> Self {
        let composite_score = composite_score.clamp(0.0, 1.0);
        Self {
            artifact_id: artifact_id.into(),
            composite_score,
            breakdown,
            match_type: MatchType::from_score(composite_score),
        }
    }

    pub fn artifact_id(&self) -> &str {
        &self.artifact_id
    }

    pub fn composite_score(&self) -> f64 {
        self.composite_score
    }

    pub fn breakdown(&self) -> &ScoreBreakdown {
        &self.breakdown
    }

    pub fn match_type(&self) -> MatchType {
        self.match_type
    }
}

/// Weights blending trust, quality, and match into a confidence score.
/// Must sum to 1.0 ± 0.01.
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceWeights {
    pub trust: f64,
    pub quality: f64,
    pub match_weight: f64,
}

impl ConfidenceWeights {
    pub fn new(trust: f64, quality: f64, match_weight: f64) -> Result<Self> {
        let sum = trust + quality + match_weight;
        if (sum - 1.0).abs() > 0.01 {
            bail!(
                "confidence weights must sum to 1.0 (got {:.4}: trust={}, quality={}, match={})",
                sum,
                trust,
                quality,
                match_weight
            );
        }
        Ok(Self {
            trust,
            quality,
            match_weight,
        })
    }
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            trust: 0.25,
            quality: 0.25,
            match_weight: 0.50,
        }
    }
}

/// Final per-artifact score. `confidence` is always recomputed from the
/// trust/quality/match inputs on construction — it can never be supplied
/// independently, so it cannot drift from its components.
#[derive(Debug, Clone)]
pub struct ArtifactScore {
    artifact_id: String,
    trust_score: f64,
    quality_score: f64,
    match_score: Option<f64>,
    confidence: f64,
    schema_version: u32,
    last_updated: DateTime<Utc>,
}

impl ArtifactScore {
    pub fn new(
        artifact_id: impl Into<String>,
        trust_score: f64,
        quality_score: f64,
        match_score: Option<f64>,
        weights: &ConfidenceWeights,
    ) -> Self {
        let trust_score = trust_score.clamp(0.0, 100.0);
        let quality_score = quality_score.clamp(0.0, 100.0);
        let match_score = match_score.map(|m| m.clamp(0.0, 100.0));
        let confidence = (trust_score * weights.trust
            + quality_score * weights.quality
            + match_score.unwrap_or(0.0) * weights.match_weight)
            .clamp(0.0, 100.0);

        Self {
            artifact_id: artifact_id.into(),
            trust_score,
            quality_score,
            match_score,
            confidence,
            schema_version: SCORE_SCHEMA_VERSION,
            last_updated: Utc::now(),
        }
    }

    pub fn artifact_id(&self) -> &str {
        &self.artifact_id
    }

    pub fn trust_score(&self) -> f64 {
        self.trust_score
    }

    pub fn quality_score(&self) -> f64 {
        self.quality_score
    }

    pub fn match_score(&self) -> Option<f64> {
        self.match_score
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }
}

/// Result of one query-match request.
#[derive(Debug, Clone)]
pub struct ScoringResult {
    scores: Vec<ArtifactScore>,
    used_semantic: bool,
    degraded: bool,
    degradation_reason: Option<String>,
    duration: Duration,
    query: String,
}

impl ScoringResult {
    /// Rejects `degraded == true` without a non-empty reason, so callers
    /// can always surface one coherent message.
    pub fn new(
        scores: Vec<ArtifactScore>,
        used_semantic: bool,
        degraded: bool,
        degradation_reason: Option<String>,
        duration: Duration,
        query: impl Into<String>,
    ) -> Result<Self> {
        if degraded
            && degradation_reason
                .as_deref()
                .map_or(true, |r| r.trim().is_empty())
        {
            bail!("degraded scoring result requires a non-empty degradation_reason");
        }
        Ok(Self {
            scores,
            used_semantic,
            degraded,
            degradation_reason,
            duration,
            query: query.into(),
        })
    }

    pub fn scores(&self) -> &[ArtifactScore] {
        &self.scores
    }

    pub fn used_semantic(&self) -> bool {
        self.used_semantic
    }

    pub fn degraded(&self) -> bool {
        self.degraded
    }

    pub fn degradation_reason(&self) -> Option<&str> {
        self.degradation_reason.as_deref()
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn query(&self) -> &str {
        &self.query
    }
}

/// An atomic community score signal (e.g. registry star counts),
/// consumed by the decay/aggregation component.
#[derive(Debug, Clone)]
pub struct ScoreSource {
    pub name: String,
    /// Score in `[0, 100]`.
    pub score: f64,
    pub weight: f64,
    pub last_updated: DateTime<Utc>,
    pub sample_count: u64,
}

fn dedupe_preserving_order(tags: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tags.into_iter().filter(|t| seen.insert(t.clone())).collect()
}
