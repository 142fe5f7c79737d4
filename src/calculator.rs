//! Per-artifact hybrid score calculation.
//!
//! Combines the keyword baseline with an optional semantic score, applies
//! the project-context boost, and folds trust and quality into the final
//! confidence. Semantic scoring runs under a wall-clock budget; any
//! failure or timeout falls back to keyword-only and is reported through
//! [`SemanticOutcome`] so the caller can mark the result degraded.

use std::time::Duration;

use tracing::warn;

use crate::context::ContextBooster;
use crate::keyword::FieldMatcher;
use crate::models::{ArtifactScore, ArtifactView, ConfidenceWeights};
use crate::semantic::SemanticScorer;
use crate::timeout::run_with_budget;

/// Share of the blended match score taken by each component when
/// semantic scoring succeeds.
pub const SEMANTIC_BLEND: f64 = 0.60;
pub const KEYWORD_BLEND: f64 = 0.40;

/// How the semantic attempt for one artifact ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemanticOutcome {
    /// Semantic score computed and blended in.
    Used,
    /// No semantic scorer was configured; keyword-only is the normal mode.
    NotConfigured,
    /// The provider reported itself unavailable before any attempt.
    Unavailable,
    /// The attempt ran but produced no embedding or an error.
    Failed,
    /// The attempt exceeded its wall-clock budget and was aborted.
    TimedOut,
}

impl SemanticOutcome {
    /// Human-readable reason for degradation, `None` for the two
    /// non-degraded outcomes.
    pub fn degradation_reason(&self) -> Option<&'static str> {
        match self {
            SemanticOutcome::Used | SemanticOutcome::NotConfigured => None,
            SemanticOutcome::Unavailable => Some("embedding provider unavailable"),
            SemanticOutcome::Failed => Some("semantic scoring failed"),
            SemanticOutcome::TimedOut => Some("semantic scoring timed out"),
        }
    }
}

pub struct ScoreCalculator {
    matcher: FieldMatcher,
    semantic: Option<SemanticScorer>,
    booster: ContextBooster,
    weights: ConfidenceWeights,
    semantic_budget: Duration,
}

impl ScoreCalculator {
    pub fn new(
        matcher: FieldMatcher,
        semantic: Option<SemanticScorer>,
        booster: ContextBooster,
        weights: ConfidenceWeights,
        semantic_budget: Duration,
    ) -> Self {
        Self {
            matcher,
            semantic,
            booster,
            weights,
            semantic_budget,
        }
    }

    /// Score one artifact against the query.
    ///
    /// The returned outcome says whether semantic scoring contributed; the
    /// score itself is always valid, keyword-only in the worst case.
    pub async fn calculate(
        &self,
        query: &str,
        artifact: &ArtifactView,
        trust: f64,
        quality: f64,
    ) -> (ArtifactScore, SemanticOutcome) {
        let keyword = self.matcher.score(query, artifact);
        let (semantic, outcome) = self.semantic_score(query, artifact).await;

        let blended = match semantic {
            Some(semantic) => semantic * SEMANTIC_BLEND + keyword * KEYWORD_BLEND,
            None => keyword,
        };
        let boosted = (blended * self.booster.boost(artifact)).min(100.0);

        let score = ArtifactScore::new(&artifact.id, trust, quality, Some(boosted), &self.weights);
        (score, outcome)
    }

    async fn semantic_score(
        &self,
        query: &str,
        artifact: &ArtifactView,
    ) -> (Option<f64>, SemanticOutcome) {
        let Some(scorer) = &self.semantic else {
            return (None, SemanticOutcome::NotConfigured);
        };
        if !scorer.is_available().await {
            return (None, SemanticOutcome::Unavailable);
        }

        let scorer = scorer.clone();
        let query = query.to_string();
        let artifact = artifact.clone();
        let attempt = run_with_budget(self.semantic_budget, async move {
            scorer.score(&query, &artifact).await
        })
        .await;

        match attempt {
            None => {
                warn!(
                    budget_ms = self.semantic_budget.as_millis() as u64,
                    "semantic scoring timed out, falling back to keyword-only"
                );
                (None, SemanticOutcome::TimedOut)
            }
            Some(Err(e)) => {
                warn!("semantic scoring failed: {}", e);
                (None, SemanticOutcome::Failed)
            }
            Some(Ok(None)) => (None, SemanticOutcome::Failed),
            Some(Ok(Some(score))) => (Some(score), SemanticOutcome::Used),
        }
    }
}
