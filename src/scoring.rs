//! Query-match orchestration.
//!
//! Runs the full ranking pass for one query: trust lookup, Bayesian
//! quality, hybrid match calculation per artifact, then a confidence-sorted
//! [`ScoringResult`] carrying the degradation state for the whole batch.

use std::time::Instant;

use anyhow::Result;
use tracing::{debug, info};

use crate::calculator::{ScoreCalculator, SemanticOutcome};
use crate::models::{ArtifactScore, ArtifactView, ScoringResult};
use crate::quality::{trust_score, QualityScorer};

pub struct ScoringService {
    calculator: ScoreCalculator,
    quality: QualityScorer,
}

impl ScoringService {
    pub fn new(calculator: ScoreCalculator, quality: QualityScorer) -> Self {
        Self {
            calculator,
            quality,
        }
    }

    /// Score and rank the given artifacts against the query.
    ///
    /// Always produces a result: semantic failures degrade individual
    /// scores to keyword-only and are surfaced once, batch-wide, through
    /// the result's degradation fields.
    pub async fn score_artifacts(
        &self,
        query: &str,
        artifacts: &[ArtifactView],
    ) -> Result<ScoringResult> {
        let start = Instant::now();

        let mut scores: Vec<ArtifactScore> = Vec::with_capacity(artifacts.len());
        let mut used_semantic = false;
        let mut degradation_reason: Option<String> = None;

        for artifact in artifacts {
            let trust = trust_score(artifact.source_type());
            let quality = self.quality.quality(&artifact.id).await;

            let (score, outcome) = self
                .calculator
                .calculate(query, artifact, trust, quality)
                .await;

            if outcome == SemanticOutcome::Used {
                used_semantic = true;
            }
            if degradation_reason.is_none() {
                if let Some(reason) = outcome.degradation_reason() {
                    degradation_reason = Some(reason.to_string());
                }
            }

            debug!(
                artifact_id = %score.artifact_id(),
                confidence = score.confidence(),
                outcome = ?outcome,
                "scored artifact"
            );
            scores.push(score);
        }

        scores.sort_by(|a, b| {
            b.confidence()
                .partial_cmp(&a.confidence())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.artifact_id().cmp(b.artifact_id()))
        });

        let degraded = degradation_reason.is_some();
        let duration = start.elapsed();
        info!(
            query = %query,
            artifacts = artifacts.len(),
            used_semantic,
            degraded,
            duration_ms = duration.as_millis() as u64,
            "query match complete"
        );

        ScoringResult::new(
            scores,
            used_semantic,
            degraded,
            degradation_reason,
            duration,
            query,
        )
    }
}
