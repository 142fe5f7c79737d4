//! Bayesian-averaged rating quality and static source trust.
//!
//! Quality blends observed 1-5 ratings with a configurable prior weighted
//! as virtual ratings, so sparsely-rated artifacts are pulled toward
//! neutral instead of swinging on a single review. With the default prior
//! weight of 5, roughly ten real ratings are needed before the prior's
//! influence drops below a third.

use std::sync::Arc;

use anyhow::{bail, Result};
use tracing::warn;

use crate::store::RatingStore;

/// Static trust score by artifact source type. Unrecognized types fall
/// back to `unknown`, never an error.
pub fn trust_score(source_type: &str) -> f64 {
    match source_type {
        "official" => 95.0,
        "verified" => 80.0,
        "github" => 60.0,
        "local" => 50.0,
        _ => 40.0,
    }
}

pub struct QualityScorer {
    store: Arc<dyn RatingStore>,
    prior: f64,
    prior_weight: f64,
}

impl QualityScorer {
    pub fn new(store: Arc<dyn RatingStore>, prior: f64, prior_weight: f64) -> Result<Self> {
        if !(0.0..=100.0).contains(&prior) {
            bail!("quality prior must be in [0, 100] (got {})", prior);
        }
        if prior_weight < 0.0 {
            bail!("quality prior_weight must be >= 0 (got {})", prior_weight);
        }
        Ok(Self {
            store,
            prior,
            prior_weight,
        })
    }

    /// Quality score in `[0, 100]`. Zero ratings yields the prior exactly;
    /// a rating-store failure degrades to the prior rather than erroring.
    pub async fn quality(&self, artifact_id: &str) -> f64 {
        let ratings = match self.store.ratings(artifact_id).await {
            Ok(ratings) => ratings,
            Err(e) => {
                warn!("rating lookup failed for {}: {}", artifact_id, e);
                return self.prior;
            }
        };

        if ratings.is_empty() {
            return self.prior;
        }

        let n = ratings.len() as f64;
        let mean = ratings
            .iter()
            .map(|r| f64::from((*r).clamp(1, 5)))
            .sum::<f64>()
            / n;
        // Rescale the 1-5 mean onto 0-100.
        let rescaled = (mean - 1.0) * 25.0;

        ((self.prior * self.prior_weight + rescaled * n) / (self.prior_weight + n))
            .clamp(0.0, 100.0)
    }
}
