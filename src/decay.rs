//! Time decay and multi-source score aggregation.
//!
//! Community signals age at different rates: popularity and registry
//! numbers go stale, but a user's own rating is a statement of intent and
//! must not erode. `aggregate_with_decay` therefore decays sources
//! selectively, by source name.
//!
//! The decay curve shape is a tunable parameter rather than a fixed
//! formula; exponential half-life is the default, linear is available.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};

use crate::models::ScoreSource;

/// Source names whose scores pass through aggregation undecayed:
/// user-submitted ratings and low-volume maintenance-style signals.
pub const DECAY_EXEMPT_SOURCES: &[&str] = &["user_rating", "manual_review", "maintenance"];

/// Sample count used to saturate aggregate confidence.
const CONFIDENCE_SATURATION: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DecayCurve {
    /// Score halves every `half_life_days`.
    Exponential { half_life_days: f64 },
    /// Score loses `per_day` of its value per day, flooring at zero.
    Linear { per_day: f64 },
}

impl DecayCurve {
    /// Multiplicative factor in `(0, 1]`; 1.0 at age zero, strictly
    /// decreasing with age.
    pub fn factor(&self, age_days: f64) -> f64 {
        if age_days <= 0.0 {
            return 1.0;
        }
        match self {
            DecayCurve::Exponential { half_life_days } => 0.5f64.powf(age_days / half_life_days),
            DecayCurve::Linear { per_day } => (1.0 - per_day * age_days).max(0.0),
        }
    }
}

/// Result of applying decay to one score.
#[derive(Debug, Clone, Copy)]
pub struct DecayedScore {
    pub original: f64,
    pub decayed: f64,
    pub factor: f64,
}

pub struct ScoreDecay {
    curve: DecayCurve,
}

impl ScoreDecay {
    pub fn new(curve: DecayCurve) -> Result<Self> {
        match curve {
            DecayCurve::Exponential { half_life_days } if half_life_days <= 0.0 => {
                bail!("exponential decay half-life must be > 0");
            }
            DecayCurve::Linear { per_day } if !(0.0..=1.0).contains(&per_day) => {
                bail!("linear decay rate must be in [0, 1]");
            }
            _ => {}
        }
        Ok(Self { curve })
    }

    pub fn apply_decay(&self, score: f64, last_updated: DateTime<Utc>) -> DecayedScore {
        self.apply_decay_at(score, last_updated, Utc::now())
    }

    /// Decay relative to an explicit reference time.
    pub fn apply_decay_at(
        &self,
        score: f64,
        last_updated: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> DecayedScore {
        let age_days = (now - last_updated).num_seconds() as f64 / 86_400.0;
        let factor = self.curve.factor(age_days);
        DecayedScore {
            original: score,
            decayed: score * factor,
            factor,
        }
    }

    pub fn should_refresh(&self, last_updated: DateTime<Utc>, threshold_days: f64) -> bool {
        let age_days = (Utc::now() - last_updated).num_seconds() as f64 / 86_400.0;
        age_days > threshold_days
    }
}

/// Combined multi-source score.
#[derive(Debug, Clone, Copy)]
pub struct AggregateScore {
    /// Weighted mean in `[0, 100]`.
    pub final_score: f64,
    /// Sample-count-derived confidence in `[0, 1)`.
    pub confidence: f64,
}

/// Weight-normalized mean of all sources, with confidence growing toward
/// 1.0 as total sample count increases.
pub fn aggregate(sources: &[ScoreSource]) -> AggregateScore {
    combine(sources.iter().map(|s| (s.score, s.weight, s.sample_count)))
}

/// Like [`aggregate`], but decays non-exempt sources by age first.
pub fn aggregate_with_decay(sources: &[ScoreSource], decay: &ScoreDecay) -> AggregateScore {
    combine(sources.iter().map(|s| {
        let score = if is_decay_exempt(&s.name) {
            s.score
        } else {
            decay.apply_decay(s.score, s.last_updated).decayed
        };
        (score, s.weight, s.sample_count)
    }))
}

pub fn is_decay_exempt(source_name: &str) -> bool {
    DECAY_EXEMPT_SOURCES.contains(&source_name)
}

fn combine(entries: impl Iterator<Item = (f64, f64, u64)>) -> AggregateScore {
    let mut weighted_sum = 0.0;
    let mut total_weight = 0.0;
    let mut total_samples = 0u64;

    for (score, weight, samples) in entries {
        let weight = weight.max(0.0);
        weighted_sum += score.clamp(0.0, 100.0) * weight;
        total_weight += weight;
        total_samples += samples;
    }

    if total_weight <= 0.0 {
        return AggregateScore {
            final_score: 0.0,
            confidence: 0.0,
        };
    }

    let samples = total_samples as f64;
    AggregateScore {
        final_score: weighted_sum / total_weight,
        confidence: samples / (samples + CONFIDENCE_SATURATION),
    }
}
