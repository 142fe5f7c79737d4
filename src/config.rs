use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub confidence: ConfidenceConfig,
    #[serde(default)]
    pub semantic: SemanticConfig,
    #[serde(default)]
    pub boost: BoostConfig,
    #[serde(default)]
    pub quality: QualityConfig,
    #[serde(default)]
    pub decay: DecayConfig,
    #[serde(default)]
    pub similarity: SimilarityConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Weighted-field keyword matching. Field weights must sum to 1.0 ± 0.01.
#[derive(Debug, Deserialize, Clone)]
pub struct MatchingConfig {
    #[serde(default = "default_name_weight")]
    pub name_weight: f64,
    #[serde(default = "default_title_weight")]
    pub title_weight: f64,
    #[serde(default = "default_tags_weight")]
    pub tags_weight: f64,
    #[serde(default = "default_description_weight")]
    pub description_weight: f64,
    #[serde(default = "default_aliases_weight")]
    pub aliases_weight: f64,
    /// Results below this keyword score are dropped by `score_all`.
    #[serde(default = "default_relevance_floor")]
    pub relevance_floor: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            name_weight: default_name_weight(),
            title_weight: default_title_weight(),
            tags_weight: default_tags_weight(),
            description_weight: default_description_weight(),
            aliases_weight: default_aliases_weight(),
            relevance_floor: default_relevance_floor(),
        }
    }
}

fn default_name_weight() -> f64 {
    0.30
}
fn default_title_weight() -> f64 {
    0.25
}
fn default_tags_weight() -> f64 {
    0.20
}
fn default_description_weight() -> f64 {
    0.15
}
fn default_aliases_weight() -> f64 {
    0.10
}
fn default_relevance_floor() -> f64 {
    10.0
}

/// Trust/quality/match blend. Must sum to 1.0 ± 0.01.
#[derive(Debug, Deserialize, Clone)]
pub struct ConfidenceConfig {
    #[serde(default = "default_trust_weight")]
    pub trust_weight: f64,
    #[serde(default = "default_quality_weight")]
    pub quality_weight: f64,
    #[serde(default = "default_match_weight")]
    pub match_weight: f64,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            trust_weight: default_trust_weight(),
            quality_weight: default_quality_weight(),
            match_weight: default_match_weight(),
        }
    }
}

fn default_trust_weight() -> f64 {
    0.25
}
fn default_quality_weight() -> f64 {
    0.25
}
fn default_match_weight() -> f64 {
    0.50
}

#[derive(Debug, Deserialize, Clone)]
pub struct SemanticConfig {
    /// Floor for the semantic score, also returned when an artifact has no
    /// text to compare.
    #[serde(default)]
    pub min_score: f64,
    #[serde(default = "default_semantic_max")]
    pub max_score: f64,
    /// Wall-clock budget for semantic scoring on the query-match path.
    #[serde(default = "default_semantic_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            min_score: 0.0,
            max_score: default_semantic_max(),
            timeout_ms: default_semantic_timeout_ms(),
        }
    }
}

fn default_semantic_max() -> f64 {
    100.0
}
fn default_semantic_timeout_ms() -> u64 {
    5_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct BoostConfig {
    /// Project root probed for manifest files. Defaults to the working
    /// directory.
    #[serde(default = "default_project_root")]
    pub project_root: PathBuf,
    /// Multiplier applied on a context match; clamped into [1.0, 1.2].
    #[serde(default = "default_boost_multiplier")]
    pub multiplier: f64,
}

impl Default for BoostConfig {
    fn default() -> Self {
        Self {
            project_root: default_project_root(),
            multiplier: default_boost_multiplier(),
        }
    }
}

fn default_project_root() -> PathBuf {
    PathBuf::from(".")
}
fn default_boost_multiplier() -> f64 {
    1.1
}

#[derive(Debug, Deserialize, Clone)]
pub struct QualityConfig {
    /// Cold-start prior on the 0-100 scale.
    #[serde(default = "default_quality_prior")]
    pub prior: f64,
    /// Virtual rating count backing the prior.
    #[serde(default = "default_prior_weight")]
    pub prior_weight: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            prior: default_quality_prior(),
            prior_weight: default_prior_weight(),
        }
    }
}

fn default_quality_prior() -> f64 {
    50.0
}
fn default_prior_weight() -> f64 {
    5.0
}

#[derive(Debug, Deserialize, Clone)]
pub struct DecayConfig {
    /// `exponential` or `linear`.
    #[serde(default = "default_decay_curve")]
    pub curve: String,
    /// Half-life in days for the exponential curve.
    #[serde(default = "default_half_life_days")]
    pub half_life_days: f64,
    /// Fraction lost per day for the linear curve.
    #[serde(default = "default_linear_per_day")]
    pub linear_per_day: f64,
    /// Age beyond which a source should be refreshed.
    #[serde(default = "default_refresh_threshold_days")]
    pub refresh_threshold_days: f64,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            curve: default_decay_curve(),
            half_life_days: default_half_life_days(),
            linear_per_day: default_linear_per_day(),
            refresh_threshold_days: default_refresh_threshold_days(),
        }
    }
}

fn default_decay_curve() -> String {
    "exponential".to_string()
}
fn default_half_life_days() -> f64 {
    180.0
}
fn default_linear_per_day() -> f64 {
    0.002
}
fn default_refresh_threshold_days() -> f64 {
    30.0
}

#[derive(Debug, Deserialize, Clone)]
pub struct SimilarityConfig {
    /// Wall-clock budget for semantic work per candidate.
    #[serde(default = "default_similarity_budget_ms")]
    pub semantic_budget_ms: u64,
    #[serde(default = "default_similarity_limit")]
    pub limit: usize,
    #[serde(default = "default_similarity_min_score")]
    pub min_score: f64,
    /// Rows kept per source by the cache manager.
    #[serde(default = "default_cache_top_n")]
    pub cache_top_n: usize,
    /// Candidate ids requested from the text-index prefilter.
    #[serde(default = "default_prefilter_limit")]
    pub prefilter_limit: usize,
    /// Tokens taken from name+description+tags for the prefilter query.
    #[serde(default = "default_prefilter_tokens")]
    pub prefilter_tokens: usize,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            semantic_budget_ms: default_similarity_budget_ms(),
            limit: default_similarity_limit(),
            min_score: default_similarity_min_score(),
            cache_top_n: default_cache_top_n(),
            prefilter_limit: default_prefilter_limit(),
            prefilter_tokens: default_prefilter_tokens(),
        }
    }
}

fn default_similarity_budget_ms() -> u64 {
    800
}
fn default_similarity_limit() -> usize {
    10
}
fn default_similarity_min_score() -> f64 {
    0.3
}
fn default_cache_top_n() -> usize {
    20
}
fn default_prefilter_limit() -> usize {
    50
}
fn default_prefilter_tokens() -> usize {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `disabled`, `local`, or `remote`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Endpoint for the remote provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// TTL for the remote provider's text-keyed embedding cache.
    #[serde(default = "default_cache_ttl_days")]
    pub cache_ttl_days: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
            cache_ttl_days: 7,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_cache_ttl_days() -> u64 {
    7
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Invalid weight sets and malformed provider config are fatal here,
    /// never silently corrected.
    pub fn validate(&self) -> Result<()> {
        let field_sum = self.matching.name_weight
            + self.matching.title_weight
            + self.matching.tags_weight
            + self.matching.description_weight
            + self.matching.aliases_weight;
        if (field_sum - 1.0).abs() > 0.01 {
            anyhow::bail!("matching field weights must sum to 1.0 (got {:.4})", field_sum);
        }

        let confidence_sum = self.confidence.trust_weight
            + self.confidence.quality_weight
            + self.confidence.match_weight;
        if (confidence_sum - 1.0).abs() > 0.01 {
            anyhow::bail!(
                "confidence weights must sum to 1.0 (got {:.4})",
                confidence_sum
            );
        }

        if !(0.0..=100.0).contains(&self.semantic.min_score)
            || !(0.0..=100.0).contains(&self.semantic.max_score)
            || self.semantic.min_score > self.semantic.max_score
        {
            anyhow::bail!(
                "semantic score bounds must satisfy 0 <= min <= max <= 100 (got {} / {})",
                self.semantic.min_score,
                self.semantic.max_score
            );
        }

        if !(0.0..=100.0).contains(&self.quality.prior) {
            anyhow::bail!("quality.prior must be in [0, 100]");
        }
        if self.quality.prior_weight < 0.0 {
            anyhow::bail!("quality.prior_weight must be >= 0");
        }

        match self.decay.curve.as_str() {
            "exponential" => {
                if self.decay.half_life_days <= 0.0 {
                    anyhow::bail!("decay.half_life_days must be > 0");
                }
            }
            "linear" => {
                if !(0.0..=1.0).contains(&self.decay.linear_per_day) {
                    anyhow::bail!("decay.linear_per_day must be in [0, 1]");
                }
            }
            other => anyhow::bail!(
                "Unknown decay curve: '{}'. Must be exponential or linear.",
                other
            ),
        }

        if !(0.0..=1.0).contains(&self.similarity.min_score) {
            anyhow::bail!("similarity.min_score must be in [0.0, 1.0]");
        }
        if self.similarity.limit == 0 || self.similarity.cache_top_n == 0 {
            anyhow::bail!("similarity.limit and similarity.cache_top_n must be >= 1");
        }

        if self.embedding.is_enabled() {
            if self.embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    self.embedding.provider
                );
            }
            if self.embedding.provider == "remote" && self.embedding.url.is_none() {
                anyhow::bail!("embedding.url must be specified for the remote provider");
            }
        }

        match self.embedding.provider.as_str() {
            "disabled" | "local" | "remote" => {}
            other => anyhow::bail!(
                "Unknown embedding provider: '{}'. Must be disabled, local, or remote.",
                other
            ),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            db: DbConfig {
                path: PathBuf::from("/tmp/rank.sqlite"),
            },
            matching: MatchingConfig::default(),
            confidence: ConfidenceConfig::default(),
            semantic: SemanticConfig::default(),
            boost: BoostConfig::default(),
            quality: QualityConfig::default(),
            decay: DecayConfig::default(),
            similarity: SimilarityConfig::default(),
            embedding: EmbeddingConfig::default(),
        }
    }

    #[test]
    fn test_defaults_validate() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_bad_field_weights_rejected() {
        let mut config = base_config();
        config.matching.name_weight = 0.9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_confidence_weights_rejected() {
        let mut config = base_config();
        config.confidence.match_weight = 0.9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_remote_provider_requires_url_and_model() {
        let mut config = base_config();
        config.embedding.provider = "remote".to_string();
        assert!(config.validate().is_err());
        config.embedding.model = Some("nomic-embed-text".to_string());
        assert!(config.validate().is_err());
        config.embedding.url = Some("http://localhost:11434".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_decay_curve_rejected() {
        let mut config = base_config();
        config.decay.curve = "stepwise".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let parsed: Config = toml::from_str("[db]\npath = \"/tmp/rank.sqlite\"\n").unwrap();
        assert!(parsed.validate().is_ok());
        assert_eq!(parsed.matching.relevance_floor, 10.0);
        assert_eq!(parsed.similarity.semantic_budget_ms, 800);
        assert_eq!(parsed.embedding.provider, "disabled");
    }
}
