//! Tokenizer and weighted-field keyword matcher.
//!
//! Pure, synchronous scoring over five artifact fields. This is the
//! baseline every query falls back to when semantic scoring is
//! unavailable, so it has no I/O and no failure modes.

use anyhow::{bail, Result};

use crate::models::ArtifactView;

const EXACT_POINTS: f64 = 130.0;
const PARTIAL_POINTS: f64 = 50.0;
const PHRASE_BONUS: f64 = 60.0;
const TAG_EXACT_BONUS: f64 = 80.0;
/// Repeated exact matches of the same token stop counting here.
const MAX_EXACT_OCCURRENCES: usize = 3;

/// Lowercase, split on non-alphanumeric boundaries while preserving
/// internal hyphens, and de-duplicate preserving first-seen order.
pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut seen = std::collections::HashSet::new();
    let mut tokens = Vec::new();

    for raw in lower.split(|c: char| !(c.is_alphanumeric() || c == '-')) {
        let token = raw.trim_matches('-');
        if token.is_empty() {
            continue;
        }
        if seen.insert(token.to_string()) {
            tokens.push(token.to_string());
        }
    }

    tokens
}

/// Relative weight of each scored field. Must sum to 1.0 ± 0.01.
#[derive(Debug, Clone, Copy)]
pub struct FieldWeights {
    pub name: f64,
    pub title: f64,
    pub tags: f64,
    pub description: f64,
    pub aliases: f64,
}

impl FieldWeights {
    pub fn new(name: f64, title: f64, tags: f64, description: f64, aliases: f64) -> Result<Self> {
        let sum = name + title + tags + description + aliases;
        if (sum - 1.0).abs() > 0.01 {
            bail!("field weights must sum to 1.0 (got {:.4})", sum);
        }
        Ok(Self {
            name,
            title,
            tags,
            description,
            aliases,
        })
    }
}

impl Default for FieldWeights {
    fn default() -> Self {
        Self {
            name: 0.30,
            title: 0.25,
            tags: 0.20,
            description: 0.15,
            aliases: 0.10,
        }
    }
}

/// Keyword scorer over weighted artifact fields.
pub struct FieldMatcher {
    weights: FieldWeights,
    relevance_floor: f64,
}

impl FieldMatcher {
    pub fn new(weights: FieldWeights, relevance_floor: f64) -> Self {
        Self {
            weights,
            relevance_floor,
        }
    }

    /// Score a query against one artifact, in `[0, 100]`.
    /// An empty query scores 0 for every artifact.
    pub fn score(&self, query: &str, artifact: &ArtifactView) -> f64 {
        let query_tokens = tokenize(query);
        if query_tokens.is_empty() {
            return 0.0;
        }

        let name_tokens = tokenize(&artifact.name);
        let title_tokens = tokenize(artifact.title.as_deref().unwrap_or(""));
        let description_tokens = tokenize(artifact.description.as_deref().unwrap_or(""));
        let tag_tokens: Vec<String> = artifact
            .tags
            .iter()
            .flat_map(|t| tokenize(t))
            .collect();
        let alias_tokens: Vec<String> = artifact
            .aliases()
            .iter()
            .flat_map(|a| tokenize(a))
            .collect();

        let weighted = self.weights.name * field_score(&query_tokens, &name_tokens, false)
            + self.weights.title * field_score(&query_tokens, &title_tokens, false)
            + self.weights.tags * field_score(&query_tokens, &tag_tokens, true)
            + self.weights.description * field_score(&query_tokens, &description_tokens, false)
            + self.weights.aliases * field_score(&query_tokens, &alias_tokens, true);

        weighted.clamp(0.0, 100.0)
    }

    /// Score every artifact, sort descending, and drop entries below the
    /// relevance floor.
    pub fn score_all<'a>(
        &self,
        query: &str,
        artifacts: &'a [ArtifactView],
    ) -> Vec<(&'a ArtifactView, f64)> {
        let mut scored: Vec<(&ArtifactView, f64)> = artifacts
            .iter()
            .map(|a| (a, self.score(query, a)))
            .filter(|(_, score)| *score >= self.relevance_floor)
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.id.cmp(&b.0.id))
        });
        scored
    }
}

/// Raw per-field sub-score before weighting.
fn field_score(query_tokens: &[String], field_tokens: &[String], is_tag_field: bool) -> f64 {
    if field_tokens.is_empty() {
        return 0.0;
    }

    let mut raw = 0.0;
    for query_token in query_tokens {
        let exact = field_tokens
            .iter()
            .filter(|t| *t == query_token)
            .count()
            .min(MAX_EXACT_OCCURRENCES);
        raw += exact as f64 * EXACT_POINTS;

        let partial = field_tokens
            .iter()
            .filter(|t| {
                *t != query_token && (t.contains(query_token.as_str()) || query_token.contains(t.as_str()))
            })
            .count();
        raw += partial as f64 * PARTIAL_POINTS;
    }

    if phrase_in_order(query_tokens, field_tokens) {
        raw += PHRASE_BONUS;
    }

    if is_tag_field
        && query_tokens
            .iter()
            .any(|q| field_tokens.iter().any(|t| t == q))
    {
        raw += TAG_EXACT_BONUS;
    }

    raw
}

/// Gap-tolerant phrase match: every query token appears in the field
/// (exactly or as a substring) at strictly increasing positions.
fn phrase_in_order(query_tokens: &[String], field_tokens: &[String]) -> bool {
    let mut position = 0;
    for query_token in query_tokens {
        match field_tokens[position..]
            .iter()
            .position(|t| t == query_token || t.contains(query_token.as_str()))
        {
            Some(offset) => position += offset + 1,
            None => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn artifact(
        name: &str,
        title: Option<&str>,
        description: Option<&str>,
        tags: &[&str],
    ) -> ArtifactView {
        ArtifactView::new(
            name,
            name,
            "skill",
            title.map(String::from),
            description.map(String::from),
            tags.iter().map(|t| t.to_string()).collect(),
            HashMap::new(),
        )
    }

    fn matcher() -> FieldMatcher {
        FieldMatcher::new(FieldWeights::default(), 10.0)
    }

    #[test]
    fn test_tokenize_preserves_internal_hyphens() {
        assert_eq!(tokenize("PDF-Skill v2!"), vec!["pdf-skill", "v2"]);
        assert_eq!(tokenize("--edge--case--"), vec!["edge--case"]);
    }

    #[test]
    fn test_tokenize_dedupes_in_order() {
        assert_eq!(tokenize("pdf tool pdf Tool"), vec!["pdf", "tool"]);
    }

    #[test]
    fn test_tokenize_empty_and_punctuation() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("... !! ??").is_empty());
    }

    #[test]
    fn test_field_weights_validation() {
        assert!(FieldWeights::new(0.30, 0.25, 0.20, 0.15, 0.10).is_ok());
        assert!(FieldWeights::new(0.5, 0.25, 0.20, 0.15, 0.10).is_err());
        assert!(FieldWeights::new(0.0, 0.0, 0.0, 0.0, 0.0).is_err());
    }

    #[test]
    fn test_pdf_query_scores_high() {
        let a = artifact(
            "pdf-skill",
            Some("PDF Skill"),
            Some("Extract text and tables from PDF files"),
            &["pdf", "documents"],
        );
        let score = matcher().score("pdf", &a);
        assert!(score > 80.0, "expected > 80, got {}", score);
    }

    #[test]
    fn test_unrelated_query_scores_low() {
        let a = artifact(
            "image-processor",
            Some("Image Processor"),
            Some("Resize and convert images"),
            &["images", "graphics"],
        );
        let score = matcher().score("pdf", &a);
        assert!(score < 30.0, "expected < 30, got {}", score);
    }

    #[test]
    fn test_empty_query_scores_zero() {
        let a = artifact("pdf-skill", Some("PDF Skill"), None, &["pdf"]);
        assert_eq!(matcher().score("", &a), 0.0);
        assert_eq!(matcher().score("  !! ", &a), 0.0);
    }

    #[test]
    fn test_score_in_range() {
        let a = artifact(
            "pdf pdf pdf",
            Some("pdf pdf pdf pdf"),
            Some("pdf pdf pdf pdf pdf"),
            &["pdf"],
        );
        let score = matcher().score("pdf", &a);
        assert!((0.0..=100.0).contains(&score));
    }

    #[test]
    fn test_phrase_bonus_requires_order() {
        let q = tokenize("convert pdf");
        assert!(phrase_in_order(&q, &tokenize("convert any pdf file")));
        assert!(!phrase_in_order(&q, &tokenize("pdf files to convert")));
    }

    #[test]
    fn test_score_all_sorted_and_floored() {
        let artifacts = vec![
            artifact("image-processor", Some("Image Processor"), None, &["images"]),
            artifact("pdf-skill", Some("PDF Skill"), None, &["pdf", "documents"]),
            artifact("pdf-viewer", Some("Viewer"), None, &["pdf"]),
        ];
        let ranked = matcher().score_all("pdf", &artifacts);

        assert!(ranked.len() >= 2);
        // Descending order.
        for pair in ranked.windows(2) {
            assert!(pair[0].1 >= pair[1].1);
        }
        // The unrelated artifact is dropped by the floor.
        assert!(ranked.iter().all(|(a, _)| a.name != "image-processor"));
    }

    #[test]
    fn test_alias_field_contributes() {
        let mut extra = HashMap::new();
        extra.insert("aliases".to_string(), "acrobat, pdf-tool".to_string());
        let with_alias = ArtifactView::new(
            "doc-helper",
            "doc-helper",
            "skill",
            None,
            None,
            vec![],
            extra,
        );
        let without_alias = artifact("doc-helper", None, None, &[]);

        let matcher = matcher();
        assert!(matcher.score("acrobat", &with_alias) > matcher.score("acrobat", &without_alias));
    }
}
