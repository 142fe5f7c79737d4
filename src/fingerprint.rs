//! Pairwise fingerprint comparison.
//!
//! Produces the per-component [`ScoreBreakdown`] consumed by the composite
//! similarity weighting. Everything here is pure and symmetric: comparing
//! `(a, b)` and `(b, a)` yields the same breakdown. The semantic component
//! is never filled in at this layer.

use std::collections::HashSet;

use crate::keyword::tokenize;
use crate::models::{Fingerprint, ScoreBreakdown};

/// Partial credit factor for size-only content agreement.
const SIZE_RATIO_CREDIT: f64 = 0.3;

const METADATA_TAGS_WEIGHT: f64 = 0.30;
const METADATA_KIND_WEIGHT: f64 = 0.15;
const METADATA_NAME_WEIGHT: f64 = 0.25;
const METADATA_DESCRIPTION_WEIGHT: f64 = 0.25;
const METADATA_LENGTH_WEIGHT: f64 = 0.05;

pub struct FingerprintComparator;

impl FingerprintComparator {
    pub fn new() -> Self {
        Self
    }

    /// Compare two fingerprints component by component, each in `[0, 1]`.
    pub fn compare(&self, a: &Fingerprint, b: &Fingerprint) -> ScoreBreakdown {
        ScoreBreakdown {
            keyword: keyword_score(a, b),
            content: content_score(a, b),
            structure: structure_score(a, b),
            metadata: metadata_score(a, b),
            semantic: None,
        }
    }
}

impl Default for FingerprintComparator {
    fn default() -> Self {
        Self::new()
    }
}

/// Token overlap across name, title, and tags.
fn keyword_score(a: &Fingerprint, b: &Fingerprint) -> f64 {
    jaccard(&keyword_tokens(a), &keyword_tokens(b))
}

fn keyword_tokens(fp: &Fingerprint) -> HashSet<String> {
    let mut tokens: HashSet<String> = tokenize(&fp.name).into_iter().collect();
    if let Some(title) = &fp.title {
        tokens.extend(tokenize(title));
    }
    for tag in &fp.tags {
        tokens.extend(tokenize(tag));
    }
    tokens
}

/// Identical content hashes are a certain match; differing hashes earn at
/// most partial credit proportional to how close the total sizes are.
fn content_score(a: &Fingerprint, b: &Fingerprint) -> f64 {
    if !a.content_hash.is_empty() && a.content_hash == b.content_hash {
        return 1.0;
    }
    if a.total_size == 0 || b.total_size == 0 {
        return 0.0;
    }
    size_ratio(a.total_size, b.total_size) * SIZE_RATIO_CREDIT
}

fn structure_score(a: &Fingerprint, b: &Fingerprint) -> f64 {
    if !a.structure_hash.is_empty() && a.structure_hash == b.structure_hash {
        1.0
    } else {
        0.0
    }
}

/// Weighted blend of tag overlap, kind equality, name similarity,
/// description overlap, and description length ratio.
fn metadata_score(a: &Fingerprint, b: &Fingerprint) -> f64 {
    if !a.metadata_hash.is_empty() && a.metadata_hash == b.metadata_hash {
        return 1.0;
    }

    let tag_overlap = jaccard(
        &a.tags.iter().map(|t| t.to_lowercase()).collect(),
        &b.tags.iter().map(|t| t.to_lowercase()).collect(),
    );
    let kind_match = if a.kind == b.kind { 1.0 } else { 0.0 };
    let name_similarity = bigram_dice(&display_name(a), &display_name(b));

    let desc_a = a.description.as_deref().unwrap_or("");
    let desc_b = b.description.as_deref().unwrap_or("");
    let description_overlap = jaccard(
        &tokenize(desc_a).into_iter().collect(),
        &tokenize(desc_b).into_iter().collect(),
    );
    // Two missing descriptions agree on length but say nothing about
    // content, so only the length component credits that case.
    let length_ratio = if desc_a.is_empty() && desc_b.is_empty() {
        1.0
    } else {
        size_ratio(desc_a.chars().count() as u64, desc_b.chars().count() as u64)
    };

    (METADATA_TAGS_WEIGHT * tag_overlap
        + METADATA_KIND_WEIGHT * kind_match
        + METADATA_NAME_WEIGHT * name_similarity
        + METADATA_DESCRIPTION_WEIGHT * description_overlap
        + METADATA_LENGTH_WEIGHT * length_ratio)
        .clamp(0.0, 1.0)
}

fn display_name(fp: &Fingerprint) -> String {
    match &fp.title {
        Some(title) => format!("{} {}", fp.name, title).to_lowercase(),
        None => fp.name.to_lowercase(),
    }
}

/// Set overlap in `[0, 1]`; two empty sets share nothing, not everything.
fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    intersection / union
}

/// Dice coefficient over character bigrams, tolerant of small renames
/// like `pdf-skill` vs `pdf-skills`.
fn bigram_dice(a: &str, b: &str) -> f64 {
    let bigrams_a = char_bigrams(a);
    let bigrams_b = char_bigrams(b);
    if bigrams_a.is_empty() && bigrams_b.is_empty() {
        return if a == b { 1.0 } else { 0.0 };
    }
    if bigrams_a.is_empty() || bigrams_b.is_empty() {
        return 0.0;
    }
    let shared = bigrams_a.intersection(&bigrams_b).count() as f64;
    2.0 * shared / (bigrams_a.len() + bigrams_b.len()) as f64
}

fn char_bigrams(text: &str) -> HashSet<(char, char)> {
    let chars: Vec<char> = text.chars().collect();
    chars.windows(2).map(|w| (w[0], w[1])).collect()
}

/// `min / max` of two magnitudes, 0 when exactly one is zero, 1 when both
/// are zero.
fn size_ratio(a: u64, b: u64) -> f64 {
    if a == 0 && b == 0 {
        return 1.0;
    }
    if a == 0 || b == 0 {
        return 0.0;
    }
    a.min(b) as f64 / a.max(b) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ArtifactRecord;
    use std::collections::HashMap;

    fn record(
        id: &str,
        name: &str,
        description: Option<&str>,
        tags: &[&str],
        content_hash: &str,
        structure_hash: &str,
        total_size: u64,
    ) -> ArtifactRecord {
        ArtifactRecord {
            id: id.to_string(),
            name: name.to_string(),
            kind: "skill".to_string(),
            title: None,
            description: description.map(String::from),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            extra: HashMap::new(),
            content_hash: content_hash.to_string(),
            structure_hash: structure_hash.to_string(),
            total_size,
            file_count: 3,
            source: "collection".to_string(),
        }
    }

    fn fp(record: &ArtifactRecord) -> Fingerprint {
        Fingerprint::from_record(record)
    }

    #[test]
    fn test_identical_records_max_out() {
        let r = record(
            "a",
            "pdf-skill",
            Some("Extract text from pdf files"),
            &["pdf", "documents"],
            "hash-c",
            "hash-s",
            4096,
        );
        let breakdown = FingerprintComparator::new().compare(&fp(&r), &fp(&r));
        assert_eq!(breakdown.keyword, 1.0);
        assert_eq!(breakdown.content, 1.0);
        assert_eq!(breakdown.structure, 1.0);
        assert_eq!(breakdown.metadata, 1.0);
        assert_eq!(breakdown.semantic, None);
    }

    #[test]
    fn test_symmetry() {
        let a = record("a", "pdf-skill", Some("pdf text"), &["pdf"], "c1", "s1", 4096);
        let b = record("b", "pdf-tools", Some("pdf tables"), &["pdf", "tables"], "c2", "s2", 2048);
        let comparator = FingerprintComparator::new();
        let ab = comparator.compare(&fp(&a), &fp(&b));
        let ba = comparator.compare(&fp(&b), &fp(&a));
        assert_eq!(ab, ba);
    }

    #[test]
    fn test_shared_content_hash_is_certain() {
        let a = record("a", "pdf-skill", None, &[], "same", "s1", 4096);
        let b = record("b", "renamed-pdf", None, &[], "same", "s2", 4096);
        let breakdown = FingerprintComparator::new().compare(&fp(&a), &fp(&b));
        assert_eq!(breakdown.content, 1.0);
    }

    #[test]
    fn test_differing_content_earns_partial_size_credit_only() {
        let a = record("a", "x", None, &[], "c1", "s1", 1000);
        let b = record("b", "y", None, &[], "c2", "s2", 900);
        let breakdown = FingerprintComparator::new().compare(&fp(&a), &fp(&b));
        assert!(breakdown.content <= SIZE_RATIO_CREDIT);
        assert!((breakdown.content - 0.9 * SIZE_RATIO_CREDIT).abs() < 1e-9);

        let zero = record("c", "z", None, &[], "c3", "s3", 0);
        let breakdown = FingerprintComparator::new().compare(&fp(&a), &fp(&zero));
        assert_eq!(breakdown.content, 0.0);
    }

    #[test]
    fn test_near_duplicate_metadata_scores_high() {
        let a = record(
            "a",
            "pdf-skill",
            Some("Extract text and tables from pdf files"),
            &["pdf", "documents"],
            "c1",
            "s1",
            4096,
        );
        let b = record(
            "b",
            "pdf-skills",
            Some("Extract text and tables from pdf documents"),
            &["pdf", "documents"],
            "c2",
            "s2",
            4100,
        );
        let breakdown = FingerprintComparator::new().compare(&fp(&a), &fp(&b));
        assert!(breakdown.metadata > 0.7, "got {}", breakdown.metadata);
        assert!(breakdown.keyword > 0.5);
    }

    #[test]
    fn test_unrelated_artifacts_score_low() {
        let a = record(
            "a",
            "pdf-skill",
            Some("Extract text from pdf files"),
            &["pdf"],
            "c1",
            "s1",
            4096,
        );
        let b = record(
            "b",
            "image-processor",
            Some("Resize and convert images"),
            &["images", "graphics"],
            "c2",
            "s2",
            90000,
        );
        let breakdown = FingerprintComparator::new().compare(&fp(&a), &fp(&b));
        assert_eq!(breakdown.keyword, 0.0);
        assert!(breakdown.metadata < 0.3, "got {}", breakdown.metadata);
        assert_eq!(breakdown.structure, 0.0);
    }

    #[test]
    fn test_missing_descriptions_credit_length_only() {
        let a = record("a", "alpha", None, &[], "c1", "s1", 10);
        let b = record("b", "omega", None, &[], "c2", "s2", 10);
        let breakdown = FingerprintComparator::new().compare(&fp(&a), &fp(&b));
        // Only kind (0.15) and length ratio (0.05) can contribute here.
        assert!(breakdown.metadata <= METADATA_KIND_WEIGHT + METADATA_LENGTH_WEIGHT + 1e-9);
        assert!(breakdown.metadata >= METADATA_LENGTH_WEIGHT);
    }

    #[test]
    fn test_bigram_dice_tolerates_small_rename() {
        assert!(bigram_dice("pdf-skill", "pdf-skills") > 0.9);
        assert!(bigram_dice("pdf-skill", "image-processor") < 0.3);
        assert_eq!(bigram_dice("", ""), 1.0);
        assert_eq!(bigram_dice("a", "a"), 1.0);
        assert_eq!(bigram_dice("a", "bc"), 0.0);
    }

    #[test]
    fn test_jaccard_empty_sets_share_nothing() {
        assert_eq!(jaccard(&HashSet::new(), &HashSet::new()), 0.0);
    }
}
