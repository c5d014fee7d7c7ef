//! Stateless similarity helpers: Dice coefficient over bigram sets,
//! containment-aware text similarity, keyword-token overlap, and the
//! near-duplicate decision combining them.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use super::normalize::NormalizedFinding;

/// Dice similarity at or above this counts as a match.
pub const SIMILARITY_THRESHOLD: f64 = 0.80;

/// Minimum character length for the containment shortcut.
const CONTAINMENT_MIN_LEN: usize = 8;

/// Latin identifiers, or runs of two and more Han/Hiragana/Katakana
/// characters.
static KEYWORD_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[a-z0-9_]+|[\p{Han}\p{Hiragana}\p{Katakana}]{2,}").unwrap()
});

/// `2·|A∩B| / (|A|+|B|)`; zero when both sets are empty.
pub fn dice_coefficient(a: &HashSet<u32>, b: &HashSet<u32>) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 0.0;
    }
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let intersection = small.iter().filter(|item| large.contains(item)).count();
    (2.0 * intersection as f64) / total as f64
}

/// Text similarity with shortcuts: equality, containment of a long-enough
/// string, then the Dice threshold. Empty strings never match.
pub fn is_similar_text(a: &str, b: &str, a_bigrams: &HashSet<u32>, b_bigrams: &HashSet<u32>) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    if a == b {
        return true;
    }
    let a_long = a.chars().count() >= CONTAINMENT_MIN_LEN;
    let b_long = b.chars().count() >= CONTAINMENT_MIN_LEN;
    if (a_long && b.contains(a)) || (b_long && a.contains(b)) {
        return true;
    }
    dice_coefficient(a_bigrams, b_bigrams) >= SIMILARITY_THRESHOLD
}

/// Keyword tokens of normalized text, two characters and longer.
pub fn keyword_tokens(normalized: &str) -> HashSet<&str> {
    KEYWORD_TOKEN_RE
        .find_iter(normalized)
        .map(|m| m.as_str())
        .filter(|token| token.chars().count() >= 2)
        .collect()
}

fn share_keyword_token(a: &str, b: &str) -> bool {
    let tokens_a = keyword_tokens(a);
    if tokens_a.is_empty() {
        return false;
    }
    keyword_tokens(b)
        .iter()
        .any(|token| tokens_a.contains(token))
}

/// Whether `candidate` and `incoming` describe the same finding.
///
/// Differing non-empty priorities never match. When both carry a location,
/// the locations must agree strongly and at least one of summary, title, or
/// keyword overlap must corroborate. Without locations, both the summaries
/// and the titles must clear the Dice threshold.
pub fn is_near_duplicate(candidate: &NormalizedFinding, incoming: &NormalizedFinding) -> bool {
    if !candidate.priority.is_empty()
        && !incoming.priority.is_empty()
        && candidate.priority != incoming.priority
    {
        return false;
    }

    if !candidate.location.is_empty() && !incoming.location.is_empty() {
        if dice_coefficient(&candidate.location_bigrams, &incoming.location_bigrams)
            < SIMILARITY_THRESHOLD
        {
            return false;
        }
        return is_similar_text(
            &candidate.summary,
            &incoming.summary,
            &candidate.summary_bigrams,
            &incoming.summary_bigrams,
        ) || is_similar_text(
            &candidate.title,
            &incoming.title,
            &candidate.title_bigrams,
            &incoming.title_bigrams,
        ) || share_keyword_token(&candidate.title, &incoming.title);
    }

    dice_coefficient(&candidate.summary_bigrams, &incoming.summary_bigrams)
        >= SIMILARITY_THRESHOLD
        && dice_coefficient(&candidate.title_bigrams, &incoming.title_bigrams)
            >= SIMILARITY_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::normalize::bigram_set;
    use proptest::prelude::*;

    #[test]
    fn test_dice_identical_sets() {
        let a = bigram_set("null dereference");
        assert_eq!(dice_coefficient(&a, &a), 1.0);
    }

    #[test]
    fn test_dice_disjoint_sets() {
        let a = bigram_set("abcdef");
        let b = bigram_set("uvwxyz");
        assert_eq!(dice_coefficient(&a, &b), 0.0);
    }

    #[test]
    fn test_dice_empty_sets() {
        let empty = HashSet::new();
        assert_eq!(dice_coefficient(&empty, &empty), 0.0);
        assert_eq!(dice_coefficient(&empty, &bigram_set("ab")), 0.0);
    }

    #[test]
    fn test_similar_text_containment() {
        let a = "null dereference";
        let b = "possible null dereference in parser";
        assert!(is_similar_text(a, b, &bigram_set(a), &bigram_set(b)));
    }

    #[test]
    fn test_similar_text_rejects_empty() {
        assert!(!is_similar_text("", "x", &HashSet::new(), &bigram_set("x")));
    }

    #[test]
    fn test_short_strings_do_not_use_containment() {
        // "ab" is contained in the other but too short for the shortcut,
        // and the bigram overlap is below threshold.
        let a = "ab";
        let b = "ab plus entirely different text";
        assert!(!is_similar_text(a, b, &bigram_set(a), &bigram_set(b)));
    }

    #[test]
    fn test_keyword_tokens() {
        let tokens = keyword_tokens("null_deref at parser 42 の検出");
        assert!(tokens.contains("null_deref"));
        assert!(tokens.contains("parser"));
        assert!(tokens.contains("42"));
        assert!(tokens.contains("検出"));
        // Single-character tokens are dropped
        assert!(!tokens.contains("の"));
    }

    #[test]
    fn test_near_duplicate_priority_conflict() {
        let a = NormalizedFinding::new("Issue", "| **Priority** | High |");
        let b = NormalizedFinding::new("Issue", "| **Priority** | Low |");
        assert!(!is_near_duplicate(&a, &b));
    }

    #[test]
    fn test_near_duplicate_same_location_title_overlap() {
        let a = NormalizedFinding::new(
            "Null dereference in parser",
            "| **Priority** | High |\n| **該当箇所** | src/parse.go:42 |",
        );
        let b = NormalizedFinding::new(
            "Null dereference on parser input",
            "| **Priority** | High |\n| **該当箇所** | src/parse.go:42 |",
        );
        assert!(is_near_duplicate(&a, &b));
    }

    #[test]
    fn test_near_duplicate_different_locations() {
        let a = NormalizedFinding::new(
            "Null dereference",
            "| **該当箇所** | src/parse.go:42 |\n| **指摘の概要** | Null deref |",
        );
        let b = NormalizedFinding::new(
            "Null dereference",
            "| **該当箇所** | cmd/main.go:7 |\n| **指摘の概要** | Null deref |",
        );
        assert!(!is_near_duplicate(&a, &b));
    }

    #[test]
    fn test_near_duplicate_without_locations_needs_both_fields() {
        let a = NormalizedFinding::new(
            "Unchecked error return",
            "| **指摘の概要** | Error from read is ignored |",
        );
        let b = NormalizedFinding::new(
            "Unchecked error return",
            "| **指摘の概要** | Error from read is ignored |",
        );
        assert!(is_near_duplicate(&a, &b));

        let c = NormalizedFinding::new(
            "Completely different topic",
            "| **指摘の概要** | Error from read is ignored |",
        );
        assert!(!is_near_duplicate(&a, &c));
    }

    proptest! {
        #[test]
        fn prop_dice_symmetric_and_bounded(a in ".{0,40}", b in ".{0,40}") {
            let sa = bigram_set(&a);
            let sb = bigram_set(&b);
            let forward = dice_coefficient(&sa, &sb);
            let backward = dice_coefficient(&sb, &sa);
            prop_assert!((forward - backward).abs() < f64::EPSILON);
            prop_assert!((0.0..=1.0).contains(&forward));
        }

        #[test]
        fn prop_dice_self_is_one_for_nonempty(a in ".{1,40}") {
            let sa = bigram_set(&a);
            if !sa.is_empty() {
                prop_assert_eq!(dice_coefficient(&sa, &sa), 1.0);
            }
        }
    }
}
