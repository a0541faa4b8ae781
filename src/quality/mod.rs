//! Heuristic quality checks shared by both pipelines.
//!
//! Everything here works on a lowercase word-token view of text (`[A-Za-z0-9][A-Za-z0-9_-]*`),
//! which is independent of the `Tokenizer` used for length budgets.

pub mod fidelity;
pub mod generation;
pub mod guard;
pub mod report;

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

pub use fidelity::{
    build_verifier, CompositeFidelityVerifier, FidelityVerifier, NoOpVerifier, NumericFact,
    NumericFactChecker, TokenJaccardVerifier, VerifierKind, VerifierSettings,
};
pub use generation::{
    assess_section, EntityPresenceChecker, GenerationNumericFactChecker, OutlineCoverageChecker,
    RepetitionAndDriftChecker, SectionAssessment, SectionScoring,
};
pub use guard::{ConsistencyGuard, GuardDecision};
pub use report::QualityReport;

static WORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9][A-Za-z0-9_-]*").expect("word regex"));
static SENTENCE_SPLIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]+").expect("sentence regex"));

const WORD_TRIM: &[char] = &['.', ',', ';', ':', '!', '?', '(', ')', '[', ']', '{', '}', '"', '\''];

#[must_use]
pub fn tokenize(text: &str) -> HashSet<String> {
    WORD_RE
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Set Jaccard over `tokenize`. Two empty texts are identical; one empty text shares nothing.
#[must_use]
pub fn token_jaccard(left: &str, right: &str) -> f64 {
    let l = tokenize(left);
    let r = tokenize(right);
    jaccard(&l, &r)
}

pub(crate) fn jaccard(l: &HashSet<String>, r: &HashSet<String>) -> f64 {
    if l.is_empty() && r.is_empty() {
        return 1.0;
    }
    if l.is_empty() || r.is_empty() {
        return 0.0;
    }
    let inter = l.intersection(r).count();
    let union = l.union(r).count();
    inter as f64 / union as f64
}

/// True when `words` appear as a subsequence of the whitespace-separated words of `text`.
#[must_use]
pub fn words_in_order(words: &[&str], text: &str) -> bool {
    if words.is_empty() {
        return true;
    }
    let mut idx = 0;
    for raw in text.split_whitespace() {
        if raw.trim_matches(WORD_TRIM) == words[idx] {
            idx += 1;
            if idx >= words.len() {
                return true;
            }
        }
    }
    false
}

/// Verbatim containment, or enough distinct word overlap: 1 for single-word points, else 2.
#[must_use]
pub fn is_key_point_covered(key_point: &str, text: &str) -> bool {
    let point = key_point.trim().to_lowercase();
    if point.is_empty() || text.to_lowercase().contains(&point) {
        return true;
    }
    let point_tokens = tokenize(key_point);
    if point_tokens.is_empty() {
        return true;
    }
    let text_tokens = tokenize(text);
    let overlap = point_tokens.intersection(&text_tokens).count();
    overlap >= point_tokens.len().min(2)
}

#[must_use]
pub fn split_sentences(text: &str) -> Vec<&str> {
    SENTENCE_SPLIT_RE
        .split(text)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}
