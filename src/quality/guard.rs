use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{split_sentences, token_jaccard, tokenize};

/// Bounds a single global edit pass so it stays a light polish.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsistencyGuard {
    pub min_token_jaccard: f64,
    pub min_length_ratio: f64,
    pub max_length_ratio: f64,
    pub max_added_sentences: usize,
}

impl Default for ConsistencyGuard {
    fn default() -> Self {
        Self {
            min_token_jaccard: 0.75,
            min_length_ratio: 0.7,
            max_length_ratio: 1.3,
            max_added_sentences: 2,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GuardDecision {
    pub text: String,
    pub used_fallback: bool,
    pub reason: Option<String>,
}

impl GuardDecision {
    fn keep(text: &str) -> Self {
        Self {
            text: text.to_string(),
            used_fallback: false,
            reason: None,
        }
    }

    fn revert(original: &str, reason: String) -> Self {
        debug!(%reason, "consistency edit reverted");
        Self {
            text: original.to_string(),
            used_fallback: true,
            reason: Some(reason),
        }
    }
}

impl ConsistencyGuard {
    /// Keeps `candidate` or reverts to `original`. Both are compared trimmed.
    #[must_use]
    pub fn apply(&self, original: &str, candidate: &str) -> GuardDecision {
        let original = original.trim();
        let candidate = candidate.trim();
        if original.is_empty() {
            return GuardDecision::keep(candidate);
        }
        if candidate.is_empty() {
            return GuardDecision::revert(original, "edited text is empty".to_string());
        }

        let similarity = token_jaccard(original, candidate);
        if similarity < self.min_token_jaccard {
            return GuardDecision::revert(
                original,
                format!(
                    "token jaccard {similarity:.2} below {:.2}",
                    self.min_token_jaccard
                ),
            );
        }

        let original_tokens = tokenize(original).len().max(1);
        let ratio = tokenize(candidate).len() as f64 / original_tokens as f64;
        if ratio < self.min_length_ratio || ratio > self.max_length_ratio {
            return GuardDecision::revert(
                original,
                format!(
                    "length ratio {ratio:.2} outside [{:.2}, {:.2}]",
                    self.min_length_ratio, self.max_length_ratio
                ),
            );
        }

        let before = split_sentences(original).len();
        let after = split_sentences(candidate).len();
        if after.saturating_sub(before) > self.max_added_sentences {
            return GuardDecision::revert(
                original,
                format!(
                    "{} sentences added, at most {} allowed",
                    after - before,
                    self.max_added_sentences
                ),
            );
        }

        GuardDecision::keep(candidate)
    }
}
