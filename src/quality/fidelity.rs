use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::tokenizer::{Tokenizer, WhitespaceTokenizer};

static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(?:19|20)\d{2}\b").expect("year regex"));
static PERCENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d+(?:\.\d+)?\s*%").expect("percent regex"));
static WORD_PERCENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b\d+(?:\.\d+)?\s*(?:percent|percentage|pct)\b").expect("word percent regex")
});
static QUANTITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b\d+(?:,\d{3})*(?:\.\d+)?\s*(?:million|billion|trillion|thousand|M|B|T|K)\b")
        .expect("quantity regex")
});
static VERSION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bv\d+(?:\.\d+){1,2}\b|\b\d+\.\d+\.\d+\b").expect("version regex")
});

/// Suffix multipliers; a suffix must match one entry exactly.
const MULTIPLIERS: &[(&str, f64)] = &[
    ("thousand", 1e3),
    ("trillion", 1e12),
    ("million", 1e6),
    ("billion", 1e9),
    ("k", 1e3),
    ("m", 1e6),
    ("b", 1e9),
    ("t", 1e12),
];

/// Scores how faithfully a rewritten chunk keeps the content of its source chunk.
pub trait FidelityVerifier {
    /// 0.0 (unrelated) to 1.0 (faithful).
    fn score(&self, source: &str, rewritten: &str) -> f64;
    fn issues(&self, source: &str, rewritten: &str) -> Vec<String>;
}

impl<V: FidelityVerifier + ?Sized> FidelityVerifier for Box<V> {
    fn score(&self, source: &str, rewritten: &str) -> f64 {
        (**self).score(source, rewritten)
    }

    fn issues(&self, source: &str, rewritten: &str) -> Vec<String> {
        (**self).issues(source, rewritten)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpVerifier;

impl FidelityVerifier for NoOpVerifier {
    fn score(&self, _source: &str, _rewritten: &str) -> f64 {
        1.0
    }

    fn issues(&self, _source: &str, _rewritten: &str) -> Vec<String> {
        Vec::new()
    }
}

#[derive(Clone, Debug, Default)]
pub struct TokenJaccardVerifier<T: Tokenizer = WhitespaceTokenizer> {
    tokenizer: T,
}

impl<T: Tokenizer> TokenJaccardVerifier<T> {
    pub fn new(tokenizer: T) -> Self {
        Self { tokenizer }
    }
}

impl<T: Tokenizer> FidelityVerifier for TokenJaccardVerifier<T> {
    fn score(&self, source: &str, rewritten: &str) -> f64 {
        let s = self.tokenizer.encode(source).into_iter().collect();
        let r = self.tokenizer.encode(rewritten).into_iter().collect();
        super::jaccard(&s, &r)
    }

    fn issues(&self, _source: &str, _rewritten: &str) -> Vec<String> {
        Vec::new()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FactKind {
    Year,
    Percentage,
    Quantity,
    Version,
}

impl FactKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Year => "Year",
            Self::Percentage => "Percentage",
            Self::Quantity => "Quantity",
            Self::Version => "Version",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct NumericFact {
    pub kind: FactKind,
    pub value: String,
    /// Surrounding text, `context_window` characters on each side.
    pub context: String,
}

/// Flags years, percentages, scaled quantities and version numbers that vanish in a rewrite.
#[derive(Clone, Debug)]
pub struct NumericFactChecker {
    context_window: usize,
    penalty: f64,
    tolerance: f64,
}

impl Default for NumericFactChecker {
    fn default() -> Self {
        Self {
            context_window: 30,
            penalty: 0.0,
            tolerance: 0.05,
        }
    }
}

impl NumericFactChecker {
    #[must_use]
    pub fn new(context_window: usize, penalty: f64, tolerance: f64) -> Self {
        Self {
            context_window,
            penalty,
            tolerance,
        }
    }

    /// Facts of `source` with no equivalent in `target`, grouped by kind.
    #[must_use]
    pub fn find_missing(&self, source: &str, target: &str) -> Vec<NumericFact> {
        let source_facts = self.extract_facts(source);
        let target_facts = self.extract_facts(target);
        let mut missing = Vec::new();
        for kind in [
            FactKind::Year,
            FactKind::Percentage,
            FactKind::Quantity,
            FactKind::Version,
        ] {
            for fact in source_facts.iter().filter(|f| f.kind == kind) {
                let found = target_facts
                    .iter()
                    .filter(|t| t.kind == kind)
                    .any(|t| self.matches(fact, t));
                if !found {
                    missing.push(fact.clone());
                }
            }
        }
        missing
    }

    fn matches(&self, fact: &NumericFact, candidate: &NumericFact) -> bool {
        if fact.kind == FactKind::Quantity {
            return self.values_similar(&fact.value, &candidate.value);
        }
        normalize_value(&fact.value) == normalize_value(&candidate.value)
    }

    fn values_similar(&self, left: &str, right: &str) -> bool {
        match (extract_number(left), extract_number(right)) {
            (Some(l), Some(r)) if r > 0.0 => (l - r).abs() / r < self.tolerance,
            (Some(l), Some(r)) => l == r,
            _ => normalize_value(left) == normalize_value(right),
        }
    }

    fn extract_facts(&self, text: &str) -> Vec<NumericFact> {
        let mut facts: Vec<NumericFact> = Vec::new();
        let mut push = |kind: FactKind, value: String, start: usize, end: usize| {
            if facts.iter().any(|f| f.kind == kind && f.value == value) {
                return;
            }
            let context = context_around(text, start, end, self.context_window);
            facts.push(NumericFact {
                kind,
                value,
                context,
            });
        };

        for m in YEAR_RE.find_iter(text) {
            push(FactKind::Year, m.as_str().to_string(), m.start(), m.end());
        }
        for m in PERCENT_RE.find_iter(text) {
            let value = m.as_str().to_lowercase().replace(' ', "");
            push(FactKind::Percentage, value, m.start(), m.end());
        }
        for m in WORD_PERCENT_RE.find_iter(text) {
            let value = m
                .as_str()
                .to_lowercase()
                .replace("percentage", "%")
                .replace("percent", "%")
                .replace("pct", "%")
                .replace(' ', "");
            push(FactKind::Percentage, value, m.start(), m.end());
        }
        for m in QUANTITY_RE.find_iter(text) {
            push(FactKind::Quantity, m.as_str().to_lowercase(), m.start(), m.end());
        }
        for m in VERSION_RE.find_iter(text) {
            push(FactKind::Version, m.as_str().to_string(), m.start(), m.end());
        }
        facts
    }
}

impl FidelityVerifier for NumericFactChecker {
    fn score(&self, source: &str, rewritten: &str) -> f64 {
        if self.penalty <= 0.0 {
            return 1.0;
        }
        let missing = self.find_missing(source, rewritten).len();
        (1.0 - missing as f64 * self.penalty).max(0.0)
    }

    fn issues(&self, source: &str, rewritten: &str) -> Vec<String> {
        self.find_missing(source, rewritten)
            .into_iter()
            .map(|f| format!("{} {} missing", f.kind.label(), f.value))
            .collect()
    }
}

/// Weighted average of several verifiers; issues are the union in verifier order.
#[derive(Default)]
pub struct CompositeFidelityVerifier {
    parts: Vec<(Box<dyn FidelityVerifier>, f64)>,
}

impl CompositeFidelityVerifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, verifier: impl FidelityVerifier + 'static, weight: f64) -> Self {
        self.parts.push((Box::new(verifier), weight));
        self
    }
}

impl FidelityVerifier for CompositeFidelityVerifier {
    fn score(&self, source: &str, rewritten: &str) -> f64 {
        let mut total = 0.0;
        let mut weight_sum = 0.0;
        for (v, w) in &self.parts {
            total += v.score(source, rewritten) * w;
            weight_sum += w;
        }
        if weight_sum == 0.0 {
            return 1.0;
        }
        total / weight_sum
    }

    fn issues(&self, source: &str, rewritten: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for (v, _) in &self.parts {
            for issue in v.issues(source, rewritten) {
                if !out.contains(&issue) {
                    out.push(issue);
                }
            }
        }
        out
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifierKind {
    #[default]
    None,
    Jaccard,
    Numeric,
    Composite,
}

impl VerifierKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "noop" => Some(Self::None),
            "jaccard" => Some(Self::Jaccard),
            "numeric" => Some(Self::Numeric),
            "composite" => Some(Self::Composite),
            _ => None,
        }
    }
}

/// `[rephrase.verifier]` table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierSettings {
    pub kind: VerifierKind,
    pub jaccard_weight: f64,
    pub numeric_weight: f64,
    pub numeric_penalty: f64,
    pub numeric_tolerance: f64,
    pub context_window: usize,
}

impl Default for VerifierSettings {
    fn default() -> Self {
        Self {
            kind: VerifierKind::None,
            jaccard_weight: 0.5,
            numeric_weight: 0.5,
            numeric_penalty: 0.25,
            numeric_tolerance: 0.05,
            context_window: 30,
        }
    }
}

#[must_use]
pub fn build_verifier(settings: &VerifierSettings) -> Box<dyn FidelityVerifier> {
    let numeric = || {
        NumericFactChecker::new(
            settings.context_window,
            settings.numeric_penalty,
            settings.numeric_tolerance,
        )
    };
    match settings.kind {
        VerifierKind::None => Box::new(NoOpVerifier),
        VerifierKind::Jaccard => Box::new(TokenJaccardVerifier::<WhitespaceTokenizer>::default()),
        VerifierKind::Numeric => Box::new(numeric()),
        VerifierKind::Composite => Box::new(
            CompositeFidelityVerifier::new()
                .with(
                    TokenJaccardVerifier::<WhitespaceTokenizer>::default(),
                    settings.jaccard_weight,
                )
                .with(numeric(), settings.numeric_weight),
        ),
    }
}

fn normalize_value(value: &str) -> String {
    let n: String = value
        .to_lowercase()
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    if let Some(rest) = n.strip_prefix('v') {
        if !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit() || c == '.') {
            return rest.to_string();
        }
    }
    n
}

fn extract_number(value: &str) -> Option<f64> {
    let n: String = value
        .to_lowercase()
        .chars()
        .filter(|c| !matches!(c, ',' | '$' | '€' | '£' | '¥') && !c.is_whitespace())
        .collect();
    let split = n.find(|c: char| c.is_alphabetic()).unwrap_or(n.len());
    let (number, suffix) = n.split_at(split);
    let number: f64 = number.parse().ok()?;
    if suffix.is_empty() {
        return Some(number);
    }
    MULTIPLIERS
        .iter()
        .find(|(s, _)| *s == suffix)
        .map(|(_, m)| number * m)
}

fn context_around(text: &str, start: usize, end: usize, window: usize) -> String {
    let before = text[..start].chars().count();
    let inner = text[start..end].chars().count();
    text.chars()
        .skip(before.saturating_sub(window))
        .take(before.min(window) + inner + window)
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jaccard_verifier_edge_cases() {
        let v = TokenJaccardVerifier::<WhitespaceTokenizer>::default();
        assert_eq!(v.score("", ""), 1.0);
        assert_eq!(v.score("a", ""), 0.0);
        assert!((v.score("a b", "b c") - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn numeric_checker_reports_missing_year() {
        let checker = NumericFactChecker::new(30, 0.5, 0.05);
        let source = "The model was released in 2017 and updated in 2020.";
        let rewritten = "The model was updated in 2020.";
        assert_eq!(checker.issues(source, rewritten), vec!["Year 2017 missing"]);
        assert!((checker.score(source, rewritten) - 0.5).abs() < 1e-9);
        assert_eq!(checker.score(source, source), 1.0);
    }

    #[test]
    fn numeric_checker_normalizes_percent_words() {
        let checker = NumericFactChecker::default();
        assert!(checker.find_missing("growth of 25%", "growth of 25 percent").is_empty());
        assert!(checker.find_missing("a 12.5 pct rise", "a 12.5% rise").is_empty());
        assert_eq!(checker.find_missing("growth of 25%", "growth of 26%").len(), 1);
    }

    #[test]
    fn quantities_use_relative_tolerance() {
        let checker = NumericFactChecker::default();
        assert!(checker
            .find_missing("about 1,000 million users", "about 1 billion users")
            .is_empty());
        assert!(checker.find_missing("2 thousand units", "2K units").is_empty());
        assert_eq!(checker.find_missing("5 million users", "6 million users").len(), 1);
    }

    #[test]
    fn versions_ignore_v_prefix() {
        let checker = NumericFactChecker::default();
        assert!(checker.find_missing("runs v1.2.3 today", "runs 1.2.3 today").is_empty());
        assert_eq!(checker.find_missing("runs v2.0", "runs v2.1").len(), 1);
    }

    #[test]
    fn zero_penalty_never_lowers_score() {
        let checker = NumericFactChecker::default();
        assert_eq!(checker.score("in 1999", "never"), 1.0);
        assert_eq!(checker.issues("in 1999", "never"), vec!["Year 1999 missing"]);
    }

    #[test]
    fn composite_averages_and_unions() {
        let v = CompositeFidelityVerifier::new()
            .with(NoOpVerifier, 1.0)
            .with(NumericFactChecker::new(30, 1.0, 0.05), 1.0);
        assert!((v.score("in 1999", "never") - 0.5).abs() < 1e-9);
        assert_eq!(v.issues("in 1999", "never"), vec!["Year 1999 missing"]);
        assert_eq!(CompositeFidelityVerifier::new().score("a", "b"), 1.0);
    }

    #[test]
    fn context_is_char_safe() {
        let c = context_around("价格 2019 年上涨", 7, 11, 2);
        assert_eq!(c, "格 2019 年");
    }

    #[test]
    fn builds_verifier_from_settings() {
        let settings = VerifierSettings {
            kind: VerifierKind::Jaccard,
            ..VerifierSettings::default()
        };
        let v = build_verifier(&settings);
        assert_eq!(v.score("a b", "a b"), 1.0);
        assert_eq!(VerifierKind::parse("Composite"), Some(VerifierKind::Composite));
    }
}
