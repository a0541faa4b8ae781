use std::collections::HashSet;

use super::fidelity::NumericFactChecker;
use super::{is_key_point_covered, token_jaccard, tokenize, words_in_order};
use crate::plan::{GenerationPlan, SectionSpec};
use crate::tokenizer::Tokenizer;

/// Required entities per section: exact, hyphen/underscore variants, or words in order.
#[derive(Clone, Copy, Debug, Default)]
pub struct EntityPresenceChecker;

impl EntityPresenceChecker {
    #[must_use]
    pub fn find_missing(&self, plan: &GenerationPlan, section_outputs: &[String]) -> Vec<String> {
        let mut out = Vec::new();
        for (idx, (section, text)) in plan.sections.iter().zip(section_outputs).enumerate() {
            for entity in self.missing_entities(section, text) {
                out.push(format!(
                    "Section {} ('{}') missing required entity: '{}'",
                    idx + 1,
                    section.title,
                    entity
                ));
            }
        }
        out
    }

    #[must_use]
    pub fn missing_entities(&self, section: &SectionSpec, text: &str) -> Vec<String> {
        let text_lower = text.to_lowercase();
        section
            .required_entities
            .iter()
            .filter(|e| !entity_present(&e.to_lowercase(), &text_lower))
            .cloned()
            .collect()
    }
}

fn entity_present(entity: &str, text: &str) -> bool {
    if text.contains(entity)
        || text.contains(&entity.replace(' ', "-"))
        || text.contains(&entity.replace(' ', "_"))
    {
        return true;
    }
    let words: Vec<&str> = entity.split_whitespace().collect();
    words.len() > 1 && words_in_order(&words, text)
}

/// Numeric facts from the pre-edit draft that the edited text no longer carries.
#[derive(Clone, Debug)]
pub struct GenerationNumericFactChecker {
    core: NumericFactChecker,
}

impl GenerationNumericFactChecker {
    #[must_use]
    pub fn new(context_window: usize, tolerance: f64) -> Self {
        Self {
            core: NumericFactChecker::new(context_window, 0.0, tolerance),
        }
    }

    #[must_use]
    pub fn find_missing(&self, source: &str, generated: &str) -> Vec<String> {
        self.core
            .find_missing(source, generated)
            .into_iter()
            .map(|f| {
                format!(
                    "{} '{}' may be missing (was in: '...{}...')",
                    f.kind.label(),
                    f.value,
                    f.context
                )
            })
            .collect()
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct OutlineCoverageChecker;

impl OutlineCoverageChecker {
    #[must_use]
    pub fn find_missing(&self, plan: &GenerationPlan, text: &str) -> Vec<String> {
        plan.sections
            .iter()
            .flat_map(|s| s.key_points.iter())
            .filter(|p| !is_key_point_covered(p, text))
            .cloned()
            .collect()
    }
}

#[derive(Clone, Debug)]
pub struct RepetitionAndDriftChecker {
    repetition_threshold: f64,
    drift_overlap_threshold: f64,
    min_tokens_for_drift: usize,
}

impl Default for RepetitionAndDriftChecker {
    fn default() -> Self {
        Self::new(0.92, 0.05, 8)
    }
}

impl RepetitionAndDriftChecker {
    #[must_use]
    pub fn new(
        repetition_threshold: f64,
        drift_overlap_threshold: f64,
        min_tokens_for_drift: usize,
    ) -> Self {
        Self {
            repetition_threshold,
            drift_overlap_threshold,
            min_tokens_for_drift,
        }
    }

    /// Returns `(repetition_issues, drift_issues)`.
    #[must_use]
    pub fn find_issues(
        &self,
        plan: &GenerationPlan,
        section_outputs: &[String],
    ) -> (Vec<String>, Vec<String>) {
        let mut repetition = Vec::new();
        for idx in 1..section_outputs.len() {
            let score = token_jaccard(&section_outputs[idx - 1], &section_outputs[idx]);
            if score >= self.repetition_threshold {
                repetition.push(format!(
                    "Section {} and section {} are highly repetitive (score={score:.2}).",
                    idx,
                    idx + 1
                ));
            }
        }

        let allowed = plan_vocabulary(plan);
        let mut drift = Vec::new();
        for (idx, text) in section_outputs.iter().enumerate() {
            let tokens = tokenize(text);
            if tokens.is_empty() || tokens.len() < self.min_tokens_for_drift {
                continue;
            }
            let overlap = tokens.intersection(&allowed).count() as f64 / tokens.len() as f64;
            if overlap < self.drift_overlap_threshold {
                drift.push(format!(
                    "Section {} may drift from plan topics (overlap={overlap:.2}).",
                    idx + 1
                ));
            }
        }
        (repetition, drift)
    }
}

fn plan_vocabulary(plan: &GenerationPlan) -> HashSet<String> {
    let mut allowed = tokenize(&plan.topic);
    allowed.extend(tokenize(&plan.objective));
    allowed.extend(tokenize(&plan.audience));
    for section in &plan.sections {
        allowed.extend(tokenize(&section.title));
        for point in &section.key_points {
            allowed.extend(tokenize(point));
        }
        for entity in &section.required_entities {
            allowed.extend(tokenize(entity));
        }
    }
    for (source, preferred) in &plan.terminology_preferences {
        allowed.extend(tokenize(source));
        allowed.extend(tokenize(preferred));
    }
    allowed
}

/// Penalties and switches used to score one section candidate.
#[derive(Clone, Debug)]
pub struct SectionScoring {
    pub min_length_ratio: f64,
    pub max_length_ratio: f64,
    pub repetition_threshold: f64,
    pub entity_missing_penalty: f64,
    pub length_violation_penalty: f64,
    pub repetition_penalty: f64,
    pub penalize_length: bool,
    pub missing_entities_critical: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SectionAssessment {
    pub score: f64,
    pub issues: Vec<String>,
    /// Outstanding issue that blocks acceptance regardless of score.
    pub critical: bool,
}

#[must_use]
pub fn assess_section(
    section: &SectionSpec,
    text: &str,
    previous: Option<&str>,
    tokenizer: &dyn Tokenizer,
    scoring: &SectionScoring,
) -> SectionAssessment {
    let mut score = 1.0;
    let mut issues = Vec::new();

    let missing = EntityPresenceChecker.missing_entities(section, text);
    for entity in &missing {
        issues.push(format!("Missing required entity: '{entity}'"));
    }
    score -= scoring.entity_missing_penalty * missing.len() as f64;

    let tokens = tokenizer.count(text);
    let lo = section.target_length as f64 * scoring.min_length_ratio;
    let hi = section.target_length as f64 * scoring.max_length_ratio;
    let len_issue = if (tokens as f64) < lo {
        Some(format!(
            "Section length {tokens} tokens is too short, below target range [{lo:.0}, {hi:.0}]"
        ))
    } else if (tokens as f64) > hi {
        Some(format!(
            "Section length {tokens} tokens is too long, above target range [{lo:.0}, {hi:.0}]"
        ))
    } else {
        None
    };
    if let Some(issue) = len_issue {
        issues.push(issue);
        if scoring.penalize_length {
            score -= scoring.length_violation_penalty;
        }
    }

    if let Some(prev) = previous {
        let similarity = token_jaccard(prev, text);
        if similarity >= scoring.repetition_threshold {
            issues.push(format!(
                "Section is highly similar to the previous section (similarity={similarity:.2})"
            ));
            score -= scoring.repetition_penalty;
        }
    }

    SectionAssessment {
        score: f64::max(score, 0.0),
        issues,
        critical: scoring.missing_entities_critical && !missing.is_empty(),
    }
}
