use std::collections::BTreeMap;

use crate::plan::GenerationPlan;

/// Flags non-preferred terms used without their preferred replacement.
#[derive(Clone, Copy, Debug, Default)]
pub struct TerminologyConsistencyChecker;

impl TerminologyConsistencyChecker {
    #[must_use]
    pub fn find_issues(&self, plan: &GenerationPlan, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        let mut issues = Vec::new();
        for (source, preferred) in &plan.terminology_preferences {
            let s = source.to_lowercase();
            let p = preferred.to_lowercase();
            if s == p {
                continue;
            }
            if lowered.contains(&s) && !lowered.contains(&p) {
                issues.push(format!("Prefer '{preferred}' over '{source}'."));
            }
        }
        issues
    }
}

/// Plan mappings whose source or preferred term appears in `text`.
pub fn terms_in_effect<'a>(
    preferences: &'a BTreeMap<String, String>,
    text: &str,
) -> impl Iterator<Item = (&'a String, &'a String)> {
    let lowered = text.to_lowercase();
    preferences.iter().filter(move |(source, preferred)| {
        lowered.contains(&preferred.to_lowercase()) || lowered.contains(&source.to_lowercase())
    })
}

#[must_use]
pub fn render_glossary(map: &BTreeMap<String, String>, header: &str) -> String {
    if map.is_empty() {
        return String::new();
    }
    let mut out = String::new();
    out.push_str(header);
    out.push('\n');
    for (source, preferred) in map {
        out.push_str("- ");
        out.push_str(source);
        out.push_str(" => ");
        out.push_str(preferred);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan_with(prefs: &[(&str, &str)]) -> GenerationPlan {
        GenerationPlan {
            topic: "Optimization".into(),
            objective: "explain".into(),
            audience: "beginners".into(),
            tone: "neutral".into(),
            target_total_length: 300,
            narrative_voice: "third-person".into(),
            do_not_include: vec![],
            terminology_preferences: prefs
                .iter()
                .map(|(a, b)| (a.to_string(), b.to_string()))
                .collect(),
            sections: vec![],
        }
    }

    #[test]
    fn flags_nonpreferred_term() {
        let plan = plan_with(&[("梯度累积", "gradient accumulation"), ("same", "Same")]);
        let issues = TerminologyConsistencyChecker
            .find_issues(&plan, "梯度累积 can reduce memory pressure, same as before.");
        assert_eq!(issues, vec!["Prefer 'gradient accumulation' over '梯度累积'."]);
    }

    #[test]
    fn preferred_term_silences_issue() {
        let plan = plan_with(&[("AI", "artificial intelligence")]);
        assert!(TerminologyConsistencyChecker
            .find_issues(&plan, "AI, or Artificial Intelligence, ...")
            .is_empty());
    }

    #[test]
    fn in_effect_matches_either_side() {
        let plan = plan_with(&[("kv cache", "key-value cache"), ("LLM", "language model")]);
        let hits: Vec<_> = terms_in_effect(&plan.terminology_preferences, "The Key-Value cache")
            .map(|(s, _)| s.as_str())
            .collect();
        assert_eq!(hits, vec!["kv cache"]);
        let g = render_glossary(&plan.terminology_preferences, "Terminology:");
        assert!(g.contains("- LLM => language model"));
    }
}
