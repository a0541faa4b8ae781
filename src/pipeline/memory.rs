use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::plan::{GenerationPlan, SectionSpec};
use crate::quality::is_key_point_covered;
use crate::terminology::terms_in_effect;

static ENTITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Z][A-Za-z0-9_-]{2,}\b").expect("entity regex"));
static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(?:19|20)\d{2}\b").expect("year regex"));

/// What the document has established so far. Replaced, never edited, after each section.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationState {
    pub known_entities: Vec<String>,
    pub terminology_map: BTreeMap<String, String>,
    pub timeline: Vec<String>,
    pub covered_key_points: Vec<String>,
    pub remaining_key_points: Vec<String>,
}

impl GenerationState {
    #[must_use]
    pub fn from_plan(plan: &GenerationPlan) -> Self {
        Self {
            known_entities: Vec::new(),
            terminology_map: plan.terminology_preferences.clone(),
            timeline: Vec::new(),
            covered_key_points: Vec::new(),
            remaining_key_points: plan.all_key_points(),
        }
    }

    /// Snapshot after `section_text` was accepted for `section`.
    #[must_use]
    pub fn updated(&self, plan: &GenerationPlan, section: &SectionSpec, section_text: &str) -> Self {
        let known_entities = merge_unique(
            self.known_entities.iter().map(String::as_str),
            extract_entities(section_text, section).iter().map(String::as_str),
        );

        let mut terminology_map = self.terminology_map.clone();
        for (source, preferred) in terms_in_effect(&plan.terminology_preferences, section_text) {
            terminology_map.insert(source.clone(), preferred.clone());
        }

        let mut timeline = self.timeline.clone();
        for m in YEAR_RE.find_iter(section_text) {
            if !timeline.iter().any(|y| y == m.as_str()) {
                timeline.push(m.as_str().to_string());
            }
        }

        let mut covered = self.covered_key_points.clone();
        let mut remaining = self.remaining_key_points.clone();
        for point in &section.key_points {
            if is_key_point_covered(point, section_text) {
                if !covered.contains(point) {
                    covered.push(point.clone());
                }
                remaining.retain(|p| p != point);
            }
        }

        Self {
            known_entities,
            terminology_map,
            timeline,
            covered_key_points: covered,
            remaining_key_points: remaining,
        }
    }

    #[must_use]
    pub fn progress(&self) -> (usize, usize) {
        let covered = self.covered_key_points.len();
        (covered, covered + self.remaining_key_points.len())
    }
}

/// Capitalized tokens plus required entities found verbatim (case-insensitive).
fn extract_entities(text: &str, section: &SectionSpec) -> Vec<String> {
    let lowered = text.to_lowercase();
    let inferred = ENTITY_RE.find_iter(text).map(|m| m.as_str());
    let required = section
        .required_entities
        .iter()
        .filter(|e| lowered.contains(&e.to_lowercase()))
        .map(String::as_str);
    merge_unique(std::iter::empty(), inferred.chain(required))
}

/// Case-insensitive dedup keeping the first-seen spelling and order.
fn merge_unique<'a>(
    existing: impl Iterator<Item = &'a str>,
    new_items: impl Iterator<Item = &'a str>,
) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    let mut out: Vec<String> = Vec::new();
    for item in existing.chain(new_items) {
        let value = item.trim();
        let lowered = value.to_lowercase();
        if value.is_empty() || seen.contains(&lowered) {
            continue;
        }
        seen.push(lowered);
        out.push(value.to_string());
    }
    out
}

pub fn write_state_snapshot(path: &Path, state: &GenerationState) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(state).context("serialize generation state")?;
    std::fs::write(path, json).with_context(|| format!("write state: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> GenerationPlan {
        GenerationPlan {
            topic: "Chunk-wise generation".into(),
            objective: "teach".into(),
            audience: "ML engineers".into(),
            tone: "neutral technical".into(),
            target_total_length: 500,
            narrative_voice: "third-person".into(),
            do_not_include: vec![],
            terminology_preferences: [("kv cache".to_string(), "key-value cache".to_string())]
                .into_iter()
                .collect(),
            sections: vec![
                SectionSpec {
                    title: "Plan".into(),
                    key_points: vec!["global anchor sets scope".into(), "shared".into()],
                    required_entities: vec!["global anchor".into()],
                    constraints: vec![],
                    target_length: 120,
                },
                SectionSpec {
                    title: "State".into(),
                    key_points: vec!["state table tracks entities".into(), "shared".into()],
                    required_entities: vec!["state table".into()],
                    constraints: vec![],
                    target_length: 120,
                },
            ],
        }
    }

    #[test]
    fn from_plan_dedups_remaining_points() {
        let s = GenerationState::from_plan(&plan());
        assert_eq!(
            s.remaining_key_points,
            vec!["global anchor sets scope", "shared", "state table tracks entities"]
        );
        assert_eq!(s.terminology_map.len(), 1);
        assert_eq!(s.progress(), (0, 3));
    }

    #[test]
    fn update_tracks_entities_years_and_points() {
        let p = plan();
        let s0 = GenerationState::from_plan(&p);
        let s1 = s0.updated(
            &p,
            &p.sections[0],
            "In 2017 the Global anchor from OpenAI set scope; OPENAI repeated it in 2019 and 2017.",
        );
        assert_eq!(s1.known_entities, vec!["Global", "OpenAI", "global anchor"]);
        assert_eq!(s1.timeline, vec!["2017", "2019"]);
        assert_eq!(s1.covered_key_points, vec!["global anchor sets scope"]);
        assert!(s1.remaining_key_points.contains(&"shared".to_string()));
        assert_eq!(s0.covered_key_points.len(), 0);

        let s2 = s1.updated(&p, &p.sections[1], "The state table tracks entities. Shared.");
        assert_eq!(s2.known_entities[..3], s1.known_entities[..]);
        assert!(s2.known_entities.contains(&"state table".to_string()));
        assert_eq!(s2.remaining_key_points, Vec::<String>::new());
        assert_eq!(s2.progress(), (3, 3));
    }

    #[test]
    fn remaining_only_shrinks_and_stays_disjoint() {
        let p = plan();
        let texts = [
            "nothing relevant",
            "shared state",
            "global anchor sets scope",
            "nothing again",
            "state table tracks entities",
        ];
        let mut state = GenerationState::from_plan(&p);
        for (i, text) in texts.iter().enumerate() {
            let next = state.updated(&p, &p.sections[i % 2], text);
            assert!(next.remaining_key_points.len() <= state.remaining_key_points.len());
            assert!(next
                .remaining_key_points
                .iter()
                .all(|r| !next.covered_key_points.contains(r)));
            assert!(next
                .remaining_key_points
                .iter()
                .all(|r| state.remaining_key_points.contains(r)));
            state = next;
        }
    }

    #[test]
    fn terminology_in_effect_is_recorded() {
        let mut p = plan();
        p.terminology_preferences
            .insert("LLM".to_string(), "language model".to_string());
        let mut s = GenerationState::from_plan(&p);
        s.terminology_map.clear();
        let s = s.updated(&p, &p.sections[0], "A language model reads the prompt.");
        assert_eq!(s.terminology_map.len(), 1);
        assert_eq!(s.terminology_map["LLM"], "language model");
    }
}
