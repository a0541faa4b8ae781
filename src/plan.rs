use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PlanError;
use crate::textutil::clip_for_log;

static THINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("think regex"));
static THINKING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<thinking>.*?</thinking>").expect("thinking regex"));
static REASONING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<reasoning>.*?</reasoning>").expect("reasoning regex"));

pub const DEFAULT_NARRATIVE_VOICE: &str = "third-person";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SectionSpec {
    pub title: String,
    pub key_points: Vec<String>,
    pub required_entities: Vec<String>,
    pub constraints: Vec<String>,
    pub target_length: usize,
}

/// Field order matches the JSON layout shown to the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationPlan {
    pub topic: String,
    pub objective: String,
    pub audience: String,
    pub tone: String,
    pub target_total_length: usize,
    pub narrative_voice: String,
    pub do_not_include: Vec<String>,
    pub terminology_preferences: BTreeMap<String, String>,
    pub sections: Vec<SectionSpec>,
}

impl SectionSpec {
    fn from_json_value(v: &Value) -> Result<Self, PlanError> {
        Ok(Self {
            title: string_field(v, "title"),
            key_points: string_list(v.get("key_points"), "key_points")?,
            required_entities: string_list(v.get("required_entities"), "required_entities")?,
            constraints: string_list(v.get("constraints"), "constraints")?,
            target_length: length_field(v.get("target_length"), "target_length")?,
        })
    }
}

impl GenerationPlan {
    /// Builds and validates a plan from a parsed JSON object.
    pub fn from_json_value(v: &Value) -> Result<Self, PlanError> {
        let obj = v.as_object().ok_or_else(|| {
            PlanError::Invalid(format!("plan payload must be an object, got {}", kind_of(v)))
        })?;

        let terminology_preferences = match obj.get("terminology_preferences") {
            None | Some(Value::Null) => BTreeMap::new(),
            Some(Value::Object(map)) => map
                .iter()
                .map(|(k, v)| (k.trim().to_string(), value_to_string(v).trim().to_string()))
                .filter(|(k, v)| !k.is_empty() && !v.is_empty())
                .collect(),
            Some(_) => {
                return Err(PlanError::Invalid(
                    "terminology_preferences must be an object".to_string(),
                ))
            }
        };

        let sections = match obj.get("sections") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .filter(|s| s.is_object())
                .map(SectionSpec::from_json_value)
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => return Err(PlanError::Invalid("sections must be a list".to_string())),
        };

        let mut narrative_voice = string_field(v, "narrative_voice");
        if narrative_voice.is_empty() {
            narrative_voice = DEFAULT_NARRATIVE_VOICE.to_string();
        }

        let plan = Self {
            topic: string_field(v, "topic"),
            objective: string_field(v, "objective"),
            audience: string_field(v, "audience"),
            tone: string_field(v, "tone"),
            target_total_length: length_field(obj.get("target_total_length"), "target_total_length")?,
            narrative_voice,
            do_not_include: string_list(obj.get("do_not_include"), "do_not_include")?,
            terminology_preferences,
            sections,
        };
        plan.validate()?;
        Ok(plan)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, PlanError> {
        let v: Value =
            serde_json::from_str(raw).map_err(|e| PlanError::Invalid(format!("plan json: {e}")))?;
        Self::from_json_value(&v)
    }

    /// Parses a plan out of free-form model output (fences, reasoning tags, trailing prose).
    pub fn from_model_output(raw: &str) -> Result<Self, PlanError> {
        let json = extract_json_object(raw)?;
        let v: Value = serde_json::from_str(&json).map_err(|e| {
            PlanError::Malformed(format!("invalid json: {e}. Extracted: {}", clip_for_log(&json, 500)))
        })?;
        if !v.is_object() {
            return Err(PlanError::Malformed(format!(
                "plan payload must be an object, got {}",
                kind_of(&v)
            )));
        }
        Self::from_json_value(&v)
    }

    pub fn validate(&self) -> Result<(), PlanError> {
        if self.topic.is_empty() {
            return Err(PlanError::Invalid("plan topic must not be empty".into()));
        }
        if self.objective.is_empty() {
            return Err(PlanError::Invalid("plan objective must not be empty".into()));
        }
        if self.target_total_length == 0 {
            return Err(PlanError::Invalid("target_total_length must be positive".into()));
        }
        if self.sections.is_empty() {
            return Err(PlanError::Invalid("plan must include at least one section".into()));
        }
        for (idx, section) in self.sections.iter().enumerate() {
            if section.title.is_empty() {
                return Err(PlanError::Invalid(format!("section[{idx}] title must not be empty")));
            }
            if section.target_length == 0 {
                return Err(PlanError::Invalid(format!(
                    "section[{idx}] target_length must be positive"
                )));
            }
            if section.key_points.is_empty() {
                return Err(PlanError::Invalid(format!("section[{idx}] must define key_points")));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Every key point in outline order, without duplicates.
    #[must_use]
    pub fn all_key_points(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for point in self.sections.iter().flat_map(|s| s.key_points.iter()) {
            if !out.contains(point) {
                out.push(point.clone());
            }
        }
        out
    }
}

/// Locates the plan JSON object inside raw model output.
pub fn extract_json_object(raw: &str) -> Result<String, PlanError> {
    let mut text = raw.trim().to_string();
    if text.starts_with("```") {
        if let Some(nl) = text.find('\n') {
            text = text[nl..].trim_start().to_string();
        }
        if text.ends_with("```") {
            text.truncate(text.len() - 3);
            text = text.trim_end().to_string();
        }
    }
    let text = THINK_RE.replace_all(&text, "");
    let text = THINKING_RE.replace_all(&text, "");
    let text = REASONING_RE.replace_all(&text, "");
    let text = text.trim();

    if let Some(candidate) = balanced_object_span(text) {
        if serde_json::from_str::<Value>(candidate).is_ok() {
            return Ok(candidate.to_string());
        }
    }

    if let (Some(first), Some(last)) = (text.find('{'), text.rfind('}')) {
        if last > first {
            let candidate = &text[first..=last];
            if serde_json::from_str::<Value>(candidate).is_ok() {
                return Ok(candidate.to_string());
            }
        }
    }

    let opens = text.matches('{').count();
    let closes = text.matches('}').count();
    if text.starts_with('{') && !text.ends_with('}') && opens > closes {
        return Err(PlanError::Truncated(format!(
            "incomplete JSON, the output likely hit the max token limit. Raw output: {}",
            clip_for_log(text, 500)
        )));
    }
    Err(PlanError::Malformed(format!(
        "no valid JSON object found. Raw output: {}",
        clip_for_log(text, 500)
    )))
}

/// First top-level `{...}` span, skipping braces inside single or double quoted strings.
fn balanced_object_span(text: &str) -> Option<&str> {
    let mut start: Option<usize> = None;
    let mut depth = 0usize;
    let mut in_double = false;
    let mut in_single = false;
    let mut escape_next = false;

    for (i, ch) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        if ch == '\\' && (in_double || in_single) {
            escape_next = true;
            continue;
        }
        if ch == '"' && !in_single {
            in_double = !in_double;
            continue;
        }
        if ch == '\'' && !in_double {
            in_single = !in_single;
            continue;
        }
        if in_double || in_single {
            continue;
        }
        match ch {
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    return start.map(|s| &text[s..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

fn value_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn string_field(v: &Value, key: &str) -> String {
    v.get(key).map(value_to_string).unwrap_or_default().trim().to_string()
}

fn string_list(v: Option<&Value>, key: &str) -> Result<Vec<String>, PlanError> {
    match v {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items
            .iter()
            .map(|item| value_to_string(item).trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()),
        Some(_) => Err(PlanError::Invalid(format!("{key}: expected list value"))),
    }
}

/// Missing, null or non-positive lengths become 0 so validation reports them.
fn length_field(v: Option<&Value>, key: &str) -> Result<usize, PlanError> {
    let n = match v {
        None | Some(Value::Null) => 0,
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Some(Value::String(s)) if s.trim().is_empty() => 0,
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| PlanError::Invalid(format!("{key} must be an integer, got '{s}'")))?,
        Some(other) => {
            return Err(PlanError::Invalid(format!(
                "{key} must be an integer, got {}",
                kind_of(other)
            )))
        }
    };
    Ok(usize::try_from(n).unwrap_or(0))
}

fn kind_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}
