use serde::{Deserialize, Serialize};

/// Every compromise a run made, in the order it was noticed.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub coverage_missing: Vec<String>,
    pub terminology_issues: Vec<String>,
    pub repetition_issues: Vec<String>,
    pub drift_issues: Vec<String>,
    pub section_warnings: Vec<String>,
    pub entity_missing: Vec<String>,
    pub numeric_fact_issues: Vec<String>,
    pub consistency_pass_applied: bool,
    pub consistency_pass_used_fallback: bool,
}

impl QualityReport {
    #[must_use]
    pub fn has_issues(&self) -> bool {
        !(self.coverage_missing.is_empty()
            && self.terminology_issues.is_empty()
            && self.repetition_issues.is_empty()
            && self.drift_issues.is_empty())
    }

    /// Missing required entities or dropped numeric facts.
    #[must_use]
    pub fn has_critical_issues(&self) -> bool {
        !(self.entity_missing.is_empty() && self.numeric_fact_issues.is_empty())
    }

    pub fn warn_section(&mut self, message: impl Into<String>) {
        self.section_warnings.push(message.into());
    }

    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.coverage_missing.len()
            + self.terminology_issues.len()
            + self.repetition_issues.len()
            + self.drift_issues.len()
            + self.section_warnings.len()
            + self.entity_missing.len()
            + self.numeric_fact_issues.len()
    }
}
