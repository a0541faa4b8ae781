//! Generate → score → accept-or-repair loop shared by rephrase and generation modes.

use tracing::{debug, info, warn};

use crate::quality::SectionAssessment;

#[derive(Clone, Debug, PartialEq)]
pub struct Verdict {
    pub score: f64,
    pub issues: Vec<String>,
    /// Blocks acceptance even when the score clears the threshold.
    pub critical: bool,
}

impl From<SectionAssessment> for Verdict {
    fn from(a: SectionAssessment) -> Self {
        Self {
            score: a.score,
            issues: a.issues,
            critical: a.critical,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub text: String,
    pub score: f64,
    pub issues: Vec<String>,
    pub critical: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttemptKind {
    /// Fresh request for the unit.
    Draft,
    /// Targeted correction of the best candidate so far.
    Repair,
}

pub struct AttemptRequest<'a> {
    pub retry_index: usize,
    pub kind: AttemptKind,
    pub best: Option<&'a Candidate>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RetryOutcome {
    Accepted { candidate: Candidate, attempts: usize },
    /// Budget spent; carries the best-scoring candidate.
    Exhausted { candidate: Candidate, attempts: usize },
    /// Every attempt came back empty.
    NoOutput { attempts: usize },
}

impl RetryOutcome {
    #[must_use]
    pub fn attempts(&self) -> usize {
        match self {
            Self::Accepted { attempts, .. }
            | Self::Exhausted { attempts, .. }
            | Self::NoOutput { attempts } => *attempts,
        }
    }

    #[must_use]
    pub fn candidate(&self) -> Option<&Candidate> {
        match self {
            Self::Accepted { candidate, .. } | Self::Exhausted { candidate, .. } => Some(candidate),
            Self::NoOutput { .. } => None,
        }
    }

    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

#[derive(Clone, Debug)]
pub struct RetryController {
    max_attempts: usize,
    threshold: f64,
}

impl RetryController {
    /// At least one attempt is always made.
    #[must_use]
    pub fn new(max_attempts: usize, threshold: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            threshold,
        }
    }

    #[must_use]
    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Runs the loop for one unit. `attempt` performs one backend call; errors abort the unit.
    ///
    /// Candidates rank by `(not critical, score)`. A critical candidate never outranks a clean
    /// one, and among equals the returned candidate never scores below any seen.
    pub fn run<E>(
        &self,
        unit: &str,
        mut attempt: impl FnMut(AttemptRequest<'_>) -> Result<String, E>,
        mut assess: impl FnMut(&str) -> Verdict,
    ) -> Result<RetryOutcome, E> {
        let mut best: Option<Candidate> = None;

        for retry_index in 0..self.max_attempts {
            let kind = if retry_index == 0 || best.is_none() {
                AttemptKind::Draft
            } else {
                AttemptKind::Repair
            };
            let raw = attempt(AttemptRequest {
                retry_index,
                kind,
                best: best.as_ref(),
            })?;
            let text = raw.trim();
            if text.is_empty() {
                warn!(unit, attempt = retry_index + 1, "empty backend output");
                continue;
            }

            let verdict = assess(text);
            debug!(
                unit,
                attempt = retry_index + 1,
                score = verdict.score,
                critical = verdict.critical,
                issues = verdict.issues.len(),
                "candidate scored"
            );

            let candidate = Candidate {
                text: text.to_string(),
                score: verdict.score,
                issues: verdict.issues,
                critical: verdict.critical,
            };
            let ties_best = best.as_ref().map_or(true, |b| !outranks(b, &candidate));
            let beats_best = best.as_ref().map_or(true, |b| outranks(&candidate, b));

            if candidate.score >= self.threshold && !candidate.critical && ties_best {
                info!(unit, attempt = retry_index + 1, score = candidate.score, "accepted");
                return Ok(RetryOutcome::Accepted {
                    candidate,
                    attempts: retry_index + 1,
                });
            }
            if beats_best {
                best = Some(candidate);
            }
        }

        match best {
            Some(candidate) => {
                warn!(
                    unit,
                    score = candidate.score,
                    issues = candidate.issues.len(),
                    "retries exhausted, using best candidate"
                );
                Ok(RetryOutcome::Exhausted {
                    candidate,
                    attempts: self.max_attempts,
                })
            }
            None => {
                warn!(unit, "no attempt produced output");
                Ok(RetryOutcome::NoOutput {
                    attempts: self.max_attempts,
                })
            }
        }
    }
}

/// `a` ranks strictly above `b`.
fn outranks(a: &Candidate, b: &Candidate) -> bool {
    match (a.critical, b.critical) {
        (false, true) => true,
        (true, false) => false,
        _ => a.score > b.score,
    }
}
