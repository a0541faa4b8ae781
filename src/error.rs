use thiserror::Error;

use crate::models::BackendError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// Structurally parsed but violates plan invariants. Never retried.
    #[error("invalid plan: {0}")]
    Invalid(String),
    #[error("malformed plan output: {0}")]
    Malformed(String),
    /// The model opened a JSON object and never closed it; a larger output budget may help.
    #[error("truncated plan output: {0}")]
    Truncated(String),
}

impl PlanError {
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Malformed(_) | Self::Truncated(_))
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error("plan generation failed after {attempts} attempts: {last}")]
    PlanRetriesExhausted { attempts: usize, last: PlanError },
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}
