pub mod openai;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use openai::{OpenAiBackendConfig, OpenAiChatModel};

/// What a backend call is for; forwarded so backends can log or route per task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmTask {
    RewriteChunk,
    PlanGeneration,
    SectionGeneration,
    ConsistencyPass,
}

impl LlmTask {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RewriteChunk => "rewrite_chunk",
            Self::PlanGeneration => "plan_generation",
            Self::SectionGeneration => "section_generation",
            Self::ConsistencyPass => "consistency_pass",
        }
    }
}

impl fmt::Display for LlmTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("[{task}] rate limited (429): {message}")]
    RateLimited { task: LlmTask, message: String },
    #[error("[{task}] server error ({status}): {message}")]
    Server {
        task: LlmTask,
        status: u16,
        message: String,
    },
    #[error("[{task}] request timed out")]
    Timeout { task: LlmTask },
    #[error("[{task}] {message}")]
    Client {
        task: LlmTask,
        status: u16,
        message: String,
    },
    #[error("[{task}] invalid model id '{model}'; set LLM_MODEL to a model the provider supports")]
    InvalidModelId { task: LlmTask, model: String },
    #[error("[{task}] transport error: {message}")]
    Transport { task: LlmTask, message: String },
    #[error("missing API key; set {env_var} or backend.api_key")]
    MissingApiKey { env_var: String },
    #[error("[{task}] response has no choices")]
    EmptyResponse { task: LlmTask },
    #[error("backend setup failed: {0}")]
    Setup(String),
}

impl BackendError {
    /// Transport-level failures worth retrying with backoff. Everything else fails fast.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. }
                | Self::Server { .. }
                | Self::Timeout { .. }
                | Self::Transport { .. }
        )
    }
}

/// The single blocking "complete this prompt" call everything else is built on.
pub trait TextGenerator {
    fn generate(&mut self, task: LlmTask, prompt: &str) -> Result<String, BackendError>;
}

impl<T: TextGenerator + ?Sized> TextGenerator for &mut T {
    fn generate(&mut self, task: LlmTask, prompt: &str) -> Result<String, BackendError> {
        (**self).generate(task, prompt)
    }
}

impl<T: TextGenerator + ?Sized> TextGenerator for Box<T> {
    fn generate(&mut self, task: LlmTask, prompt: &str) -> Result<String, BackendError> {
        (**self).generate(task, prompt)
    }
}

/// Strips a surrounding markdown fence from a model completion.
#[must_use]
pub fn cleanup_model_text(text: &str) -> String {
    let mut s = text.trim().to_string();
    if s.starts_with("```") {
        if let Some(i) = s.find('\n') {
            s = s[i + 1..].to_string();
        } else {
            s.clear();
        }
        if let Some(end) = s.rfind("```") {
            s.truncate(end);
        }
    }
    s.trim().to_string()
}

/// Drops one pair of enclosing quotes when the body has no other quotes.
///
/// Only for free-form generated prose; a rewrite of quoted source text must keep its quotes.
#[must_use]
pub fn strip_enclosing_quotes(text: &str) -> String {
    let s = text.trim();
    let enclosed = s.len() >= 2 && s.starts_with('"') && s.ends_with('"');
    if enclosed && !s[1..s.len() - 1].contains('"') {
        return s[1..s.len() - 1].trim().to_string();
    }
    s.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_classification() {
        let t = LlmTask::RewriteChunk;
        assert!(BackendError::RateLimited {
            task: t,
            message: String::new()
        }
        .is_retryable());
        assert!(BackendError::Server {
            task: t,
            status: 502,
            message: String::new()
        }
        .is_retryable());
        assert!(!BackendError::Client {
            task: t,
            status: 401,
            message: String::new()
        }
        .is_retryable());
        assert!(!BackendError::InvalidModelId {
            task: t,
            model: "x".into()
        }
        .is_retryable());
    }

    #[test]
    fn cleanup_strips_fences() {
        assert_eq!(cleanup_model_text("```text\nhello\n```"), "hello");
        assert_eq!(cleanup_model_text("plain"), "plain");
        assert_eq!(cleanup_model_text("  \"quoted\" "), "\"quoted\"");
    }

    #[test]
    fn enclosing_quotes_are_dropped_only_when_unambiguous() {
        assert_eq!(strip_enclosing_quotes("  \"quoted\" "), "quoted");
        assert_eq!(strip_enclosing_quotes("plain"), "plain");
        assert_eq!(
            strip_enclosing_quotes("\"hi\" and \"bye\""),
            "\"hi\" and \"bye\""
        );
        assert_eq!(strip_enclosing_quotes("\""), "\"");
    }

    #[test]
    fn task_tags_are_snake_case() {
        assert_eq!(LlmTask::SectionGeneration.to_string(), "section_generation");
        assert_eq!(
            serde_json::to_string(&LlmTask::ConsistencyPass).expect("json"),
            "\"consistency_pass\""
        );
    }
}
