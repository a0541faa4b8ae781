use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{BackendError, LlmTask, TextGenerator};
use crate::textutil::clip_for_log;

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "stepfun/step-3.5-flash:free";
pub const DEFAULT_API_KEY_ENV_VAR: &str = "LLM_API_KEY";
pub const BASE_URL_ENV_VAR: &str = "LLM_BASE_URL";
pub const MODEL_ENV_VAR: &str = "LLM_MODEL";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiBackendConfig {
    pub api_key: Option<String>,
    pub api_key_env_var: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_new_tokens: Option<u32>,
    /// `Some(false)` asks reasoning models to keep thinking text out of the content.
    pub reasoning: Option<bool>,
    pub max_retries: usize,
    pub base_delay_secs: f64,
    pub max_delay_secs: f64,
    pub timeout_secs: u64,
}

impl Default for OpenAiBackendConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env_var: DEFAULT_API_KEY_ENV_VAR.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.4,
            top_p: 0.9,
            max_new_tokens: None,
            reasoning: None,
            max_retries: 5,
            base_delay_secs: 1.0,
            max_delay_secs: 60.0,
            timeout_secs: 300,
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning: Option<ReasoningToggle>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ReasoningToggle {
    enabled: bool,
}

/// OpenAI-compatible `/chat/completions` client with backoff for transient failures.
pub struct OpenAiChatModel {
    client: Client,
    cfg: OpenAiBackendConfig,
    base_url: String,
    model: String,
    api_key: String,
    log_max_chars: usize,
}

impl OpenAiChatModel {
    pub fn new(cfg: OpenAiBackendConfig) -> Result<Self, BackendError> {
        let api_key = resolve_api_key(&cfg)?;
        let base_url = prefer_env(&cfg.base_url, DEFAULT_BASE_URL, BASE_URL_ENV_VAR);
        let model = prefer_env(&cfg.model, DEFAULT_MODEL, MODEL_ENV_VAR);
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs.max(1)))
            .build()
            .map_err(|e| BackendError::Setup(e.to_string()))?;
        Ok(Self {
            client,
            cfg,
            base_url,
            model,
            api_key,
            log_max_chars: 500,
        })
    }

    /// Clip length for raw outputs in debug logs.
    pub fn with_log_max_chars(mut self, n: usize) -> Self {
        self.log_max_chars = n;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn send_once(&self, task: LlmTask, body: &ChatRequest<'_>) -> Result<String, BackendError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .map_err(|e| classify_transport(task, &e))?;
        let status = resp.status().as_u16();
        let text = resp.text().map_err(|e| classify_transport(task, &e))?;
        if !(200..300).contains(&status) {
            return Err(classify_status(task, status, &text, &self.model));
        }
        let value: Value = serde_json::from_str(&text).map_err(|e| BackendError::Transport {
            task,
            message: format!("invalid response json: {e}"),
        })?;
        let message = value
            .pointer("/choices/0/message")
            .ok_or(BackendError::EmptyResponse { task })?;
        Ok(extract_message_content(message).trim().to_string())
    }
}

impl TextGenerator for OpenAiChatModel {
    fn generate(&mut self, task: LlmTask, prompt: &str) -> Result<String, BackendError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.cfg.temperature,
            top_p: self.cfg.top_p,
            max_tokens: self.cfg.max_new_tokens,
            reasoning: self.cfg.reasoning.map(|enabled| ReasoningToggle { enabled }),
        };
        info!(task = %task, prompt_chars = prompt.chars().count(), "llm request");

        let max_attempts = self.cfg.max_retries.max(1);
        let mut attempt = 0usize;
        loop {
            let t0 = Instant::now();
            match self.send_once(task, &body) {
                Ok(text) => {
                    info!(
                        task = %task,
                        chars = text.chars().count(),
                        secs = format_args!("{:.2}", t0.elapsed().as_secs_f64()),
                        "llm response"
                    );
                    debug!(task = %task, output = %clip_for_log(&text, self.log_max_chars), "llm raw output");
                    return Ok(text);
                }
                Err(err) if err.is_retryable() && attempt + 1 < max_attempts => {
                    let delay =
                        backoff_delay(attempt, self.cfg.base_delay_secs, self.cfg.max_delay_secs);
                    warn!(
                        task = %task,
                        attempt = attempt + 1,
                        max_attempts,
                        delay_secs = delay.as_secs_f64(),
                        error = %err,
                        "retrying backend call"
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn resolve_api_key(cfg: &OpenAiBackendConfig) -> Result<String, BackendError> {
    if let Some(key) = cfg.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
        return Ok(key.to_string());
    }
    std::env::var(&cfg.api_key_env_var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| BackendError::MissingApiKey {
            env_var: cfg.api_key_env_var.clone(),
        })
}

/// The env var only wins while the configured value is still the built-in default.
fn prefer_env(configured: &str, default: &str, env_var: &str) -> String {
    if configured == default {
        if let Some(v) = std::env::var(env_var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
        {
            return v;
        }
    }
    configured.to_string()
}

fn backoff_delay(attempt: usize, base_secs: f64, max_secs: f64) -> Duration {
    let exp = 2f64.powi(attempt.min(30) as i32);
    Duration::from_secs_f64((base_secs.max(0.0) * exp).min(max_secs.max(0.0)))
}

fn classify_transport(task: LlmTask, err: &reqwest::Error) -> BackendError {
    if err.is_timeout() {
        BackendError::Timeout { task }
    } else {
        BackendError::Transport {
            task,
            message: err.to_string(),
        }
    }
}

fn classify_status(task: LlmTask, status: u16, body: &str, model: &str) -> BackendError {
    let detail = clip_for_log(body.trim(), 200);
    if status == 429 {
        return BackendError::RateLimited {
            task,
            message: detail,
        };
    }
    if body.contains("valid model ID") {
        return BackendError::InvalidModelId {
            task,
            model: model.to_string(),
        };
    }
    if status >= 500 {
        return BackendError::Server {
            task,
            status,
            message: detail,
        };
    }
    let desc = match status {
        400 => "Bad request (400): check request parameters".to_string(),
        401 => format!("Unauthorized (401): API key invalid or expired, check {DEFAULT_API_KEY_ENV_VAR}"),
        403 => "Forbidden (403): no access to this model".to_string(),
        404 => format!("Not found (404): model does not exist, check {MODEL_ENV_VAR}"),
        422 => "Unprocessable entity (422): malformed request".to_string(),
        other => format!("HTTP {other} error"),
    };
    BackendError::Client {
        task,
        status,
        message: format!("{desc}. Detail: {detail}"),
    }
}

/// Text of a chat message: plain string content, text parts, or the `reasoning` field.
fn extract_message_content(message: &Value) -> String {
    let content = match message.get("content") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter(|p| p.get("type").and_then(Value::as_str).unwrap_or("text") == "text")
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect::<String>(),
        _ => String::new(),
    };
    if !content.is_empty() {
        return content;
    }
    message
        .get("reasoning")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
