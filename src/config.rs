use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::models::OpenAiBackendConfig;
use crate::pipeline::{GenerationConfig, PipelineConfig};

pub const DEFAULT_CONFIG_FILENAME: &str = "chunkwise.toml";
pub const CONFIG_ENV_VAR: &str = "CHUNKWISE_CONFIG";

/// On-disk `chunkwise.toml`. Every table is optional; missing keys take the declared defaults.
#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub rephrase: PipelineConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub backend: OpenAiBackendConfig,
    #[serde(default)]
    pub prompts: PromptsSection,
    #[serde(default)]
    pub trace: TraceSection,
}

/// Template file overrides, relative to the config file directory.
#[derive(Clone, Debug, Deserialize, Default)]
pub struct PromptsSection {
    #[serde(default)]
    pub rewrite: Option<String>,
    #[serde(default)]
    pub rewrite_repair: Option<String>,
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub section_compressed: Option<String>,
    #[serde(default)]
    pub section_repair: Option<String>,
    #[serde(default)]
    pub consistency: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct TraceSection {
    /// Relative to the output file directory unless absolute.
    #[serde(default)]
    pub trace_dir: Option<String>,
    #[serde(default)]
    pub trace_prompts: Option<bool>,
    #[serde(default)]
    pub log_max_chars: Option<usize>,
}

pub fn find_file_upwards(start_dir: &Path, filename: &str, max_levels: usize) -> Option<PathBuf> {
    let mut dir = start_dir;
    for _ in 0..=max_levels {
        let candidate = dir.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }
        dir = dir.parent()?;
    }
    None
}

pub fn find_default_config(workdir: &Path, filename: &str) -> Option<PathBuf> {
    if let Ok(cwd) = std::env::current_dir() {
        if let Some(p) = find_file_upwards(&cwd, filename, 8) {
            return Some(p);
        }
    }
    if let Some(p) = find_file_upwards(workdir, filename, 8) {
        return Some(p);
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            if let Some(p) = find_file_upwards(dir, filename, 10) {
                return Some(p);
            }
        }
    }
    None
}

pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config: {}", path.display()))?;
    let cfg: AppConfig = toml::from_str(&text).context("parse config toml")?;
    Ok(cfg)
}
