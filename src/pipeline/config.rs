use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::config::{
    find_default_config, load_config, AppConfig, CONFIG_ENV_VAR, DEFAULT_CONFIG_FILENAME,
};
use crate::error::PipelineError;
use crate::models::OpenAiBackendConfig;
use crate::pipeline::context::AnchorMode;
use crate::pipeline::prompts::{
    default_prompt_files, CompressionLimits, PromptCatalog, PromptLanguage, DEFAULT_PROMPTS_DIR,
};
use crate::quality::{ConsistencyGuard, SectionScoring, VerifierKind, VerifierSettings};
use crate::segment::SegmenterConfig;
use crate::textutil::LengthMode;

/// Rephrase-mode knobs (`[rephrase]`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Tokens or characters per chunk, depending on `length_mode`.
    pub chunk_size: usize,
    pub length_mode: LengthMode,
    pub enable_line_fallback: bool,
    pub enable_char_fallback: bool,
    pub prefix_window_tokens: usize,
    pub fidelity_threshold: f64,
    pub max_retries: usize,
    pub anchor_tokens: usize,
    pub max_stitch_overlap_tokens: usize,
    pub global_anchor_mode: AnchorMode,
    pub default_style_instruction: String,
    pub prompt_language: PromptLanguage,
    pub verifier: VerifierSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1024,
            length_mode: LengthMode::Auto,
            enable_line_fallback: true,
            enable_char_fallback: true,
            prefix_window_tokens: 1024,
            fidelity_threshold: 0.85,
            max_retries: 2,
            anchor_tokens: 256,
            max_stitch_overlap_tokens: 96,
            global_anchor_mode: AnchorMode::Head,
            default_style_instruction: "neutral factual rewrite".to_string(),
            prompt_language: PromptLanguage::En,
            verifier: VerifierSettings::default(),
        }
    }
}

impl PipelineConfig {
    #[must_use]
    pub fn segmenter(&self) -> SegmenterConfig {
        SegmenterConfig {
            chunk_size: self.chunk_size,
            length_mode: self.length_mode,
            enable_line_fallback: self.enable_line_fallback,
            enable_char_fallback: self.enable_char_fallback,
        }
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        require(self.chunk_size > 0, "rephrase.chunk_size must be positive")?;
        require_unit(self.fidelity_threshold, "rephrase.fidelity_threshold")?;
        require(
            self.verifier.jaccard_weight >= 0.0 && self.verifier.numeric_weight >= 0.0,
            "rephrase.verifier weights must be non-negative",
        )?;
        require(
            self.verifier.numeric_penalty >= 0.0 && self.verifier.numeric_tolerance >= 0.0,
            "rephrase.verifier numeric penalty and tolerance must be non-negative",
        )?;
        Ok(())
    }
}

/// Generation-mode knobs (`[generation]`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub prefix_window_tokens: usize,
    pub min_section_length_ratio: f64,
    pub max_section_length_ratio: f64,
    pub repetition_similarity_threshold: f64,
    pub drift_overlap_threshold: f64,
    pub min_tokens_for_drift: usize,
    pub consistency_pass_enabled: bool,
    pub guard: ConsistencyGuard,
    pub max_section_retries: usize,
    pub section_quality_threshold: f64,
    /// Missing required entities block acceptance even above the threshold.
    pub retry_on_missing_entities: bool,
    /// Length violations are always reported; this decides whether they cost score.
    pub retry_on_length_violation: bool,
    pub entity_missing_penalty: f64,
    pub length_violation_penalty: f64,
    pub repetition_penalty: f64,
    pub max_plan_retries: usize,
    pub prompt_compression_enabled: bool,
    pub max_covered_points_summary_items: usize,
    pub max_entities_in_prompt: usize,
    pub max_timeline_entries: usize,
    pub upcoming_sections_preview: usize,
    pub numeric_similarity_tolerance: f64,
    pub numeric_context_window: usize,
    pub prompt_language: PromptLanguage,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            prefix_window_tokens: 1200,
            min_section_length_ratio: 0.8,
            max_section_length_ratio: 1.2,
            repetition_similarity_threshold: 0.92,
            drift_overlap_threshold: 0.05,
            min_tokens_for_drift: 8,
            consistency_pass_enabled: true,
            guard: ConsistencyGuard::default(),
            max_section_retries: 2,
            section_quality_threshold: 0.8,
            retry_on_missing_entities: true,
            retry_on_length_violation: false,
            entity_missing_penalty: 0.2,
            length_violation_penalty: 0.1,
            repetition_penalty: 0.15,
            max_plan_retries: 2,
            prompt_compression_enabled: true,
            max_covered_points_summary_items: 3,
            max_entities_in_prompt: 20,
            max_timeline_entries: 5,
            upcoming_sections_preview: 2,
            numeric_similarity_tolerance: 0.05,
            numeric_context_window: 30,
            prompt_language: PromptLanguage::En,
        }
    }
}

impl GenerationConfig {
    #[must_use]
    pub fn scoring(&self) -> SectionScoring {
        SectionScoring {
            min_length_ratio: self.min_section_length_ratio,
            max_length_ratio: self.max_section_length_ratio,
            repetition_threshold: self.repetition_similarity_threshold,
            entity_missing_penalty: self.entity_missing_penalty,
            length_violation_penalty: self.length_violation_penalty,
            repetition_penalty: self.repetition_penalty,
            penalize_length: self.retry_on_length_violation,
            missing_entities_critical: self.retry_on_missing_entities,
        }
    }

    #[must_use]
    pub fn compression_limits(&self) -> CompressionLimits {
        CompressionLimits {
            max_covered_points_summary_items: self.max_covered_points_summary_items,
            max_entities_in_prompt: self.max_entities_in_prompt,
            max_timeline_entries: self.max_timeline_entries,
            upcoming_sections_preview: self.upcoming_sections_preview,
        }
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        require(
            self.min_section_length_ratio >= 0.0
                && self.min_section_length_ratio <= self.max_section_length_ratio,
            "generation.min_section_length_ratio must be within [0, max_section_length_ratio]",
        )?;
        require_unit(
            self.repetition_similarity_threshold,
            "generation.repetition_similarity_threshold",
        )?;
        require_unit(self.drift_overlap_threshold, "generation.drift_overlap_threshold")?;
        require_unit(self.section_quality_threshold, "generation.section_quality_threshold")?;
        require_unit(self.guard.min_token_jaccard, "generation.guard.min_token_jaccard")?;
        require(
            self.guard.min_length_ratio >= 0.0
                && self.guard.min_length_ratio <= self.guard.max_length_ratio,
            "generation.guard.min_length_ratio must be within [0, max_length_ratio]",
        )?;
        require(
            self.entity_missing_penalty >= 0.0
                && self.length_violation_penalty >= 0.0
                && self.repetition_penalty >= 0.0,
            "generation penalties must be non-negative",
        )?;
        require(
            self.numeric_similarity_tolerance >= 0.0,
            "generation.numeric_similarity_tolerance must be non-negative",
        )?;
        Ok(())
    }
}

fn require(ok: bool, message: &str) -> Result<(), PipelineError> {
    if ok {
        Ok(())
    } else {
        Err(PipelineError::InvalidConfig(message.to_string()))
    }
}

fn require_unit(value: f64, name: &str) -> Result<(), PipelineError> {
    require(
        (0.0..=1.0).contains(&value),
        &format!("{name} must be within [0, 1], got {value}"),
    )
}

/// Command-line values that win over the config file.
#[derive(Clone, Debug, Default)]
pub struct CliOverrides {
    pub chunk_size: Option<usize>,
    pub length_mode: Option<LengthMode>,
    pub prefix_window_tokens: Option<usize>,
    pub prompt_language: Option<PromptLanguage>,
    pub fidelity_threshold: Option<f64>,
    pub max_retries: Option<usize>,
    pub verifier: Option<VerifierKind>,
    pub disable_consistency_pass: bool,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub max_new_tokens: Option<u32>,
    pub trace: Option<bool>,
}

/// Everything a run needs, resolved from defaults, the config file and the command line.
#[derive(Clone, Debug)]
pub struct RunConfig {
    pub workdir: PathBuf,
    pub config_path: PathBuf,
    pub rephrase: PipelineConfig,
    pub generation: GenerationConfig,
    pub backend: OpenAiBackendConfig,
    pub rephrase_prompts: PromptCatalog,
    pub generation_prompts: PromptCatalog,
    pub trace_dir: PathBuf,
    pub trace_prompts: bool,
    pub log_max_chars: usize,
}

impl RunConfig {
    pub fn from_paths_and_args(
        input: Option<&Path>,
        output: Option<&Path>,
        config_path: Option<PathBuf>,
        overrides: &CliOverrides,
    ) -> anyhow::Result<Self> {
        let workdir = input
            .and_then(Path::parent)
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let workdir = workdir.canonicalize().unwrap_or(workdir);

        let cfg_file = config_path
            .or_else(|| std::env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from))
            .or_else(|| find_default_config(&workdir, DEFAULT_CONFIG_FILENAME));

        let mut file_cfg = AppConfig::default();
        if let Some(p) = cfg_file.as_ref() {
            if p.exists() {
                file_cfg = load_config(p)?;
            }
        }
        let cfg_path = cfg_file.unwrap_or_else(|| workdir.join(DEFAULT_CONFIG_FILENAME));
        let config_dir = cfg_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let AppConfig {
            mut rephrase,
            mut generation,
            mut backend,
            prompts,
            trace,
        } = file_cfg;

        if let Some(n) = overrides.chunk_size {
            rephrase.chunk_size = n;
        }
        if let Some(m) = overrides.length_mode {
            rephrase.length_mode = m;
        }
        if let Some(n) = overrides.prefix_window_tokens {
            rephrase.prefix_window_tokens = n;
            generation.prefix_window_tokens = n;
        }
        if let Some(lang) = overrides.prompt_language {
            rephrase.prompt_language = lang;
            generation.prompt_language = lang;
        }
        if let Some(t) = overrides.fidelity_threshold {
            rephrase.fidelity_threshold = t;
        }
        if let Some(n) = overrides.max_retries {
            rephrase.max_retries = n;
            generation.max_section_retries = n;
        }
        if let Some(kind) = overrides.verifier {
            rephrase.verifier.kind = kind;
        }
        if overrides.disable_consistency_pass {
            generation.consistency_pass_enabled = false;
        }
        if let Some(model) = overrides.model.clone() {
            backend.model = model;
        }
        if let Some(url) = overrides.base_url.clone() {
            backend.base_url = url;
        }
        if let Some(n) = overrides.max_new_tokens {
            backend.max_new_tokens = Some(n);
        }

        rephrase.validate()?;
        generation.validate()?;

        let output_dir = output
            .and_then(Path::parent)
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| workdir.clone());
        let trace_dir = trace.trace_dir.unwrap_or_else(|| "_trace".to_string());
        let trace_dir = if Path::new(&trace_dir).is_absolute() {
            PathBuf::from(trace_dir)
        } else {
            output_dir.join(trace_dir)
        };
        let trace_prompts = overrides.trace.or(trace.trace_prompts).unwrap_or(false);
        let log_max_chars = trace.log_max_chars.unwrap_or(240);

        let rephrase_prompts = PromptCatalog::load(&config_dir, &prompts, rephrase.prompt_language)
            .context("load rephrase prompts")?;
        let generation_prompts =
            PromptCatalog::load(&config_dir, &prompts, generation.prompt_language)
                .context("load generation prompts")?;

        Ok(Self {
            workdir,
            config_path: cfg_path,
            rephrase,
            generation,
            backend,
            rephrase_prompts,
            generation_prompts,
            trace_dir,
            trace_prompts,
            log_max_chars,
        })
    }
}

/// Writes `chunkwise.toml` plus the built-in prompt templates under `prompts/` (English)
/// and `prompts/zh/`. Existing files are kept unless `force` is set.
pub fn init_default_config(dir: &Path, force: bool) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create config dir: {}", dir.display()))?;
    let cfg_path = dir.join(DEFAULT_CONFIG_FILENAME);

    let prompts_dir = dir.join(DEFAULT_PROMPTS_DIR);
    for (sub, language) in [("", PromptLanguage::En), ("zh", PromptLanguage::Zh)] {
        let target = if sub.is_empty() {
            prompts_dir.clone()
        } else {
            prompts_dir.join(sub)
        };
        std::fs::create_dir_all(&target)
            .with_context(|| format!("create prompts dir: {}", target.display()))?;
        for (fname, body) in default_prompt_files(language) {
            let p = target.join(fname);
            if p.exists() && !force {
                continue;
            }
            std::fs::write(&p, body).with_context(|| format!("write prompt: {}", p.display()))?;
        }
    }

    if cfg_path.exists() && !force {
        return Ok(cfg_path);
    }
    std::fs::write(&cfg_path, DEFAULT_CONFIG_TOML)
        .with_context(|| format!("write config: {}", cfg_path.display()))?;
    Ok(cfg_path)
}

const DEFAULT_CONFIG_TOML: &str = r#"[rephrase]
chunk_size = 1024
# "auto" measures Latin text in tokens and CJK/mixed text in characters.
length_mode = "auto"
enable_line_fallback = true
enable_char_fallback = true
prefix_window_tokens = 1024
fidelity_threshold = 0.85
max_retries = 2
anchor_tokens = 256
max_stitch_overlap_tokens = 96
global_anchor_mode = "head"
default_style_instruction = "neutral factual rewrite"
prompt_language = "en"

[rephrase.verifier]
# none | jaccard | numeric | composite
kind = "none"
jaccard_weight = 0.5
numeric_weight = 0.5
numeric_penalty = 0.25
numeric_tolerance = 0.05
context_window = 30

[generation]
prefix_window_tokens = 1200
min_section_length_ratio = 0.8
max_section_length_ratio = 1.2
repetition_similarity_threshold = 0.92
drift_overlap_threshold = 0.05
min_tokens_for_drift = 8
consistency_pass_enabled = true
max_section_retries = 2
section_quality_threshold = 0.8
retry_on_missing_entities = true
retry_on_length_violation = false
entity_missing_penalty = 0.2
length_violation_penalty = 0.1
repetition_penalty = 0.15
max_plan_retries = 2
prompt_compression_enabled = true
max_covered_points_summary_items = 3
max_entities_in_prompt = 20
max_timeline_entries = 5
upcoming_sections_preview = 2
numeric_similarity_tolerance = 0.05
numeric_context_window = 30
prompt_language = "en"

[generation.guard]
min_token_jaccard = 0.75
min_length_ratio = 0.7
max_length_ratio = 1.3
max_added_sentences = 2

[backend]
# The API key is read from this env var unless api_key is set here.
api_key_env_var = "LLM_API_KEY"
base_url = "https://openrouter.ai/api/v1"
model = "stepfun/step-3.5-flash:free"
temperature = 0.4
top_p = 0.9
# max_new_tokens = 4096
# reasoning = false
max_retries = 5
base_delay_secs = 1.0
max_delay_secs = 60.0
timeout_secs = 300

[prompts]
# Built-in templates follow prompt_language. Point a key at a file to override it.
# Chinese copies live under prompts/zh/.
# rewrite = "prompts/rewrite.txt"
# rewrite_repair = "prompts/rewrite_repair.txt"
# plan = "prompts/plan.txt"
# section = "prompts/section.txt"
# section_compressed = "prompts/section_compressed.txt"
# section_repair = "prompts/section_repair.txt"
# consistency = "prompts/consistency.txt"

[trace]
trace_dir = "_trace"
trace_prompts = false
log_max_chars = 240
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_config_round_trips_to_defaults() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let cfg_path = init_default_config(tmp.path(), false).expect("init");
        assert!(tmp.path().join("prompts/section.txt").exists());
        assert!(tmp.path().join("prompts/zh/section.txt").exists());

        let cfg = load_config(&cfg_path).expect("load");
        assert_eq!(cfg.rephrase, PipelineConfig::default());
        assert_eq!(cfg.generation, GenerationConfig::default());
        assert_eq!(cfg.backend.model, OpenAiBackendConfig::default().model);
    }

    #[test]
    fn init_config_keeps_existing_files_without_force() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let cfg_path = tmp.path().join(DEFAULT_CONFIG_FILENAME);
        std::fs::write(&cfg_path, "[rephrase]\nchunk_size = 7\n").expect("write");
        init_default_config(tmp.path(), false).expect("init");
        assert!(std::fs::read_to_string(&cfg_path).expect("read").contains("chunk_size = 7"));
        init_default_config(tmp.path(), true).expect("init");
        assert!(std::fs::read_to_string(&cfg_path).expect("read").contains("chunk_size = 1024"));
    }

    #[test]
    fn cli_overrides_win_over_file() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let cfg_path = tmp.path().join("custom.toml");
        std::fs::write(
            &cfg_path,
            "[rephrase]\nchunk_size = 300\nmax_retries = 4\n\n[generation]\nprefix_window_tokens = 50\n\n[trace]\ntrace_dir = \"dumps\"\n",
        )
        .expect("write");
        let overrides = CliOverrides {
            chunk_size: Some(64),
            prompt_language: Some(PromptLanguage::Zh),
            disable_consistency_pass: true,
            model: Some("m".into()),
            ..CliOverrides::default()
        };
        let out = tmp.path().join("out/result.txt");
        let run = RunConfig::from_paths_and_args(None, Some(&out), Some(cfg_path.clone()), &overrides)
            .expect("config");
        assert_eq!(run.config_path, cfg_path);
        assert_eq!(run.rephrase.chunk_size, 64);
        assert_eq!(run.rephrase.max_retries, 4);
        assert_eq!(run.generation.prefix_window_tokens, 50);
        assert!(!run.generation.consistency_pass_enabled);
        assert_eq!(run.backend.model, "m");
        assert_eq!(run.generation_prompts.language, PromptLanguage::Zh);
        assert_eq!(run.trace_dir, tmp.path().join("out/dumps"));
        assert!(!run.trace_prompts);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let cfg_path = tmp.path().join("bad.toml");
        std::fs::write(&cfg_path, "[rephrase]\nchunk_size = 0\n").expect("write");
        let err = RunConfig::from_paths_and_args(None, None, Some(cfg_path), &CliOverrides::default())
            .expect_err("must fail");
        assert!(err.to_string().contains("chunk_size"));

        let mut gen = GenerationConfig::default();
        gen.min_section_length_ratio = 1.5;
        assert!(matches!(gen.validate(), Err(PipelineError::InvalidConfig(_))));
        gen = GenerationConfig::default();
        gen.guard.min_token_jaccard = 1.2;
        assert!(gen.validate().is_err());
        assert!(GenerationConfig::default().validate().is_ok());
        let mut reph = PipelineConfig::default();
        reph.fidelity_threshold = -0.1;
        assert!(reph.validate().is_err());
    }

    #[test]
    fn scoring_follows_retry_switches() {
        let cfg = GenerationConfig {
            retry_on_length_violation: true,
            retry_on_missing_entities: false,
            ..GenerationConfig::default()
        };
        let s = cfg.scoring();
        assert!(s.penalize_length);
        assert!(!s.missing_entities_critical);
        assert_eq!(cfg.compression_limits(), CompressionLimits::default());
    }
}
