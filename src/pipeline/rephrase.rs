//! Chunk-by-chunk faithful rewriting with a fixed document anchor and a rolling prefix.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::models::{cleanup_model_text, BackendError, LlmTask, TextGenerator};
use crate::pipeline::config::PipelineConfig;
use crate::pipeline::context::{build_global_anchor, build_rolling_prefix};
use crate::pipeline::prompts::{PromptCatalog, RewriteRequest};
use crate::pipeline::retry::{AttemptKind, RetryController, RetryOutcome, Verdict};
use crate::pipeline::stitch::stitch_rewritten_chunks;
use crate::pipeline::trace::TraceWriter;
use crate::progress::ConsoleProgress;
use crate::quality::{build_verifier, FidelityVerifier, QualityReport};
use crate::segment::split_document_into_chunks;
use crate::tokenizer::{Tokenizer, WhitespaceTokenizer};

/// What happened to one source chunk.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChunkRecord {
    pub source: String,
    pub text: String,
    pub score: f64,
    pub attempts: usize,
    /// No attempt produced output, so the source chunk was kept verbatim.
    pub fell_back: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RephraseResult {
    pub text: String,
    pub chunks: Vec<ChunkRecord>,
    pub report: QualityReport,
}

pub struct ChunkWiseRephrasePipeline<G: TextGenerator> {
    model: G,
    tokenizer: Box<dyn Tokenizer>,
    verifier: Box<dyn FidelityVerifier>,
    config: PipelineConfig,
    prompts: PromptCatalog,
    progress: ConsoleProgress,
    trace: TraceWriter,
}

impl<G: TextGenerator> ChunkWiseRephrasePipeline<G> {
    /// Whitespace tokenizer, verifier from `config.verifier`, built-in prompts.
    pub fn new(model: G, config: PipelineConfig) -> Self {
        let verifier = build_verifier(&config.verifier);
        let prompts = PromptCatalog::builtin(config.prompt_language);
        Self {
            model,
            tokenizer: Box::new(WhitespaceTokenizer),
            verifier,
            config,
            prompts,
            progress: ConsoleProgress::disabled(),
            trace: TraceWriter::disabled(),
        }
    }

    pub fn with_tokenizer(mut self, tokenizer: impl Tokenizer + 'static) -> Self {
        self.tokenizer = Box::new(tokenizer);
        self
    }

    pub fn with_verifier(mut self, verifier: impl FidelityVerifier + 'static) -> Self {
        self.verifier = Box::new(verifier);
        self
    }

    pub fn with_prompts(mut self, prompts: PromptCatalog) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_progress(mut self, progress: ConsoleProgress) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_trace(mut self, trace: TraceWriter) -> Self {
        self.trace = trace;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Rewrites `text` in document order. An empty `style_instruction` uses the configured default.
    pub fn run(&mut self, text: &str, style_instruction: &str) -> Result<RephraseResult, PipelineError> {
        self.config.validate()?;
        if text.trim().is_empty() {
            return Ok(RephraseResult::default());
        }

        let Self {
            model,
            tokenizer,
            verifier,
            config,
            prompts,
            progress,
            trace,
        } = self;
        let tokenizer: &dyn Tokenizer = &**tokenizer;

        let chunks = split_document_into_chunks(text, tokenizer, &config.segmenter());
        info!(chunks = chunks.len(), chunk_size = config.chunk_size, "document segmented");
        for (i, chunk) in chunks.iter().enumerate() {
            debug!(
                chunk = i + 1,
                chars = chunk.chars().count(),
                tokens = tokenizer.count(chunk),
                "chunk"
            );
        }

        let anchor = build_global_anchor(
            text,
            tokenizer,
            config.global_anchor_mode,
            config.anchor_tokens,
        );
        let style = if style_instruction.trim().is_empty() {
            config.default_style_instruction.as_str()
        } else {
            style_instruction
        };
        let controller = RetryController::new(config.max_retries, config.fidelity_threshold);
        debug!(
            max_attempts = controller.max_attempts(),
            threshold = config.fidelity_threshold,
            "retry budget"
        );

        let mut report = QualityReport::default();
        let mut accepted: Vec<String> = Vec::with_capacity(chunks.len());
        let mut records: Vec<ChunkRecord> = Vec::with_capacity(chunks.len());

        for (idx, chunk) in chunks.iter().enumerate() {
            let n = idx + 1;
            let prefix = build_rolling_prefix(&accepted, tokenizer, config.prefix_window_tokens);
            let unit = format!("chunk {n}");

            let outcome = controller.run(
                &unit,
                |req| -> Result<String, BackendError> {
                    let request = RewriteRequest {
                        style_instruction: style,
                        global_anchor: &anchor,
                        generated_prefix: &prefix,
                        current_chunk: chunk,
                        retry_index: req.retry_index,
                        strict_fidelity: req.retry_index > 0,
                    };
                    let prompt = match (req.kind, req.best) {
                        (AttemptKind::Repair, Some(best)) => {
                            prompts.render_rewrite_repair(&request, best)
                        }
                        _ => prompts.render_rewrite(&request),
                    };
                    let attempt = req.retry_index + 1;
                    trace_text(trace, "chunk", n, attempt, "prompt", &prompt);
                    let raw = model.generate(LlmTask::RewriteChunk, &prompt)?;
                    trace_text(trace, "chunk", n, attempt, "output", &raw);
                    Ok(cleanup_model_text(&raw))
                },
                |candidate| Verdict {
                    score: verifier.score(chunk, candidate),
                    issues: verifier.issues(chunk, candidate),
                    critical: false,
                },
            )?;

            let record = match outcome {
                RetryOutcome::Accepted { candidate, attempts }
                | RetryOutcome::Exhausted { candidate, attempts } => {
                    if candidate.score < config.fidelity_threshold {
                        report.warn_section(format!(
                            "Chunk {n}: best fidelity score {:.2} is below threshold {:.2}",
                            candidate.score, config.fidelity_threshold
                        ));
                    }
                    for issue in &candidate.issues {
                        report.warn_section(format!("Chunk {n}: {issue}"));
                    }
                    ChunkRecord {
                        source: chunk.clone(),
                        text: candidate.text,
                        score: candidate.score,
                        attempts,
                        fell_back: false,
                    }
                }
                RetryOutcome::NoOutput { attempts } => {
                    warn!(chunk = n, attempts, "no output, keeping source chunk");
                    report.warn_section(format!(
                        "Chunk {n}: backend returned no text in {attempts} attempt(s); kept the source chunk"
                    ));
                    ChunkRecord {
                        source: chunk.clone(),
                        text: chunk.clone(),
                        score: 0.0,
                        attempts,
                        fell_back: true,
                    }
                }
            };

            progress.unit_finished("chunk", n, chunks.len(), record.attempts, record.score);
            accepted.push(record.text.clone());
            records.push(record);
        }

        let text = stitch_rewritten_chunks(&accepted, tokenizer, config.max_stitch_overlap_tokens);
        info!(
            chunks = records.len(),
            warnings = report.warning_count(),
            "rephrase finished"
        );
        Ok(RephraseResult {
            text,
            chunks: records,
            report,
        })
    }
}

pub(crate) fn trace_text(
    trace: &TraceWriter,
    unit: &str,
    index: usize,
    attempt: usize,
    kind: &str,
    text: &str,
) {
    if let Err(e) = trace.write_unit_text(unit, index, attempt, kind, text) {
        warn!(error = %e, "trace write failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::TokenJaccardVerifier;

    struct Scripted {
        outputs: Vec<String>,
        prompts: Vec<String>,
    }

    impl Scripted {
        fn new(outputs: &[&str]) -> Self {
            Self {
                outputs: outputs.iter().rev().map(|s| s.to_string()).collect(),
                prompts: Vec::new(),
            }
        }
    }

    impl TextGenerator for Scripted {
        fn generate(&mut self, task: LlmTask, prompt: &str) -> Result<String, BackendError> {
            assert_eq!(task, LlmTask::RewriteChunk);
            self.prompts.push(prompt.to_string());
            self.outputs
                .pop()
                .ok_or(BackendError::EmptyResponse { task })
        }
    }

    fn cfg(chunk_size: usize) -> PipelineConfig {
        PipelineConfig {
            chunk_size,
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn empty_input_makes_no_calls() {
        let mut model = Scripted::new(&[]);
        let out = ChunkWiseRephrasePipeline::new(&mut model, cfg(4))
            .run("  \n ", "")
            .expect("run");
        assert_eq!(out.text, "");
        assert!(model.prompts.is_empty());
    }

    #[test]
    fn empty_output_falls_back_to_source_chunk() {
        let mut model = Scripted::new(&["", " "]);
        let out = ChunkWiseRephrasePipeline::new(&mut model, cfg(16))
            .run("alpha beta", "")
            .expect("run");
        assert_eq!(out.text, "alpha beta");
        assert!(out.chunks[0].fell_back);
        assert_eq!(out.chunks[0].attempts, 2);
        assert_eq!(out.report.section_warnings.len(), 1);
        assert!(model.prompts[1].contains("STRICT MODE"));
    }

    #[test]
    fn low_fidelity_triggers_repair_and_keeps_best() {
        let mut model = Scripted::new(&["totally different words", "alpha beta gamma"]);
        let out = ChunkWiseRephrasePipeline::new(&mut model, cfg(16))
            .with_verifier(TokenJaccardVerifier::<WhitespaceTokenizer>::default())
            .run("alpha beta gamma", "")
            .expect("run");
        assert_eq!(out.text, "alpha beta gamma");
        assert_eq!(out.chunks[0].attempts, 2);
        assert!(model.prompts[1].contains("Previous rewrite:\ntotally different words"));
        assert!(out.report.section_warnings.is_empty());
    }

    #[test]
    fn exhausted_chunk_records_warning() {
        let mut model = Scripted::new(&["x y z", "alpha q r"]);
        let out = ChunkWiseRephrasePipeline::new(&mut model, cfg(16))
            .with_verifier(TokenJaccardVerifier::<WhitespaceTokenizer>::default())
            .run("alpha beta gamma", "keep it short")
            .expect("run");
        assert_eq!(out.text, "alpha q r");
        assert!(!out.chunks[0].fell_back);
        assert!(out.report.section_warnings[0].starts_with("Chunk 1: best fidelity score"));
        assert!(model.prompts[0].contains("keep it short"));
    }

    #[test]
    fn quoted_rewrite_keeps_its_quotes() {
        for source in ["\"Stop,\" she said.", "\"Go now.\""] {
            let fenced = format!("```\n{source}\n```");
            let mut model = Scripted::new(&[&fenced]);
            let out = ChunkWiseRephrasePipeline::new(&mut model, cfg(16))
                .run(source, "")
                .expect("run");
            assert_eq!(out.text, source);
            assert_eq!(out.chunks[0].attempts, 1);
        }
    }

    #[test]
    fn backend_error_is_terminal() {
        let mut model = Scripted::new(&[]);
        let err = ChunkWiseRephrasePipeline::new(&mut model, cfg(16))
            .run("alpha", "")
            .expect_err("must fail");
        assert!(matches!(err, PipelineError::Backend(_)));
        assert_eq!(model.prompts.len(), 1);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut model = Scripted::new(&["x"]);
        let err = ChunkWiseRephrasePipeline::new(&mut model, cfg(0))
            .run("alpha", "")
            .expect_err("must fail");
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }
}
