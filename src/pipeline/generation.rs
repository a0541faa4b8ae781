//! Section-by-section long-form generation from a plan, with a tracked knowledge state and a
//! guarded final consistency pass.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, PlanError};
use crate::models::{
    cleanup_model_text, strip_enclosing_quotes, BackendError, LlmTask, TextGenerator,
};
use crate::pipeline::config::GenerationConfig;
use crate::pipeline::context::build_rolling_prefix;
use crate::pipeline::memory::{write_state_snapshot, GenerationState};
use crate::pipeline::prompts::PromptCatalog;
use crate::pipeline::rephrase::trace_text;
use crate::pipeline::retry::{AttemptKind, RetryController, RetryOutcome, Verdict};
use crate::pipeline::trace::TraceWriter;
use crate::plan::{GenerationPlan, SectionSpec};
use crate::progress::ConsoleProgress;
use crate::quality::{
    assess_section, EntityPresenceChecker, GenerationNumericFactChecker, OutlineCoverageChecker,
    QualityReport, RepetitionAndDriftChecker,
};
use crate::terminology::TerminologyConsistencyChecker;
use crate::tokenizer::{Tokenizer, WhitespaceTokenizer};

/// Inputs for asking the backend to draft a plan.
#[derive(Clone, Debug, Default)]
pub struct PlanRequest {
    pub topic: String,
    pub objective: String,
    pub target_tokens: usize,
    pub audience: String,
    pub tone: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SectionRecord {
    pub title: String,
    pub text: String,
    pub score: f64,
    pub attempts: usize,
    /// No attempt produced output; `text` was assembled from the section's key points.
    pub fell_back: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GenerationResult {
    pub final_text: String,
    pub plan: GenerationPlan,
    pub section_outputs: Vec<SectionRecord>,
    pub final_state: GenerationState,
    pub report: QualityReport,
}

pub struct ChunkWiseGenerationPipeline<G: TextGenerator> {
    model: G,
    tokenizer: Box<dyn Tokenizer>,
    config: GenerationConfig,
    prompts: PromptCatalog,
    progress: ConsoleProgress,
    trace: TraceWriter,
}

impl<G: TextGenerator> ChunkWiseGenerationPipeline<G> {
    pub fn new(model: G, config: GenerationConfig) -> Self {
        let prompts = PromptCatalog::builtin(config.prompt_language);
        Self {
            model,
            tokenizer: Box::new(WhitespaceTokenizer),
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

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Drafts a plan with the backend, then generates from it.
    pub fn run_auto(&mut self, request: &PlanRequest) -> Result<GenerationResult, PipelineError> {
        self.config.validate()?;
        let plan = self.generate_plan(request)?;
        self.run_with_plan(plan)
    }

    /// Asks for a plan until one parses. Malformed or truncated output is retried; a plan that
    /// parses but fails validation is returned as an error immediately.
    pub fn generate_plan(&mut self, request: &PlanRequest) -> Result<GenerationPlan, PipelineError> {
        let attempts = self.config.max_plan_retries.max(1);
        let prompt = self.prompts.render_plan(
            &request.topic,
            &request.objective,
            request.target_tokens,
            &request.audience,
            &request.tone,
        );
        let mut last = PlanError::Malformed("no attempt made".to_string());
        for attempt in 1..=attempts {
            self.progress.progress("plan", attempt - 1, attempts);
            trace_text(&self.trace, "plan", 0, attempt, "prompt", &prompt);
            let raw = self.model.generate(LlmTask::PlanGeneration, &prompt)?;
            trace_text(&self.trace, "plan", 0, attempt, "output", &raw);
            match GenerationPlan::from_model_output(&raw) {
                Ok(plan) => {
                    info!(attempt, sections = plan.sections.len(), "plan accepted");
                    return Ok(plan);
                }
                Err(e) if e.is_retryable() => {
                    if matches!(e, PlanError::Truncated(_)) {
                        warn!(attempt, error = %e, "plan output truncated; a larger max_new_tokens may help");
                    } else {
                        warn!(attempt, error = %e, "plan output unparseable");
                    }
                    last = e;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(PipelineError::PlanRetriesExhausted { attempts, last })
    }

    pub fn run_with_plan(&mut self, plan: GenerationPlan) -> Result<GenerationResult, PipelineError> {
        self.config.validate()?;
        plan.validate()?;

        let Self {
            model,
            tokenizer,
            config,
            prompts,
            progress,
            trace,
        } = self;
        let tokenizer: &dyn Tokenizer = &**tokenizer;

        let scoring = config.scoring();
        let limits = config.compression_limits();
        let controller =
            RetryController::new(config.max_section_retries, config.section_quality_threshold);
        let total = plan.sections.len();
        info!(
            sections = total,
            max_attempts = controller.max_attempts(),
            topic = %plan.topic,
            "generating from plan"
        );

        let mut state = GenerationState::from_plan(&plan);
        let mut report = QualityReport::default();
        let mut accepted: Vec<String> = Vec::with_capacity(total);
        let mut records: Vec<SectionRecord> = Vec::with_capacity(total);

        for (idx, section) in plan.sections.iter().enumerate() {
            let n = idx + 1;
            let recent = build_rolling_prefix(&accepted, tokenizer, config.prefix_window_tokens);
            let previous = accepted.last().map(String::as_str);
            let unit = format!("section {n}");
            debug!(section = n, title = %section.title, "section start");

            let outcome = controller.run(
                &unit,
                |req| -> Result<String, BackendError> {
                    let prompt = match (req.kind, req.best) {
                        (AttemptKind::Repair, Some(best)) => prompts.render_section_repair(
                            &plan,
                            &state,
                            section,
                            &best.text,
                            &best.issues,
                            req.retry_index,
                        ),
                        _ if config.prompt_compression_enabled => prompts
                            .render_section_compressed(
                                &plan, &state, section, &recent, idx, &limits,
                            ),
                        _ => prompts.render_section(&plan, &state, &recent, section),
                    };
                    let attempt = req.retry_index + 1;
                    trace_text(trace, "section", n, attempt, "prompt", &prompt);
                    let raw = model.generate(LlmTask::SectionGeneration, &prompt)?;
                    trace_text(trace, "section", n, attempt, "output", &raw);
                    Ok(strip_enclosing_quotes(&cleanup_model_text(&raw)))
                },
                |candidate| {
                    Verdict::from(assess_section(section, candidate, previous, tokenizer, &scoring))
                },
            )?;

            let record = match outcome {
                RetryOutcome::Accepted { candidate, attempts }
                | RetryOutcome::Exhausted { candidate, attempts } => {
                    for issue in &candidate.issues {
                        report.warn_section(format!("Section {n} ('{}'): {issue}", section.title));
                    }
                    SectionRecord {
                        title: section.title.clone(),
                        text: candidate.text,
                        score: candidate.score,
                        attempts,
                        fell_back: false,
                    }
                }
                RetryOutcome::NoOutput { attempts } => {
                    warn!(section = n, attempts, "no output, using synthetic fallback");
                    report.warn_section(format!(
                        "Section {n} ('{}'): backend returned no text in {attempts} attempt(s); used key points as fallback text",
                        section.title
                    ));
                    SectionRecord {
                        title: section.title.clone(),
                        text: synthetic_section_text(section),
                        score: 0.0,
                        attempts,
                        fell_back: true,
                    }
                }
            };

            state = state.updated(&plan, section, &record.text);
            if trace.is_enabled() {
                let path = trace.dir().join(format!("section_{n:06}.state.json"));
                if let Err(e) = write_state_snapshot(&path, &state) {
                    warn!(error = %e, "state snapshot failed");
                }
            }
            let (covered, points) = state.progress();
            debug!(section = n, covered, points, entities = state.known_entities.len(), "state updated");
            progress.unit_finished("section", n, total, record.attempts, record.score);

            accepted.push(record.text.clone());
            records.push(record);
        }

        let draft = accepted.join("\n\n");
        report.coverage_missing = OutlineCoverageChecker.find_missing(&plan, &draft);
        report.terminology_issues = TerminologyConsistencyChecker.find_issues(&plan, &draft);
        let (repetition, drift) = RepetitionAndDriftChecker::new(
            config.repetition_similarity_threshold,
            config.drift_overlap_threshold,
            config.min_tokens_for_drift,
        )
        .find_issues(&plan, &accepted);
        report.repetition_issues = repetition;
        report.drift_issues = drift;
        report.entity_missing = EntityPresenceChecker.find_missing(&plan, &accepted);

        let mut final_text = draft.clone();
        if config.consistency_pass_enabled {
            let prompt = prompts.render_consistency(&plan, &state, &draft, &report);
            trace_text(trace, "consistency", 0, 1, "prompt", &prompt);
            report.consistency_pass_applied = true;
            match model.generate(LlmTask::ConsistencyPass, &prompt) {
                Ok(raw) => {
                    trace_text(trace, "consistency", 0, 1, "output", &raw);
                    let edited = strip_enclosing_quotes(&cleanup_model_text(&raw));
                    let decision = config.guard.apply(&draft, &edited);
                    report.consistency_pass_used_fallback = decision.used_fallback;
                    if decision.used_fallback {
                        warn!(
                            reason = decision.reason.as_deref().unwrap_or(""),
                            "consistency edit rejected, keeping draft"
                        );
                    } else {
                        info!("consistency edit accepted");
                        report.numeric_fact_issues = GenerationNumericFactChecker::new(
                            config.numeric_context_window,
                            config.numeric_similarity_tolerance,
                        )
                        .find_missing(&draft, &decision.text);
                    }
                    final_text = decision.text;
                }
                Err(e) => {
                    warn!(error = %e, "consistency pass failed, keeping draft");
                    report.consistency_pass_used_fallback = true;
                    report.warn_section(format!("Consistency pass failed: {e}; kept the draft"));
                }
            }
        }

        info!(
            sections = records.len(),
            warnings = report.warning_count(),
            "generation finished"
        );
        Ok(GenerationResult {
            final_text,
            plan,
            section_outputs: records,
            final_state: state,
            report,
        })
    }
}

/// Key points then required entities, verbatim, one sentence each.
fn synthetic_section_text(section: &SectionSpec) -> String {
    section
        .key_points
        .iter()
        .chain(&section.required_entities)
        .map(|s| {
            let s = s.trim();
            if s.ends_with(['.', '!', '?', '。']) {
                s.to_string()
            } else {
                format!("{s}.")
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scripted {
        outputs: Vec<String>,
        calls: Vec<(LlmTask, String)>,
    }

    impl Scripted {
        fn new(outputs: &[&str]) -> Self {
            Self {
                outputs: outputs.iter().rev().map(|s| s.to_string()).collect(),
                calls: Vec::new(),
            }
        }

        fn tasks(&self) -> Vec<LlmTask> {
            self.calls.iter().map(|(t, _)| *t).collect()
        }
    }

    impl TextGenerator for Scripted {
        fn generate(&mut self, task: LlmTask, prompt: &str) -> Result<String, BackendError> {
            self.calls.push((task, prompt.to_string()));
            self.outputs.pop().ok_or(BackendError::EmptyResponse { task })
        }
    }

    fn section(title: &str, point: &str, entity: &str) -> SectionSpec {
        SectionSpec {
            title: title.into(),
            key_points: vec![point.into()],
            required_entities: vec![entity.into()],
            constraints: vec![],
            target_length: 120,
        }
    }

    fn plan() -> GenerationPlan {
        GenerationPlan {
            topic: "Chunk-wise generation".into(),
            objective: "teach".into(),
            audience: "ML engineers".into(),
            tone: "neutral technical".into(),
            target_total_length: 500,
            narrative_voice: "third-person".into(),
            do_not_include: vec![],
            terminology_preferences: Default::default(),
            sections: vec![
                section("Plan", "global anchor sets scope", "global anchor"),
                section("State", "state table tracks entities", "state table"),
            ],
        }
    }

    fn no_pass() -> GenerationConfig {
        GenerationConfig {
            consistency_pass_enabled: false,
            ..GenerationConfig::default()
        }
    }

    #[test]
    fn synthetic_text_keeps_points_and_entities() {
        let s = section("Plan", "global anchor sets scope", "global anchor");
        assert_eq!(synthetic_section_text(&s), "global anchor sets scope. global anchor.");
    }

    #[test]
    fn empty_section_output_uses_synthetic_fallback() {
        let mut model = Scripted::new(&["", "", "The state table tracks entities."]);
        let out = ChunkWiseGenerationPipeline::new(&mut model, no_pass())
            .run_with_plan(plan())
            .expect("run");
        assert!(out.section_outputs[0].fell_back);
        assert!(out.final_text.contains("global anchor sets scope."));
        assert!(out.report.entity_missing.is_empty());
        assert!(out.report.section_warnings[0].contains("used key points as fallback"));
        assert!(!out.report.consistency_pass_applied);
        assert_eq!(model.calls.len(), 3);
    }

    #[test]
    fn missing_entity_triggers_repair_prompt() {
        let mut model = Scripted::new(&[
            "Scope is set early.",
            "The global anchor sets scope early.",
            "The state table tracks entities.",
        ]);
        let out = ChunkWiseGenerationPipeline::new(&mut model, no_pass())
            .run_with_plan(plan())
            .expect("run");
        assert_eq!(out.section_outputs[0].attempts, 2);
        let repair = &model.calls[1].1;
        assert!(repair.contains("ENTITY COVERAGE REQUIREMENTS:"));
        assert!(repair.contains("Scope is set early."));
        assert_eq!(out.final_state.remaining_key_points, Vec::<String>::new());
        assert_eq!(out.final_state.covered_key_points.len(), 2);
    }

    #[test]
    fn plan_generation_retries_malformed_output() {
        let good = serde_json::to_string(&plan()).expect("json");
        let mut model = Scripted::new(&["I think the plan is", &good]);
        let mut pipeline = ChunkWiseGenerationPipeline::new(&mut model, GenerationConfig::default());
        let got = pipeline
            .generate_plan(&PlanRequest {
                topic: "Chunk-wise generation".into(),
                objective: "teach".into(),
                target_tokens: 500,
                ..PlanRequest::default()
            })
            .expect("plan");
        assert_eq!(got.sections.len(), 2);
        drop(pipeline);
        assert!(model.calls[0].1.contains("Audience: general technical audience"));
    }

    #[test]
    fn plan_retries_are_bounded() {
        let mut model = Scripted::new(&["nope", "{\"topic\": \"x\", \"sections\": ["]);
        let err = ChunkWiseGenerationPipeline::new(&mut model, GenerationConfig::default())
            .generate_plan(&PlanRequest::default())
            .expect_err("must fail");
        assert!(matches!(
            err,
            PipelineError::PlanRetriesExhausted {
                attempts: 2,
                last: PlanError::Truncated(_)
            }
        ));
    }

    #[test]
    fn invalid_plan_is_fatal_without_retry() {
        let mut model = Scripted::new(&["{\"topic\": \"\", \"objective\": \"x\", \"sections\": []}", "unused"]);
        let err = ChunkWiseGenerationPipeline::new(&mut model, GenerationConfig::default())
            .generate_plan(&PlanRequest::default())
            .expect_err("must fail");
        assert!(matches!(err, PipelineError::Plan(PlanError::Invalid(_))));
        assert_eq!(model.calls.len(), 1);
    }

    /// Fails every consistency-pass call and scripts the rest.
    struct FailingConsistency(Scripted);

    impl TextGenerator for FailingConsistency {
        fn generate(&mut self, task: LlmTask, prompt: &str) -> Result<String, BackendError> {
            if task == LlmTask::ConsistencyPass {
                self.0.calls.push((task, prompt.to_string()));
                return Err(BackendError::Timeout { task });
            }
            self.0.generate(task, prompt)
        }
    }

    #[test]
    fn consistency_pass_error_keeps_the_draft() {
        let one = "The global anchor sets scope for the run.";
        let two = "The state table tracks entities across the run.";
        let mut model = FailingConsistency(Scripted::new(&[one, two]));
        let out = ChunkWiseGenerationPipeline::new(&mut model, GenerationConfig::default())
            .run_with_plan(plan())
            .expect("run");
        assert_eq!(out.final_text, format!("{one}\n\n{two}"));
        assert_eq!(out.section_outputs.len(), 2);
        assert!(out.report.consistency_pass_applied);
        assert!(out.report.consistency_pass_used_fallback);
        assert!(out
            .report
            .section_warnings
            .iter()
            .any(|w| w.starts_with("Consistency pass failed")));
        assert_eq!(
            model.0.tasks(),
            vec![
                LlmTask::SectionGeneration,
                LlmTask::SectionGeneration,
                LlmTask::ConsistencyPass
            ]
        );
    }

    #[test]
    fn quoted_section_output_is_unwrapped() {
        let mut model = Scripted::new(&[
            "\"The global anchor sets scope for the run.\"",
            "The state table tracks entities across the run.",
        ]);
        let out = ChunkWiseGenerationPipeline::new(&mut model, no_pass())
            .run_with_plan(plan())
            .expect("run");
        assert_eq!(out.section_outputs[0].text, "The global anchor sets scope for the run.");
    }

    #[test]
    fn accepted_edit_is_checked_for_dropped_numbers() {
        let mut model = Scripted::new(&[
            "In 2017 the global anchor sets scope for the run.",
            "The state table tracks entities across the run.",
            "In 2016 the global anchor sets scope for the run.\n\nThe state table tracks entities across the run.",
        ]);
        let out = ChunkWiseGenerationPipeline::new(&mut model, GenerationConfig::default())
            .run_with_plan(plan())
            .expect("run");
        assert!(out.report.consistency_pass_applied);
        assert!(!out.report.consistency_pass_used_fallback);
        assert!(out.final_text.contains("2016"));
        assert_eq!(out.report.numeric_fact_issues.len(), 1);
        assert!(out.report.numeric_fact_issues[0].starts_with("Year '2017' may be missing"));
    }
}
