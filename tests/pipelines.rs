use std::collections::BTreeMap;

use chunkwise::models::{BackendError, LlmTask, TextGenerator};
use chunkwise::pipeline::{
    ChunkWiseGenerationPipeline, ChunkWiseRephrasePipeline, GenerationConfig, PipelineConfig,
    PlanRequest, PromptLanguage, TraceWriter,
};
use chunkwise::plan::{GenerationPlan, SectionSpec};
use chunkwise::quality::FidelityVerifier;

/// Replays canned outputs in order and records every call.
struct ScriptedGenerator {
    outputs: Vec<String>,
    calls: Vec<(LlmTask, String)>,
}

impl ScriptedGenerator {
    fn new(outputs: &[&str]) -> Self {
        Self {
            outputs: outputs.iter().rev().map(|s| s.to_string()).collect(),
            calls: Vec::new(),
        }
    }

    fn tasks(&self) -> Vec<LlmTask> {
        self.calls.iter().map(|(t, _)| *t).collect()
    }

    fn prompt(&self, idx: usize) -> &str {
        &self.calls[idx].1
    }
}

impl TextGenerator for ScriptedGenerator {
    fn generate(&mut self, task: LlmTask, prompt: &str) -> Result<String, BackendError> {
        self.calls.push((task, prompt.to_string()));
        self.outputs.pop().ok_or(BackendError::EmptyResponse { task })
    }
}

fn manual_plan() -> GenerationPlan {
    GenerationPlan {
        topic: "Chunk-wise generation".into(),
        objective: "teach".into(),
        audience: "ML engineers".into(),
        tone: "neutral technical".into(),
        target_total_length: 500,
        narrative_voice: "third-person".into(),
        do_not_include: vec!["fiction".into()],
        terminology_preferences: BTreeMap::from([(
            "global anchor".to_string(),
            "global anchor".to_string(),
        )]),
        sections: vec![
            SectionSpec {
                title: "Plan".into(),
                key_points: vec!["global anchor sets scope".into()],
                required_entities: vec!["global anchor".into()],
                constraints: vec!["no marketing".into()],
                target_length: 120,
            },
            SectionSpec {
                title: "State".into(),
                key_points: vec!["state table tracks entities".into()],
                required_entities: vec!["state table".into()],
                constraints: vec!["no repetition".into()],
                target_length: 120,
            },
        ],
    }
}

fn generation_config(prefix_window_tokens: usize) -> GenerationConfig {
    GenerationConfig {
        prefix_window_tokens,
        ..GenerationConfig::default()
    }
}

const SECTION_ONE: &str = "The global anchor sets scope and keeps constraints explicit.";
const SECTION_TWO: &str = "The state table tracks entities and marks covered points.";

#[test]
fn manual_plan_runs_sections_then_consistency_pass() {
    let joined = format!("{SECTION_ONE} {SECTION_TWO}");
    let mut model = ScriptedGenerator::new(&[SECTION_ONE, SECTION_TWO, &joined]);
    let result = ChunkWiseGenerationPipeline::new(&mut model, generation_config(20))
        .run_with_plan(manual_plan())
        .expect("generation");

    assert_eq!(
        model.tasks(),
        vec![
            LlmTask::SectionGeneration,
            LlmTask::SectionGeneration,
            LlmTask::ConsistencyPass
        ]
    );
    assert_eq!(result.section_outputs.len(), 2);
    assert!(result.final_state.remaining_key_points.is_empty());
    assert!(result.report.consistency_pass_applied);
    assert!(!result.report.consistency_pass_used_fallback);
    assert!(result.report.entity_missing.is_empty());
    assert!(result.report.coverage_missing.is_empty());
    assert_eq!(result.final_text, joined);
}

#[test]
fn auto_plan_is_generated_before_sections() {
    let plan_json = serde_json::json!({
        "topic": "Chunk-wise generation",
        "objective": "teach",
        "audience": "ML engineers",
        "tone": "neutral",
        "target_total_length": 300,
        "terminology_preferences": {"state table": "state table"},
        "sections": [
            {
                "title": "Intro",
                "key_points": ["global anchor sets scope"],
                "required_entities": ["global anchor"],
                "constraints": [],
                "target_length": 120
            },
            {
                "title": "State",
                "key_points": ["state table tracks entities"],
                "required_entities": ["state table"],
                "constraints": [],
                "target_length": 120
            }
        ]
    })
    .to_string();
    let one = "A global anchor sets scope for long generation.";
    let two = "The state table tracks entities and remaining points.";
    let joined = format!("{one} {two}");
    let mut model = ScriptedGenerator::new(&[&plan_json, one, two, &joined]);

    let result = ChunkWiseGenerationPipeline::new(&mut model, generation_config(16))
        .run_auto(&PlanRequest {
            topic: "Chunk-wise generation".into(),
            objective: "teach".into(),
            target_tokens: 300,
            audience: "ML engineers".into(),
            tone: "neutral".into(),
        })
        .expect("generation");

    assert_eq!(
        model.tasks(),
        vec![
            LlmTask::PlanGeneration,
            LlmTask::SectionGeneration,
            LlmTask::SectionGeneration,
            LlmTask::ConsistencyPass
        ]
    );
    assert_eq!(result.plan.sections[0].title, "Intro");
    assert_eq!(result.plan.narrative_voice, "third-person");
    assert_eq!(
        result.final_state.terminology_map.get("state table").map(String::as_str),
        Some("state table")
    );
    assert!(model.prompt(0).contains("Topic: Chunk-wise generation"));
}

#[test]
fn rolling_prefix_only_carries_the_recent_window() {
    let long = "t0 t1 t2 t3 t4 t5 t6 t7";
    let joined = format!("{long} state table tracks entities");
    let mut model =
        ScriptedGenerator::new(&[long, long, "state table tracks entities", &joined]);
    let result = ChunkWiseGenerationPipeline::new(&mut model, generation_config(4))
        .run_with_plan(manual_plan())
        .expect("generation");

    let second_section_prompt = model.prompt(2);
    assert!(second_section_prompt.contains("t4 t5 t6 t7"));
    assert!(!second_section_prompt.contains("t0 t1"));
    // Section one never mentioned its entity, so its best candidate is kept with warnings.
    assert_eq!(result.section_outputs[0].attempts, 2);
    assert!(result
        .report
        .section_warnings
        .iter()
        .any(|w| w.contains("Missing required entity: 'global anchor'")));
    assert_eq!(result.report.entity_missing.len(), 1);
    assert!(result.report.has_critical_issues());
}

#[test]
fn off_topic_consistency_edit_is_reverted() {
    let mut model = ScriptedGenerator::new(&[
        SECTION_ONE,
        SECTION_TWO,
        "This recipe discusses tomatoes and basil unrelated to generation.",
    ]);
    let result = ChunkWiseGenerationPipeline::new(&mut model, generation_config(20))
        .run_with_plan(manual_plan())
        .expect("generation");

    assert!(result.report.consistency_pass_applied);
    assert!(result.report.consistency_pass_used_fallback);
    assert!(result.final_text.contains("global anchor"));
    assert!(result.final_text.contains("state table"));
    assert!(result.report.numeric_fact_issues.is_empty());
}

#[test]
fn chinese_prompts_are_used_when_configured() {
    let joined = format!("{SECTION_ONE} {SECTION_TWO}");
    let mut model = ScriptedGenerator::new(&[SECTION_ONE, SECTION_TWO, &joined]);
    let config = GenerationConfig {
        prompt_language: PromptLanguage::Zh,
        ..generation_config(20)
    };
    ChunkWiseGenerationPipeline::new(&mut model, config)
        .run_with_plan(manual_plan())
        .expect("generation");

    assert!(model.prompt(0).contains("你正在生成一篇长文中的一个章节。"));
    assert!(model.prompt(2).contains("你正在对已生成长文执行轻量一致性修订。"));
}

#[test]
fn hyphenated_entity_spelling_counts_as_present() {
    let one = "The global-anchor sets scope and keeps constraints explicit.";
    let mut model = ScriptedGenerator::new(&[one, SECTION_TWO]);
    let config = GenerationConfig {
        consistency_pass_enabled: false,
        ..generation_config(20)
    };
    let result = ChunkWiseGenerationPipeline::new(&mut model, config)
        .run_with_plan(manual_plan())
        .expect("generation");

    assert_eq!(result.section_outputs[0].attempts, 1);
    assert!(result.report.entity_missing.is_empty());
    assert!(!result.report.consistency_pass_applied);
    assert_eq!(model.calls.len(), 2);
}

#[test]
fn trace_dir_receives_prompts_outputs_and_state() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let trace = TraceWriter::new(tmp.path().join("_trace"), true).expect("trace");
    let mut model = ScriptedGenerator::new(&[SECTION_ONE, SECTION_TWO]);
    let config = GenerationConfig {
        consistency_pass_enabled: false,
        ..generation_config(20)
    };
    ChunkWiseGenerationPipeline::new(&mut model, config)
        .with_trace(trace)
        .run_with_plan(manual_plan())
        .expect("generation");

    let names: Vec<String> = std::fs::read_dir(tmp.path().join("_trace"))
        .expect("read trace dir")
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    assert!(names.iter().any(|n| n.ends_with(".state.json")));
    assert!(names.iter().any(|n| n.contains("prompt")));
    assert!(names.iter().any(|n| n.contains("output")));
}

#[test]
fn rephrase_end_to_end_stitches_chunks_in_order() {
    let mut model = ScriptedGenerator::new(&["R0 R1 R2 R3", "R4 R5 R6 R7"]);
    let config = PipelineConfig {
        chunk_size: 4,
        ..PipelineConfig::default()
    };
    let result = ChunkWiseRephrasePipeline::new(&mut model, config)
        .run("t0 t1 t2 t3 t4 t5 t6 t7", "")
        .expect("rephrase");

    assert_eq!(result.text, "R0 R1 R2 R3 R4 R5 R6 R7");
    assert_eq!(result.chunks.len(), 2);
    assert_eq!(result.chunks[1].source, "t4 t5 t6 t7");
    assert!(model.prompt(1).contains("R0 R1 R2 R3"));
    assert!(model.tasks().iter().all(|t| *t == LlmTask::RewriteChunk));
}

struct AcceptsOnly(&'static str);

impl FidelityVerifier for AcceptsOnly {
    fn score(&self, _source: &str, rewritten: &str) -> f64 {
        if rewritten == self.0 {
            1.0
        } else {
            0.0
        }
    }

    fn issues(&self, _source: &str, rewritten: &str) -> Vec<String> {
        if rewritten == self.0 {
            Vec::new()
        } else {
            vec!["content changed".to_string()]
        }
    }
}

#[test]
fn rephrase_retries_until_a_rewrite_is_accepted() {
    let mut model = ScriptedGenerator::new(&["bad", "good"]);
    let config = PipelineConfig {
        chunk_size: 16,
        ..PipelineConfig::default()
    };
    let result = ChunkWiseRephrasePipeline::new(&mut model, config)
        .with_verifier(AcceptsOnly("good"))
        .run("some source text", "")
        .expect("rephrase");

    assert_eq!(result.text, "good");
    assert_eq!(result.chunks[0].attempts, 2);
    assert!(result.report.section_warnings.is_empty());
    assert!(model.prompt(1).contains("content changed"));
}
