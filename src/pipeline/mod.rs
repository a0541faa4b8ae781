mod config;
mod context;
mod generation;
mod memory;
mod prompts;
mod rephrase;
mod retry;
mod stitch;
mod trace;

pub use config::{init_default_config, CliOverrides, GenerationConfig, PipelineConfig, RunConfig};
pub use context::{build_global_anchor, build_rolling_prefix, AnchorMode};
pub use generation::{
    ChunkWiseGenerationPipeline, GenerationResult, PlanRequest, SectionRecord,
};
pub use memory::{write_state_snapshot, GenerationState};
pub use prompts::{
    default_prompt_files, render_template, summarize_covered_points, CompressionLimits,
    PromptCatalog, PromptLanguage, RewriteRequest,
};
pub use rephrase::{ChunkRecord, ChunkWiseRephrasePipeline, RephraseResult};
pub use retry::{AttemptKind, AttemptRequest, Candidate, RetryController, RetryOutcome, Verdict};
pub use stitch::stitch_rewritten_chunks;
pub use trace::TraceWriter;
