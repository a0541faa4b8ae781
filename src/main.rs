use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use clap::{CommandFactory, Parser, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use chunkwise::models::OpenAiChatModel;
use chunkwise::pipeline::{
    init_default_config, ChunkWiseGenerationPipeline, ChunkWiseRephrasePipeline, CliOverrides,
    PlanRequest, PromptLanguage, RunConfig, TraceWriter,
};
use chunkwise::plan::GenerationPlan;
use chunkwise::progress::ConsoleProgress;
use chunkwise::quality::{QualityReport, VerifierKind};
use chunkwise::textutil::LengthMode;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Rewrite an input document chunk by chunk
    Rephrase,
    /// Generate a long-form text section by section from a plan
    Generate,
}

#[derive(Parser, Debug)]
#[command(name = "chunkwise")]
#[command(about = "Chunk-wise rephrasing and plan-driven long-form generation over an LLM backend", long_about = None)]
struct Args {
    /// Generate default config + prompt files, then exit
    #[arg(long)]
    init_config: bool,

    /// Directory to write config/prompt files (default: current directory)
    #[arg(long, value_name = "DIR")]
    init_config_dir: Option<PathBuf>,

    /// Overwrite existing config/prompt files when used with --init-config
    #[arg(long)]
    force: bool,

    /// Input text file to rephrase ("-" reads stdin)
    #[arg(value_name = "FILE")]
    input: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Mode::Rephrase)]
    mode: Mode,

    /// Output text file (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Write run details (per-unit records + quality report) as JSON
    #[arg(long, value_name = "JSON")]
    report: Option<PathBuf>,

    /// Config file path (default: search for chunkwise.toml upwards, or CHUNKWISE_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Style instruction for rephrase mode (default: from config)
    #[arg(long)]
    style: Option<String>,

    /// Plan JSON for generate mode (skips plan generation)
    #[arg(long, value_name = "JSON")]
    plan: Option<PathBuf>,

    /// Topic for an auto-generated plan
    #[arg(long)]
    topic: Option<String>,

    /// Objective for an auto-generated plan
    #[arg(long)]
    objective: Option<String>,

    /// Target total length for an auto-generated plan
    #[arg(long, default_value_t = 1200)]
    target_tokens: usize,

    #[arg(long, default_value = "")]
    audience: String,

    #[arg(long, default_value = "")]
    tone: String,

    /// Chunk size for rephrase mode
    #[arg(long)]
    chunk_size: Option<usize>,

    /// auto | token | char
    #[arg(long)]
    length_mode: Option<String>,

    /// Rolling context window fed back into each prompt
    #[arg(long)]
    prefix_window_tokens: Option<usize>,

    /// Prompt template language (en, zh)
    #[arg(long)]
    prompt_language: Option<String>,

    /// Minimum fidelity score for an accepted rewrite
    #[arg(long)]
    fidelity_threshold: Option<f64>,

    /// Attempts per chunk/section
    #[arg(long)]
    max_retries: Option<usize>,

    /// none | jaccard | numeric | composite
    #[arg(long)]
    verifier: Option<String>,

    /// Skip the final consistency pass in generate mode
    #[arg(long)]
    disable_consistency_pass: bool,

    /// Backend model name (overrides config)
    #[arg(long)]
    model: Option<String>,

    /// Backend base URL (overrides config)
    #[arg(long)]
    base_url: Option<String>,

    #[arg(long)]
    max_new_tokens: Option<u32>,

    /// Write every prompt/output (and generation state) to the trace dir
    #[arg(long)]
    trace: bool,

    /// Debug-level logs
    #[arg(short, long)]
    verbose: bool,

    /// Warnings only; no progress lines
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);
    let progress = ConsoleProgress::new(!args.quiet);

    if args.init_config {
        let dir = args
            .init_config_dir
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        let cfg_path = init_default_config(&dir, args.force).context("init default config")?;
        eprintln!("Wrote config: {}", cfg_path.display());
        return Ok(());
    }

    let has_work = match args.mode {
        Mode::Rephrase => args.input.is_some(),
        Mode::Generate => args.plan.is_some() || args.topic.is_some(),
    };
    if !has_work {
        let mut cmd = Args::command();
        cmd.print_help().context("print help")?;
        eprintln!(
            "\n\nUSAGE:\n  chunkwise <input.txt> [-o out.txt]\n  chunkwise --mode generate --topic <T> --objective <O> [-o out.txt]\n  chunkwise --mode generate --plan plan.json\n\nTIPS:\n  - Default config search: chunkwise.toml (upwards), or set CHUNKWISE_CONFIG.\n  - Run with --init-config to write an editable config and prompt templates.\n"
        );
        return Ok(());
    }

    let overrides = overrides_from_args(&args)?;
    let cfg = RunConfig::from_paths_and_args(
        args.input.as_deref(),
        args.output.as_deref(),
        args.config.clone(),
        &overrides,
    )
    .context("build config")?;
    tracing::debug!(config = %cfg.config_path.display(), "config resolved");

    let trace = TraceWriter::new(cfg.trace_dir.clone(), cfg.trace_prompts).context("trace dir")?;
    if trace.is_enabled() {
        progress.info(format!("Tracing to {}", trace.dir().display()));
    }
    let model = OpenAiChatModel::new(cfg.backend.clone())
        .context("backend setup")?
        .with_log_max_chars(cfg.log_max_chars);
    progress.info(format!("Model: {}", model.model()));

    match args.mode {
        Mode::Rephrase => {
            let input = args.input.as_deref().context("missing input")?;
            let source = read_input(input)?;
            let style = args.style.clone().unwrap_or_default();
            let mut pipeline = ChunkWiseRephrasePipeline::new(model, cfg.rephrase.clone())
                .with_prompts(cfg.rephrase_prompts.clone())
                .with_progress(progress.clone())
                .with_trace(trace);
            let result = pipeline.run(&source, &style)?;
            progress.info(format!(
                "Rephrased {} chunk(s), {} warning(s)",
                result.chunks.len(),
                result.report.warning_count()
            ));
            warn_on_open_issues(&result.report);
            write_output(args.output.as_deref(), &result.text)?;
            write_report(args.report.as_deref(), &result)?;
        }
        Mode::Generate => {
            let mut pipeline = ChunkWiseGenerationPipeline::new(model, cfg.generation.clone())
                .with_prompts(cfg.generation_prompts.clone())
                .with_progress(progress.clone())
                .with_trace(trace);
            let result = match args.plan.as_deref() {
                Some(path) => {
                    let raw = std::fs::read_to_string(path)
                        .with_context(|| format!("read plan: {}", path.display()))?;
                    let plan = GenerationPlan::from_json_str(&raw)
                        .with_context(|| format!("parse plan: {}", path.display()))?;
                    pipeline.run_with_plan(plan)?
                }
                None => {
                    let request = PlanRequest {
                        topic: args.topic.clone().unwrap_or_default(),
                        objective: args
                            .objective
                            .clone()
                            .context("--objective is required with --topic")?,
                        target_tokens: args.target_tokens,
                        audience: args.audience.clone(),
                        tone: args.tone.clone(),
                    };
                    pipeline.run_auto(&request)?
                }
            };
            progress.info(format!(
                "Generated {} section(s), {} warning(s)",
                result.section_outputs.len(),
                result.report.warning_count()
            ));
            warn_on_open_issues(&result.report);
            write_output(args.output.as_deref(), &result.final_text)?;
            write_report(args.report.as_deref(), &result)?;
        }
    }
    Ok(())
}

fn warn_on_open_issues(report: &QualityReport) {
    if report.has_critical_issues() {
        tracing::warn!(
            entities_missing = report.entity_missing.len(),
            numeric_facts = report.numeric_fact_issues.len(),
            "output is missing required entities or numeric facts"
        );
    } else if report.has_issues() {
        tracing::info!("output has quality findings; write them out with --report");
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let default = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_writer(std::io::stderr)
        .init();
}

fn overrides_from_args(args: &Args) -> anyhow::Result<CliOverrides> {
    let length_mode = args
        .length_mode
        .as_deref()
        .map(|s| LengthMode::parse(s).ok_or_else(|| anyhow!("unknown --length-mode: {s}")))
        .transpose()?;
    let verifier = args
        .verifier
        .as_deref()
        .map(|s| VerifierKind::parse(s).ok_or_else(|| anyhow!("unknown --verifier: {s}")))
        .transpose()?;
    Ok(CliOverrides {
        chunk_size: args.chunk_size,
        length_mode,
        prefix_window_tokens: args.prefix_window_tokens,
        prompt_language: args.prompt_language.as_deref().map(PromptLanguage::parse),
        fidelity_threshold: args.fidelity_threshold,
        max_retries: args.max_retries,
        verifier,
        disable_consistency_pass: args.disable_consistency_pass,
        model: args.model.clone(),
        base_url: args.base_url.clone(),
        max_new_tokens: args.max_new_tokens,
        trace: args.trace.then_some(true),
    })
}

fn read_input(path: &Path) -> anyhow::Result<String> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("read stdin")?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).with_context(|| format!("read input: {}", path.display()))
}

fn write_output(path: Option<&Path>, text: &str) -> anyhow::Result<()> {
    match path {
        Some(p) => {
            if let Some(dir) = p.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("create output dir: {}", dir.display()))?;
            }
            std::fs::write(p, text).with_context(|| format!("write output: {}", p.display()))
        }
        None => {
            println!("{text}");
            Ok(())
        }
    }
}

fn write_report<T: Serialize>(path: Option<&Path>, value: &T) -> anyhow::Result<()> {
    let Some(p) = path else {
        return Ok(());
    };
    let json = serde_json::to_string_pretty(value).context("serialize report")?;
    std::fs::write(p, json).with_context(|| format!("write report: {}", p.display()))
}
