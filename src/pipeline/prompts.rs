use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::PromptsSection;
use crate::pipeline::memory::GenerationState;
use crate::pipeline::retry::Candidate;
use crate::plan::{GenerationPlan, SectionSpec, DEFAULT_NARRATIVE_VOICE};
use crate::quality::QualityReport;
use crate::terminology::render_glossary;

pub const DEFAULT_PROMPTS_DIR: &str = "prompts";

pub const DEFAULT_REWRITE: &str = "rewrite.txt";
pub const DEFAULT_REWRITE_REPAIR: &str = "rewrite_repair.txt";
pub const DEFAULT_PLAN: &str = "plan.txt";
pub const DEFAULT_SECTION: &str = "section.txt";
pub const DEFAULT_SECTION_COMPRESSED: &str = "section_compressed.txt";
pub const DEFAULT_SECTION_REPAIR: &str = "section_repair.txt";
pub const DEFAULT_CONSISTENCY: &str = "consistency.txt";

const DEFAULT_AUDIENCE: &str = "general technical audience";
const DEFAULT_TONE: &str = "neutral technical";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptLanguage {
    #[default]
    En,
    Zh,
}

impl PromptLanguage {
    /// Anything other than `zh` falls back to English.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "zh" | "zh-cn" | "cn" => Self::Zh,
            _ => Self::En,
        }
    }

    fn none_text(self) -> &'static str {
        match self {
            Self::En => "(none)",
            Self::Zh => "(无)",
        }
    }
}

/// How much plan and state the compressed section prompt carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompressionLimits {
    pub max_covered_points_summary_items: usize,
    pub max_entities_in_prompt: usize,
    pub max_timeline_entries: usize,
    pub upcoming_sections_preview: usize,
}

impl Default for CompressionLimits {
    fn default() -> Self {
        Self {
            max_covered_points_summary_items: 3,
            max_entities_in_prompt: 20,
            max_timeline_entries: 5,
            upcoming_sections_preview: 2,
        }
    }
}

/// Everything one rewrite call needs.
#[derive(Clone, Debug)]
pub struct RewriteRequest<'a> {
    pub style_instruction: &'a str,
    pub global_anchor: &'a str,
    pub generated_prefix: &'a str,
    pub current_chunk: &'a str,
    pub retry_index: usize,
    pub strict_fidelity: bool,
}

#[derive(Clone, Debug)]
pub struct PromptCatalog {
    pub language: PromptLanguage,
    pub rewrite: String,
    pub rewrite_repair: String,
    pub plan: String,
    pub section: String,
    pub section_compressed: String,
    pub section_repair: String,
    pub consistency: String,
}

impl Default for PromptCatalog {
    fn default() -> Self {
        Self::builtin(PromptLanguage::En)
    }
}

impl PromptCatalog {
    #[must_use]
    pub fn builtin(language: PromptLanguage) -> Self {
        let t = templates(language);
        Self {
            language,
            rewrite: t.rewrite.to_string(),
            rewrite_repair: t.rewrite_repair.to_string(),
            plan: t.plan.to_string(),
            section: t.section.to_string(),
            section_compressed: t.section_compressed.to_string(),
            section_repair: t.section_repair.to_string(),
            consistency: t.consistency.to_string(),
        }
    }

    /// Built-in templates for `language`, replaced by any file named in `[prompts]`.
    /// Relative paths resolve against `config_dir`.
    pub fn load(
        config_dir: &Path,
        overrides: &PromptsSection,
        language: PromptLanguage,
    ) -> anyhow::Result<Self> {
        let mut catalog = Self::builtin(language);
        let slots: [(&str, &Option<String>, &mut String); 7] = [
            ("rewrite", &overrides.rewrite, &mut catalog.rewrite),
            ("rewrite_repair", &overrides.rewrite_repair, &mut catalog.rewrite_repair),
            ("plan", &overrides.plan, &mut catalog.plan),
            ("section", &overrides.section, &mut catalog.section),
            (
                "section_compressed",
                &overrides.section_compressed,
                &mut catalog.section_compressed,
            ),
            ("section_repair", &overrides.section_repair, &mut catalog.section_repair),
            ("consistency", &overrides.consistency, &mut catalog.consistency),
        ];
        for (key, path, slot) in slots {
            let Some(path) = path.as_deref().map(str::trim).filter(|p| !p.is_empty()) else {
                continue;
            };
            *slot = read_prompt(config_dir, key, path)?;
        }
        Ok(catalog)
    }

    pub fn render_rewrite(&self, req: &RewriteRequest<'_>) -> String {
        let none = self.language.none_text();
        let strict = if req.strict_fidelity {
            render_template(
                strict_rules(self.language),
                &[("attempt", &(req.retry_index + 1).to_string())],
            )
        } else {
            String::new()
        };
        render_template(
            &self.rewrite,
            &[
                ("strict_rules", &strict),
                ("style_instruction", req.style_instruction),
                ("global_anchor", or_none(req.global_anchor, none)),
                ("generated_prefix", or_none(req.generated_prefix, none)),
                ("current_chunk", req.current_chunk),
            ],
        )
    }

    /// Targeted correction of the best rewrite so far.
    pub fn render_rewrite_repair(&self, req: &RewriteRequest<'_>, best: &Candidate) -> String {
        let none = self.language.none_text();
        let issues = if best.issues.is_empty() {
            format!("- fidelity score {:.2}", best.score)
        } else {
            bullet_list(&best.issues, "- ")
        };
        render_template(
            &self.rewrite_repair,
            &[
                ("attempt", &(req.retry_index + 1).to_string()),
                ("style_instruction", req.style_instruction),
                ("issues", &issues),
                ("candidate", &best.text),
                ("current_chunk", req.current_chunk),
                ("generated_prefix", or_none(req.generated_prefix, none)),
            ],
        )
    }

    pub fn render_plan(
        &self,
        topic: &str,
        objective: &str,
        target_tokens: usize,
        audience: &str,
        tone: &str,
    ) -> String {
        let audience = non_empty_or(audience, DEFAULT_AUDIENCE);
        let tone = non_empty_or(tone, DEFAULT_TONE);
        let schema = json!({
            "topic": topic,
            "objective": objective,
            "audience": audience,
            "tone": tone,
            "target_total_length": target_tokens,
            "narrative_voice": DEFAULT_NARRATIVE_VOICE,
            "do_not_include": ["unsupported claims"],
            "terminology_preferences": {"example_term": "preferred phrasing"},
            "sections": [{
                "title": "Section title",
                "key_points": ["point A", "point B"],
                "required_entities": ["entity A"],
                "constraints": ["constraint A"],
                "target_length": 300,
            }],
        });
        render_template(
            &self.plan,
            &[
                ("topic", topic),
                ("objective", objective),
                ("audience", audience),
                ("tone", tone),
                ("target_tokens", &target_tokens.to_string()),
                ("schema", &schema.to_string()),
            ],
        )
    }

    /// Full plan and state; used when prompt compression is off.
    pub fn render_section(
        &self,
        plan: &GenerationPlan,
        state: &GenerationState,
        recent_text: &str,
        section: &SectionSpec,
    ) -> String {
        let state_blob = serde_json::to_string(state).unwrap_or_else(|_| "{}".to_string());
        let section_blob = serde_json::to_string(section).unwrap_or_else(|_| "{}".to_string());
        render_template(
            &self.section,
            &[
                ("plan", &plan.to_json().to_string()),
                ("state", &state_blob),
                ("recent_text", or_none(recent_text, self.language.none_text())),
                ("section", &section_blob),
            ],
        )
    }

    /// Current section, a few upcoming titles and a trimmed view of the state.
    pub fn render_section_compressed(
        &self,
        plan: &GenerationPlan,
        state: &GenerationState,
        section: &SectionSpec,
        recent_text: &str,
        section_index: usize,
        limits: &CompressionLimits,
    ) -> String {
        let upcoming: Vec<&str> = plan
            .sections
            .iter()
            .skip(section_index + 1)
            .take(limits.upcoming_sections_preview)
            .map(|s| s.title.as_str())
            .collect();
        let plan_context = json!({
            "topic": plan.topic,
            "objective": plan.objective,
            "audience": plan.audience,
            "tone": plan.tone,
            "current_section": section,
            "upcoming_sections": upcoming,
            "terminology_preferences": plan.terminology_preferences,
        });

        let (covered, total) = state.progress();
        let progress = format!("{covered}/{total}");
        let incremental_state = json!({
            "known_entities": last_n(&state.known_entities, limits.max_entities_in_prompt),
            "terminology_map": state.terminology_map,
            "timeline": last_n(&state.timeline, limits.max_timeline_entries),
            "progress": progress,
            "covered_summary": summarize_covered_points(
                &state.covered_key_points,
                limits.max_covered_points_summary_items,
            ),
            "remaining_points": state.remaining_key_points,
        });

        render_template(
            &self.section_compressed,
            &[
                ("plan_context", &pretty(&plan_context)),
                ("progress", &progress),
                ("state", &pretty(&incremental_state)),
                ("recent_text", or_none(recent_text, self.language.none_text())),
            ],
        )
    }

    /// Issue-driven revision of `current_text`; issues are grouped by kind with a fix strategy each.
    pub fn render_section_repair(
        &self,
        plan: &GenerationPlan,
        state: &GenerationState,
        section: &SectionSpec,
        current_text: &str,
        issues: &[String],
        retry_index: usize,
    ) -> String {
        let g = guidance(self.language);
        let none = self.language.none_text();
        let constraints = if section.constraints.is_empty() {
            String::new()
        } else {
            format!("\n{}\n{}\n", g.constraints, bullet_list(&section.constraints, "  - "))
        };
        let entities = if section.required_entities.is_empty() {
            format!("  {none}")
        } else {
            bullet_list(&section.required_entities, "  - ")
        };
        render_template(
            &self.section_repair,
            &[
                ("attempt", &(retry_index + 1).to_string()),
                ("topic", &plan.topic),
                ("current_text", current_text),
                ("title", &section.title),
                ("target_length", &section.target_length.to_string()),
                ("key_points", &bullet_list(&section.key_points, "  - ")),
                ("required_entities", &entities),
                ("constraints", &constraints),
                ("issue_guidance", &issue_guidance(self.language, issues)),
                ("covered_points", &inline_list(&state.covered_key_points)),
                ("known_entities", &inline_list(&state.known_entities)),
            ],
        )
    }

    pub fn render_consistency(
        &self,
        plan: &GenerationPlan,
        state: &GenerationState,
        draft: &str,
        report: &QualityReport,
    ) -> String {
        let findings = json!({
            "coverage_missing": report.coverage_missing,
            "terminology_issues": report.terminology_issues,
            "repetition_issues": report.repetition_issues,
            "drift_issues": report.drift_issues,
        });
        let state_blob = json!({
            "known_entities": state.known_entities,
            "terminology_map": state.terminology_map,
            "timeline": state.timeline,
            "remaining_key_points": state.remaining_key_points,
        });
        let glossary = render_glossary(&state.terminology_map, guidance(self.language).glossary);
        render_template(
            &self.consistency,
            &[
                ("plan", &plan.to_json().to_string()),
                ("state", &state_blob.to_string()),
                ("glossary", &glossary),
                ("findings", &findings.to_string()),
                ("draft", draft),
            ],
        )
    }
}

fn read_prompt(config_dir: &Path, key: &str, path: &str) -> anyhow::Result<String> {
    let mut p = PathBuf::from(path);
    if p.is_relative() {
        p = config_dir.join(&p);
    }
    if !p.exists() {
        return Err(anyhow!(
            "prompt file not found for {key}: {} (run: chunkwise --init-config)",
            p.display()
        ));
    }
    std::fs::read_to_string(&p).with_context(|| format!("read prompt: {}", p.display()))
}

pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (k, v) in vars {
        let pat = format!("{{{{{k}}}}}");
        out = out.replace(&pat, v);
    }
    out
}

/// `None yet`, every item when there are few, else a count plus the most recent ones.
#[must_use]
pub fn summarize_covered_points(covered: &[String], max_items: usize) -> String {
    if covered.is_empty() {
        return "None yet".to_string();
    }
    if covered.len() <= max_items {
        return covered.join("; ");
    }
    format!(
        "{} points total, recent: {}",
        covered.len(),
        last_n(covered, max_items).join("; ")
    )
}

/// Files written by `--init-config`, one per template.
pub fn default_prompt_files(language: PromptLanguage) -> Vec<(&'static str, &'static str)> {
    let t = templates(language);
    vec![
        (DEFAULT_REWRITE, t.rewrite),
        (DEFAULT_REWRITE_REPAIR, t.rewrite_repair),
        (DEFAULT_PLAN, t.plan),
        (DEFAULT_SECTION, t.section),
        (DEFAULT_SECTION_COMPRESSED, t.section_compressed),
        (DEFAULT_SECTION_REPAIR, t.section_repair),
        (DEFAULT_CONSISTENCY, t.consistency),
    ]
}

fn or_none<'a>(text: &'a str, none: &'a str) -> &'a str {
    if text.trim().is_empty() {
        none
    } else {
        text
    }
}

fn non_empty_or<'a>(text: &'a str, fallback: &'a str) -> &'a str {
    if text.trim().is_empty() {
        fallback
    } else {
        text
    }
}

fn last_n(items: &[String], n: usize) -> &[String] {
    &items[items.len().saturating_sub(n)..]
}

fn bullet_list(items: &[String], bullet: &str) -> String {
    items
        .iter()
        .map(|i| format!("{bullet}{i}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn inline_list(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

fn pretty(v: &serde_json::Value) -> String {
    serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum IssueGroup {
    Entity,
    Length,
    Repetition,
    Other,
}

fn classify_issue(issue: &str) -> IssueGroup {
    let lowered = issue.to_lowercase();
    if lowered.contains("entity") || lowered.contains("missing") {
        IssueGroup::Entity
    } else if lowered.contains("length") {
        IssueGroup::Length
    } else if lowered.contains("repetitive") || lowered.contains("similar") {
        IssueGroup::Repetition
    } else {
        IssueGroup::Other
    }
}

fn issue_guidance(language: PromptLanguage, issues: &[String]) -> String {
    let g = guidance(language);
    let group = |want: IssueGroup| -> Vec<String> {
        issues
            .iter()
            .filter(|i| classify_issue(i) == want)
            .cloned()
            .collect()
    };
    let entity = group(IssueGroup::Entity);
    let length = group(IssueGroup::Length);
    let repetition = group(IssueGroup::Repetition);
    let other = group(IssueGroup::Other);

    let mut blocks: Vec<String> = Vec::new();
    if !entity.is_empty() {
        blocks.push(format!(
            "{}\n{}\n\n{}",
            g.entity_header,
            bullet_list(&entity, "  - "),
            g.entity_strategies
        ));
    }
    if !length.is_empty() {
        let too_short = length.iter().any(|i| {
            let l = i.to_lowercase();
            l.contains("too short") || l.contains("below")
        });
        let strategies = if too_short { g.expand_strategies } else { g.condense_strategies };
        blocks.push(format!(
            "{}\n{}\n\n{}",
            g.length_header,
            bullet_list(&length, "  - "),
            strategies
        ));
    }
    if !repetition.is_empty() {
        blocks.push(format!(
            "{}\n{}\n\n{}",
            g.repetition_header,
            bullet_list(&repetition, "  - "),
            g.repetition_strategies
        ));
    }
    if !other.is_empty() {
        blocks.push(format!("{}\n{}", g.other_header, bullet_list(&other, "  - ")));
    }
    if blocks.is_empty() {
        return format!("  {}", language.none_text());
    }
    blocks.join("\n\n")
}

struct Templates {
    rewrite: &'static str,
    rewrite_repair: &'static str,
    plan: &'static str,
    section: &'static str,
    section_compressed: &'static str,
    section_repair: &'static str,
    consistency: &'static str,
}

fn templates(language: PromptLanguage) -> Templates {
    match language {
        PromptLanguage::En => Templates {
            rewrite: DEFAULT_REWRITE_TEXT,
            rewrite_repair: DEFAULT_REWRITE_REPAIR_TEXT,
            plan: DEFAULT_PLAN_TEXT,
            section: DEFAULT_SECTION_TEXT,
            section_compressed: DEFAULT_SECTION_COMPRESSED_TEXT,
            section_repair: DEFAULT_SECTION_REPAIR_TEXT,
            consistency: DEFAULT_CONSISTENCY_TEXT,
        },
        PromptLanguage::Zh => Templates {
            rewrite: ZH_REWRITE_TEXT,
            rewrite_repair: ZH_REWRITE_REPAIR_TEXT,
            plan: ZH_PLAN_TEXT,
            section: ZH_SECTION_TEXT,
            section_compressed: ZH_SECTION_COMPRESSED_TEXT,
            section_repair: ZH_SECTION_REPAIR_TEXT,
            consistency: ZH_CONSISTENCY_TEXT,
        },
    }
}

fn strict_rules(language: PromptLanguage) -> &'static str {
    match language {
        PromptLanguage::En => {
            "\n\nSTRICT MODE (attempt {{attempt}}): the previous rewrite drifted from the source.\nStay close to the original wording. Copy every number, date and name exactly."
        }
        PromptLanguage::Zh => {
            "\n\n严格模式（第 {{attempt}} 次尝试）：上一次改写偏离了原文。\n请贴近原文措辞，数字、日期和名称必须原样保留。"
        }
    }
}

struct Guidance {
    glossary: &'static str,
    constraints: &'static str,
    entity_header: &'static str,
    entity_strategies: &'static str,
    length_header: &'static str,
    expand_strategies: &'static str,
    condense_strategies: &'static str,
    repetition_header: &'static str,
    repetition_strategies: &'static str,
    other_header: &'static str,
}

fn guidance(language: PromptLanguage) -> &'static Guidance {
    match language {
        PromptLanguage::En => &EN_GUIDANCE,
        PromptLanguage::Zh => &ZH_GUIDANCE,
    }
}

static EN_GUIDANCE: Guidance = Guidance {
    glossary: "Terminology in effect (use the right-hand form):",
    constraints: "Constraints:",
    entity_header: "ENTITY COVERAGE REQUIREMENTS:\nThe following REQUIRED entities are missing:",
    entity_strategies: "You MUST explicitly mention each missing entity. Strategies:\n  - Add a dedicated sentence introducing the entity\n  - Integrate it naturally into existing content\n  - Ensure the entity name matches exactly (case-insensitive)",
    length_header: "LENGTH REQUIREMENTS:",
    expand_strategies: "Strategies to meet the length target:\n  - Expand on key points with more detail\n  - Add concrete examples or explanations\n  - Elaborate on implications or context",
    condense_strategies: "Strategies to meet the length target:\n  - Remove redundant sentences\n  - Condense verbose explanations\n  - Focus on core points only",
    repetition_header: "REPETITION FIXES:",
    repetition_strategies: "Strategies:\n  - Use different phrasing and vocabulary\n  - Focus on unique aspects of this section\n  - Avoid restating concepts from previous sections",
    other_header: "OTHER ISSUES TO FIX:",
};

static ZH_GUIDANCE: Guidance = Guidance {
    glossary: "当前生效术语（使用右侧写法）：",
    constraints: "约束：",
    entity_header: "实体覆盖要求：\n以下必需实体缺失：",
    entity_strategies: "必须明确提及每个缺失实体。可采用：\n  - 增加一句专门介绍该实体\n  - 自然融入现有内容\n  - 实体名称须完全一致（不区分大小写）",
    length_header: "长度要求：",
    expand_strategies: "达到目标长度的方法：\n  - 对要点展开更多细节\n  - 补充具体示例或解释\n  - 阐述影响或背景",
    condense_strategies: "达到目标长度的方法：\n  - 删除冗余句子\n  - 压缩冗长解释\n  - 只保留核心要点",
    repetition_header: "重复问题修复：",
    repetition_strategies: "方法：\n  - 使用不同的措辞和词汇\n  - 聚焦本节独有的内容\n  - 避免复述前文章节的概念",
    other_header: "其他待修复问题：",
};

pub const DEFAULT_REWRITE_TEXT: &str = r#"You are a faithful rewriter.
Rewrite the current chunk according to the style instruction.

Rules:
- Preserve every fact, name, number and date.
- Do NOT add information; do NOT summarize.
- Continue naturally from the previously rewritten text without repeating it.
- Output ONLY the rewritten chunk.{{strict_rules}}

Style instruction:
{{style_instruction}}

Document anchor (beginning of the original document, context only):
{{global_anchor}}

Previously rewritten text:
{{generated_prefix}}

Current chunk:
{{current_chunk}}"#;

pub const DEFAULT_REWRITE_REPAIR_TEXT: &str = r#"You are a faithful rewriter correcting your previous rewrite.
Revision attempt: {{attempt}}

Fix ONLY the issues listed below. Keep the parts of the previous rewrite that are already faithful.
Output ONLY the corrected chunk.

Style instruction:
{{style_instruction}}

Issues found:
{{issues}}

Previous rewrite:
{{candidate}}

Source chunk:
{{current_chunk}}

Previously rewritten text:
{{generated_prefix}}"#;

pub const DEFAULT_PLAN_TEXT: &str = r#"You are planning a long-form, section-wise generation task.

CRITICAL: Output ONLY the JSON object below. Do not output any thinking, planning, or explanation text.
Your response must START with '{' and END with '}'. No text before or after the JSON.
Do not wrap in markdown code blocks. Do not include comments. Just the raw JSON.

Build a complete generation plan with coherent sections and explicit coverage points.
Topic: {{topic}}
Objective: {{objective}}
Audience: {{audience}}
Tone: {{tone}}
Target total length (tokens): {{target_tokens}}

Output schema (return ONLY a JSON object matching this structure):
{{schema}}"#;

pub const DEFAULT_SECTION_TEXT: &str = r#"You are generating one section of a long article.
CRITICAL: Output ONLY the section body text. No thinking, no planning, no preamble.

Rules:
1) Follow the plan and the current section spec strictly.
2) Keep terminology, entities and timeline consistent with the state.
3) Avoid repeating points already covered in the recent text.
4) Output only the current section body text: no JSON, no markdown, no explanations.

Global plan:
{{plan}}

Current state:
{{state}}

Recent generated text:
{{recent_text}}

Current section spec:
{{section}}

Target length is approximate (allow +/-20%)."#;

pub const DEFAULT_SECTION_COMPRESSED_TEXT: &str = r#"You are generating one section of a long article.
CRITICAL: Output ONLY the section body text. No thinking, no planning, no preamble.

Rules:
1) Follow the current section spec strictly.
2) Keep terminology consistent with known entities.
3) Cover all remaining points listed below.
4) Do not repeat content summarized in the covered summary.
5) Maintain coherence with upcoming sections.

Plan context:
{{plan_context}}

Incremental state (progress: {{progress}}):
{{state}}

Recent generated text:
{{recent_text}}

Output only the current section body text."#;

pub const DEFAULT_SECTION_REPAIR_TEXT: &str = r#"You are REVISING a previously generated section to fix quality issues.
Article topic: {{topic}}
Revision attempt: {{attempt}}

=== CURRENT PROBLEMATIC TEXT ===
{{current_text}}

=== SECTION REQUIREMENTS ===
Title: {{title}}
Target length: ~{{target_length}} tokens (+/-20% acceptable)

Key points to cover:
{{key_points}}

Required entities (MUST include):
{{required_entities}}
{{constraints}}
=== ISSUES IDENTIFIED ===
{{issue_guidance}}

=== REVISION REQUIREMENTS ===
1) Fix ALL listed issues above
2) Maintain consistency with already-covered content:
   Covered key points: {{covered_points}}
   Known entities: {{known_entities}}
3) Preserve the original meaning and structure where possible
4) Output ONLY the revised section text: no explanations, no markdown

CRITICAL: Your output will be used directly. Do not include thinking, issue summaries,
labels like 'Revised text:', JSON or code blocks.

Output ONLY the corrected section body text."#;

pub const DEFAULT_CONSISTENCY_TEXT: &str = r#"You are running a light consistency pass on a generated long-form draft.
CRITICAL: Output ONLY the revised full text. No thinking, no planning, no preamble.

Allowed edits only:
1) fix terminology consistency
2) improve transitions between sections
3) add 1-2 short sentences for missing key points
Do not perform major rewrites or change the structure.

Plan:
{{plan}}

State:
{{state}}

{{glossary}}
Quality findings:
{{findings}}

Draft text:
{{draft}}

Output only the revised full text."#;

pub const ZH_REWRITE_TEXT: &str = r#"你是一名忠实改写助手。
请按照风格要求改写当前分块。

规则：
- 保留所有事实、名称、数字和日期。
- 不得添加信息，不得概括。
- 与已改写内容自然衔接，不要重复。
- 只输出改写后的分块。{{strict_rules}}

风格要求：
{{style_instruction}}

文档锚点（原文开头，仅供参考）：
{{global_anchor}}

已改写内容：
{{generated_prefix}}

当前分块：
{{current_chunk}}"#;

pub const ZH_REWRITE_REPAIR_TEXT: &str = r#"你是一名忠实改写助手，正在修正上一次的改写。
修订次数：{{attempt}}

只修复下列问题，已忠实于原文的部分保持不变。
只输出修正后的分块。

风格要求：
{{style_instruction}}

发现的问题：
{{issues}}

上一次改写：
{{candidate}}

原文分块：
{{current_chunk}}

已改写内容：
{{generated_prefix}}"#;

pub const ZH_PLAN_TEXT: &str = r#"你正在规划一个长文分节生成任务。

关键要求：只输出下面结构的 JSON 对象，不要输出任何思考、规划或解释文字。
回复必须以 '{' 开头、以 '}' 结尾，JSON 前后不得有其他文字。
不要使用 markdown 代码块，不要包含注释。

请构建完整的生成计划，章节连贯并列出明确的覆盖要点。
主题：{{topic}}
目标：{{objective}}
读者：{{audience}}
语气：{{tone}}
目标总长度（token）：{{target_tokens}}

输出结构（只返回符合该结构的 JSON 对象）：
{{schema}}"#;

pub const ZH_SECTION_TEXT: &str = r#"你正在生成一篇长文中的一个章节。
关键要求：只输出章节正文，不要思考过程、规划或开场白。

规则：
1) 严格遵循全局计划与当前章节说明。
2) 术语、实体和时间线须与当前状态保持一致。
3) 避免重复最近文本中已覆盖的要点。
4) 只输出当前章节正文：不要 JSON、不要 markdown、不要解释。

全局计划：
{{plan}}

当前状态：
{{state}}

最近生成的文本：
{{recent_text}}

当前章节说明：
{{section}}

目标长度为近似值（允许 ±20%）。"#;

pub const ZH_SECTION_COMPRESSED_TEXT: &str = r#"你正在生成一篇长文中的一个章节。
关键要求：只输出章节正文，不要思考过程、规划或开场白。

规则：
1) 严格遵循当前章节说明。
2) 术语与已知实体保持一致。
3) 覆盖下方列出的全部剩余要点。
4) 不要重复已覆盖摘要中的内容。
5) 与后续章节保持连贯。

计划上下文：
{{plan_context}}

增量状态（进度：{{progress}}）：
{{state}}

最近生成的文本：
{{recent_text}}

只输出当前章节正文。"#;

pub const ZH_SECTION_REPAIR_TEXT: &str = r#"你正在修订一个已生成章节以修复质量问题。
文章主题：{{topic}}
修订次数：{{attempt}}

=== 当前待修订文本 ===
{{current_text}}

=== 章节要求 ===
标题：{{title}}
目标长度：约 {{target_length}} 个 token（允许 ±20%）

需覆盖的要点：
{{key_points}}

必需实体（必须包含）：
{{required_entities}}
{{constraints}}
=== 发现的问题 ===
{{issue_guidance}}

=== 修订要求 ===
1) 修复上述全部问题
2) 与已覆盖内容保持一致：
   已覆盖要点：{{covered_points}}
   已知实体：{{known_entities}}
3) 尽量保留原有含义和结构
4) 只输出修订后的章节正文：不要解释，不要 markdown

只输出修正后的章节正文。"#;

pub const ZH_CONSISTENCY_TEXT: &str = r#"你正在对已生成长文执行轻量一致性修订。
关键要求：只输出修订后的全文，不要思考过程、规划或开场白。

只允许以下修改：
1) 修正术语一致性
2) 改善章节之间的过渡
3) 为缺失要点补充 1-2 句简短内容
不要大幅改写，不要改变结构。

计划：
{{plan}}

状态：
{{state}}

{{glossary}}
质量检查结果：
{{findings}}

草稿全文：
{{draft}}

只输出修订后的全文。"#;
