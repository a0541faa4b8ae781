use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::textutil::{detect_dominant_script, LengthMode, Script};
use crate::tokenizer::Tokenizer;

static BLANK_LINE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n").expect("blank line regex"));

/// Separator placed between merged units inside one chunk.
const UNIT_SEPARATOR: &str = " ";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmenterConfig {
    pub chunk_size: usize,
    pub length_mode: LengthMode,
    pub enable_line_fallback: bool,
    pub enable_char_fallback: bool,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1024,
            length_mode: LengthMode::Auto,
            enable_line_fallback: true,
            enable_char_fallback: true,
        }
    }
}

/// The unit a span is measured in once `LengthMode::Auto` has been resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Measure {
    Token,
    Char,
}

impl Measure {
    #[must_use]
    pub fn resolve(text: &str, mode: LengthMode) -> Self {
        match mode {
            LengthMode::Token => Self::Token,
            LengthMode::Char => Self::Char,
            LengthMode::Auto => match detect_dominant_script(text) {
                Script::Latin => Self::Token,
                Script::Cjk | Script::Mixed => Self::Char,
            },
        }
    }

    fn len(self, text: &str, tokenizer: &dyn Tokenizer) -> usize {
        match self {
            Self::Token => tokenizer.count(text),
            Self::Char => text.chars().count(),
        }
    }

    fn separator_len(self) -> usize {
        match self {
            Self::Token => 0,
            Self::Char => UNIT_SEPARATOR.chars().count(),
        }
    }
}

/// Length of `text` in tokens or characters, resolving `Auto` against this span alone.
#[must_use]
pub fn measure_length(text: &str, tokenizer: &dyn Tokenizer, mode: LengthMode) -> usize {
    Measure::resolve(text, mode).len(text, tokenizer)
}

#[must_use]
pub fn split_into_structural_units(text: &str) -> Vec<String> {
    let stripped = text.trim();
    if stripped.is_empty() {
        return Vec::new();
    }
    BLANK_LINE_RE
        .split(stripped)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

#[must_use]
pub fn split_into_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

#[must_use]
pub fn split_into_char_chunks(text: &str, chunk_chars: usize) -> Vec<String> {
    let chunk_chars = chunk_chars.max(1);
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(chunk_chars)
        .map(|w| w.iter().collect::<String>())
        .filter(|w| !w.trim().is_empty())
        .collect()
}

#[must_use]
pub fn split_into_token_chunks(
    text: &str,
    tokenizer: &dyn Tokenizer,
    chunk_tokens: usize,
) -> Vec<String> {
    let chunk_tokens = chunk_tokens.max(1);
    let tokens = tokenizer.encode(text);
    tokens
        .chunks(chunk_tokens)
        .map(|w| tokenizer.decode(w))
        .collect()
}

/// Accumulates consecutive units while they fit, flushing a chunk when the next would not.
struct ChunkBuffer<'a> {
    limit: usize,
    measure: Measure,
    tokenizer: &'a dyn Tokenizer,
    parts: Vec<String>,
    used: usize,
    chunks: Vec<String>,
}

impl<'a> ChunkBuffer<'a> {
    fn new(limit: usize, measure: Measure, tokenizer: &'a dyn Tokenizer) -> Self {
        Self {
            limit,
            measure,
            tokenizer,
            parts: Vec::new(),
            used: 0,
            chunks: Vec::new(),
        }
    }

    fn len_of(&self, text: &str) -> usize {
        self.measure.len(text, self.tokenizer)
    }

    fn push(&mut self, unit: String, len: usize) {
        if !self.parts.is_empty() {
            let needed = self.used + self.measure.separator_len() + len;
            if needed > self.limit {
                self.flush();
            }
        }
        if !self.parts.is_empty() {
            self.used += self.measure.separator_len();
        }
        self.used += len;
        self.parts.push(unit);
    }

    fn flush(&mut self) {
        if self.parts.is_empty() {
            return;
        }
        self.chunks.push(self.parts.join(UNIT_SEPARATOR));
        self.parts.clear();
        self.used = 0;
    }

    /// Emits a chunk as-is, after whatever is buffered.
    fn emit(&mut self, chunk: String) {
        self.flush();
        self.chunks.push(chunk);
    }

    fn finish(mut self) -> Vec<String> {
        self.flush();
        self.chunks
    }
}

/// Splits a document into ordered chunks: paragraphs, then lines, then raw windows.
#[must_use]
pub fn split_document_into_chunks(
    text: &str,
    tokenizer: &dyn Tokenizer,
    cfg: &SegmenterConfig,
) -> Vec<String> {
    let units = split_into_structural_units(text);
    if units.is_empty() {
        return Vec::new();
    }
    let limit = cfg.chunk_size.max(1);
    let measure = Measure::resolve(text, cfg.length_mode);
    let mut buf = ChunkBuffer::new(limit, measure, tokenizer);

    for para in units {
        let len = buf.len_of(&para);
        if len <= limit {
            buf.push(para, len);
            continue;
        }
        if !cfg.enable_line_fallback {
            split_oversized(&mut buf, para, cfg.enable_char_fallback);
            continue;
        }
        for line in split_into_lines(&para) {
            let len = buf.len_of(&line);
            if len <= limit {
                buf.push(line, len);
            } else {
                split_oversized(&mut buf, line, cfg.enable_char_fallback);
            }
        }
    }
    buf.finish()
}

fn split_oversized(buf: &mut ChunkBuffer<'_>, unit: String, enable_raw_windows: bool) {
    if !enable_raw_windows {
        buf.emit(unit);
        return;
    }
    let windows = match buf.measure {
        Measure::Token => split_into_token_chunks(&unit, buf.tokenizer, buf.limit),
        Measure::Char => split_into_char_chunks(&unit, buf.limit),
    };
    for w in windows {
        buf.emit(w);
    }
}
