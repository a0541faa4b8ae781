use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static LATIN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\p{Latin}").expect("latin"));

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Script {
    Latin,
    Cjk,
    Mixed,
}

/// How chunk lengths are measured.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthMode {
    /// Tokens for Latin-dominant text, characters otherwise.
    #[default]
    Auto,
    Token,
    Char,
}

impl LengthMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "token" | "tokens" => Some(Self::Token),
            "char" | "chars" => Some(Self::Char),
            _ => None,
        }
    }
}

#[must_use]
pub fn detect_dominant_script(text: &str) -> Script {
    let mut total = 0usize;
    let mut cjk = 0usize;
    for ch in text.chars() {
        if ch.is_whitespace() {
            continue;
        }
        total += 1;
        if is_cjk(ch) {
            cjk += 1;
        }
    }
    if total == 0 {
        return Script::Mixed;
    }
    let latin = LATIN_RE.find_iter(text).count();
    let latin_ratio = latin as f64 / total as f64;
    let cjk_ratio = cjk as f64 / total as f64;
    if latin_ratio > 0.5 {
        Script::Latin
    } else if cjk_ratio > 0.5 {
        Script::Cjk
    } else {
        Script::Mixed
    }
}

pub fn is_cjk(ch: char) -> bool {
    is_han(ch) || is_jp_kana(ch) || is_hangul(ch)
}

fn is_han(ch: char) -> bool {
    let u = ch as u32;
    (0x3400..=0x4DBF).contains(&u)
        || (0x4E00..=0x9FFF).contains(&u)
        || (0xF900..=0xFAFF).contains(&u)
        || (0x20000..=0x2A6DF).contains(&u)
        || (0x2A700..=0x2EBEF).contains(&u)
}

fn is_jp_kana(ch: char) -> bool {
    let u = ch as u32;
    (0x3040..=0x309F).contains(&u)
        || (0x30A0..=0x30FF).contains(&u)
        || (0x31F0..=0x31FF).contains(&u)
}

fn is_hangul(ch: char) -> bool {
    let u = ch as u32;
    (0xAC00..=0xD7AF).contains(&u)
        || (0x1100..=0x11FF).contains(&u)
        || (0x3130..=0x318F).contains(&u)
}

/// Shortens `text` to at most `max_chars` characters for log lines.
#[must_use]
pub fn clip_for_log(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push_str("...");
    }
    out
}
