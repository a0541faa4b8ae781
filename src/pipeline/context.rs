use serde::{Deserialize, Serialize};

use crate::tokenizer::{take_first_tokens, take_last_tokens, Tokenizer};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnchorMode {
    None,
    #[default]
    Head,
}

impl AnchorMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "off" => Some(Self::None),
            "head" => Some(Self::Head),
            _ => None,
        }
    }
}

/// First `anchor_tokens` tokens of the original source, fixed for the whole run.
#[must_use]
pub fn build_global_anchor(
    source: &str,
    tokenizer: &dyn Tokenizer,
    mode: AnchorMode,
    anchor_tokens: usize,
) -> String {
    match mode {
        AnchorMode::None => String::new(),
        AnchorMode::Head => take_first_tokens(source, tokenizer, anchor_tokens),
    }
}

/// Last `window_tokens` tokens of everything accepted so far.
#[must_use]
pub fn build_rolling_prefix(
    accepted: &[String],
    tokenizer: &dyn Tokenizer,
    window_tokens: usize,
) -> String {
    if accepted.is_empty() {
        return String::new();
    }
    take_last_tokens(&accepted.join(" "), tokenizer, window_tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::WhitespaceTokenizer;

    #[test]
    fn anchor_is_head_of_source() {
        let tok = WhitespaceTokenizer;
        assert_eq!(
            build_global_anchor("a b c d", &tok, AnchorMode::Head, 2),
            "a b"
        );
        assert_eq!(build_global_anchor("a b c d", &tok, AnchorMode::None, 2), "");
    }

    #[test]
    fn prefix_spans_unit_boundaries() {
        let tok = WhitespaceTokenizer;
        let accepted = vec!["t0 t1 t2".to_string(), "t3 t4".to_string()];
        assert_eq!(build_rolling_prefix(&accepted, &tok, 3), "t2 t3 t4");
        assert_eq!(build_rolling_prefix(&[], &tok, 3), "");
        assert_eq!(AnchorMode::parse("HEAD"), Some(AnchorMode::Head));
    }
}
