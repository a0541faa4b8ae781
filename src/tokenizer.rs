/// Splits text into the units used for length budgets, windows and overlap matching.
pub trait Tokenizer {
    fn encode(&self, text: &str) -> Vec<String>;
    fn decode(&self, tokens: &[String]) -> String;

    fn count(&self, text: &str) -> usize {
        self.encode(text).len()
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct WhitespaceTokenizer;

impl Tokenizer for WhitespaceTokenizer {
    fn encode(&self, text: &str) -> Vec<String> {
        text.split_whitespace().map(str::to_string).collect()
    }

    fn decode(&self, tokens: &[String]) -> String {
        tokens.join(" ")
    }

    fn count(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}

#[must_use]
pub fn take_last_tokens(text: &str, tokenizer: &dyn Tokenizer, max_tokens: usize) -> String {
    if max_tokens == 0 {
        return String::new();
    }
    let tokens = tokenizer.encode(text);
    let start = tokens.len().saturating_sub(max_tokens);
    tokenizer.decode(&tokens[start..])
}

#[must_use]
pub fn take_first_tokens(text: &str, tokenizer: &dyn Tokenizer, max_tokens: usize) -> String {
    let tokens = tokenizer.encode(text);
    let end = tokens.len().min(max_tokens);
    tokenizer.decode(&tokens[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_roundtrip_collapses_runs() {
        let tok = WhitespaceTokenizer;
        let tokens = tok.encode("  a\tb \n c  ");
        assert_eq!(tokens, vec!["a", "b", "c"]);
        assert_eq!(tok.decode(&tokens), "a b c");
    }

    #[test]
    fn take_last_keeps_tail() {
        let tok = WhitespaceTokenizer;
        assert_eq!(take_last_tokens("t0 t1 t2 t3 t4", &tok, 2), "t3 t4");
        assert_eq!(take_last_tokens("t0 t1", &tok, 8), "t0 t1");
        assert_eq!(take_last_tokens("t0 t1", &tok, 0), "");
    }

    #[test]
    fn take_first_keeps_head() {
        let tok = WhitespaceTokenizer;
        assert_eq!(take_first_tokens("t0 t1 t2 t3", &tok, 3), "t0 t1 t2");
        assert_eq!(take_first_tokens("", &tok, 3), "");
    }
}
