use crate::tokenizer::Tokenizer;

/// Joins rewritten chunks, dropping wording a chunk repeats from the end of the text so far.
///
/// For each chunk the largest `k <= max_overlap_tokens` is taken such that the last `k` merged
/// tokens equal the chunk's first `k` tokens; only the remainder is appended.
#[must_use]
pub fn stitch_rewritten_chunks(
    chunks: &[String],
    tokenizer: &dyn Tokenizer,
    max_overlap_tokens: usize,
) -> String {
    match chunks {
        [] => return String::new(),
        [only] => return only.clone(),
        _ => {}
    }

    let mut merged: Vec<String> = Vec::new();
    for chunk in chunks {
        let tokens = tokenizer.encode(chunk);
        let k = boundary_overlap(&merged, &tokens, max_overlap_tokens);
        merged.extend(tokens.into_iter().skip(k));
    }
    tokenizer.decode(&merged).trim().to_string()
}

fn boundary_overlap(merged: &[String], next: &[String], max_overlap: usize) -> usize {
    let limit = merged.len().min(next.len()).min(max_overlap);
    (1..=limit)
        .rev()
        .find(|&k| merged[merged.len() - k..] == next[..k])
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::WhitespaceTokenizer;

    fn s(items: &[&str]) -> Vec<String> {
        items.iter().map(|x| x.to_string()).collect()
    }

    #[test]
    fn removes_duplicated_boundary() {
        let tok = WhitespaceTokenizer;
        let out = stitch_rewritten_chunks(&s(&["alpha beta gamma", "gamma delta epsilon"]), &tok, 4);
        assert_eq!(out, "alpha beta gamma delta epsilon");
    }

    #[test]
    fn single_chunk_is_unchanged() {
        let tok = WhitespaceTokenizer;
        let text = "  keeps\nits   own spacing ";
        assert_eq!(stitch_rewritten_chunks(&s(&[text]), &tok, 8), text);
        assert_eq!(stitch_rewritten_chunks(&[], &tok, 8), "");
    }

    #[test]
    fn prefers_longest_overlap_within_bound() {
        let tok = WhitespaceTokenizer;
        let chunks = s(&["a b a b", "a b a b c"]);
        assert_eq!(stitch_rewritten_chunks(&chunks, &tok, 4), "a b a b c");
        assert_eq!(stitch_rewritten_chunks(&chunks, &tok, 2), "a b a b a b c");
        assert_eq!(stitch_rewritten_chunks(&chunks, &tok, 0), "a b a b a b a b c");
    }

    #[test]
    fn no_overlap_appends_everything() {
        let tok = WhitespaceTokenizer;
        let out = stitch_rewritten_chunks(&s(&["R0 R1 R2 R3", "R4 R5 R6 R7"]), &tok, 96);
        assert_eq!(out, "R0 R1 R2 R3 R4 R5 R6 R7");
    }
}
