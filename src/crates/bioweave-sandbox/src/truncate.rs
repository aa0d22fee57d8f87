//! Middle-token truncation for execution output.
//!
//! Console output from sandboxed code can be arbitrarily large; it is
//! truncated by removing tokens from the middle, preserving the head and
//! tail around a fixed marker. Token counts are approximated at four
//! characters per token; no tokenizer dependency is carried.

/// Marker inserted where the middle of the text was removed.
pub const TRUNCATION_MARKER: &str = "\n[... truncated ...]\n";

/// Approximate characters per token.
const CHARS_PER_TOKEN: usize = 4;

/// Approximate token count of a text.
pub fn approximate_token_count(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

fn first_chars(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn last_chars(text: &str, n: usize) -> &str {
    let total = text.chars().count();
    if n >= total {
        return text;
    }
    match text.char_indices().nth(total - n) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

/// Truncate `text` to at most `max_tokens` approximate tokens by removing
/// tokens from the middle.
///
/// - Text within budget is returned unchanged.
/// - The marker's own tokens count against the budget; when the budget
///   cannot fit the marker plus at least one token of content on either
///   side, the result is exactly the marker.
pub fn truncate_middle_tokens(text: &str, max_tokens: usize) -> String {
    if approximate_token_count(text) <= max_tokens {
        return text.to_string();
    }

    let marker_tokens = approximate_token_count(TRUNCATION_MARKER);
    let available = max_tokens.saturating_sub(marker_tokens);
    if available < 2 {
        return TRUNCATION_MARKER.to_string();
    }

    let head_tokens = available / 2;
    let tail_tokens = available - head_tokens;
    let head = first_chars(text, head_tokens * CHARS_PER_TOKEN);
    let tail = last_chars(text, tail_tokens * CHARS_PER_TOKEN);
    format!("{}{}{}", head, TRUNCATION_MARKER, tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_unchanged() {
        let text = "short output";
        assert_eq!(truncate_middle_tokens(text, 4096), text);
    }

    #[test]
    fn test_exact_budget_unchanged() {
        let text = "abcd".repeat(10); // 10 tokens
        assert_eq!(truncate_middle_tokens(&text, 10), text);
    }

    #[test]
    fn test_tiny_budget_returns_marker_only() {
        let text = "x".repeat(10_000);
        assert_eq!(truncate_middle_tokens(&text, 3), TRUNCATION_MARKER);
    }

    #[test]
    fn test_truncation_keeps_head_and_tail() {
        let head = "HEAD".repeat(100);
        let tail = "TAIL".repeat(100);
        let text = format!("{}{}{}", head, "m".repeat(100_000), tail);

        let out = truncate_middle_tokens(&text, 50);
        assert!(out.contains(TRUNCATION_MARKER));
        assert!(out.starts_with("HEAD"));
        assert!(out.ends_with("TAIL"));
        assert!(approximate_token_count(&out) <= 50);
    }

    #[test]
    fn test_multibyte_safe() {
        let text = "α".repeat(100_000);
        let out = truncate_middle_tokens(&text, 40);
        assert!(out.contains(TRUNCATION_MARKER));
        assert!(approximate_token_count(&out) <= 40);
    }
}
