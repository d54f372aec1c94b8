//! Token estimation utilities.
//!
//! Uses a character-based heuristic: `chars_per_token` characters per token,
//! rounded down. Lengths are counted in Unicode scalar values, the same unit
//! the context renderer budgets in.

/// Default characters per token for English prose.
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 4.0;

/// Share of a model window usable for evidence; the rest is reserved for the
/// model's output and prompt scaffolding.
pub const DEFAULT_SAFETY: f64 = 0.8;

/// Character length of `text`.
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Estimate the token count for a string.
///
/// Returns 0 for empty text or a non-positive ratio.
pub fn estimate_tokens(text: &str, chars_per_token: f64) -> usize {
    if text.is_empty() || chars_per_token <= 0.0 {
        return 0;
    }
    (char_len(text) as f64 / chars_per_token) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_is_zero() {
        assert_eq!(estimate_tokens("", DEFAULT_CHARS_PER_TOKEN), 0);
    }

    #[test]
    fn four_chars_is_one_token() {
        assert_eq!(estimate_tokens("test", DEFAULT_CHARS_PER_TOKEN), 1);
    }

    #[test]
    fn partial_tokens_round_down() {
        assert_eq!(estimate_tokens("hello", DEFAULT_CHARS_PER_TOKEN), 1);
        assert_eq!(estimate_tokens("abc", DEFAULT_CHARS_PER_TOKEN), 0);
    }

    #[test]
    fn hundred_chars() {
        let text = "a".repeat(100);
        assert_eq!(estimate_tokens(&text, DEFAULT_CHARS_PER_TOKEN), 25);
        assert_eq!(estimate_tokens(&text, 2.5), 40);
    }

    #[test]
    fn counts_chars_not_bytes() {
        let text = "é".repeat(8);
        assert_eq!(text.len(), 16);
        assert_eq!(estimate_tokens(&text, DEFAULT_CHARS_PER_TOKEN), 2);
    }

    #[test]
    fn zero_ratio_is_zero() {
        assert_eq!(estimate_tokens("abcdefgh", 0.0), 0);
    }
}
