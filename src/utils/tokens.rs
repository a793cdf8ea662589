use std::sync::OnceLock;

use tiktoken_rs::CoreBPE;

static OPENAI_BPE: OnceLock<Option<CoreBPE>> = OnceLock::new();

/// Counts prompt tokens with the BPE used by current OpenAI chat models.
///
/// Building the encoder is expensive, so the instance is created once and
/// reused. If construction fails the byte heuristic takes over.
pub fn count_openai_tokens(text: &str) -> usize {
    let bpe = OPENAI_BPE.get_or_init(|| match tiktoken_rs::o200k_base() {
        Ok(bpe) => Some(bpe),
        Err(e) => {
            tracing::warn!("Token encoder unavailable, using approximate counts: {}", e);
            None
        }
    });
    match bpe {
        Some(bpe) => bpe.encode_with_special_tokens(text).len(),
        None => approximate_tokens(text),
    }
}

/// Rough token estimate for providers without a published tokenizer.
/// One token per four bytes of UTF-8 tracks real usage closely enough for a
/// pre-flight budget check.
pub fn approximate_tokens(text: &str) -> usize {
    text.len() / 4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_counts_zero_tokens() {
        assert_eq!(count_openai_tokens(""), 0);
        assert_eq!(approximate_tokens(""), 0);
    }

    #[test]
    fn test_approximate_tokens_uses_four_bytes_per_token() {
        assert_eq!(approximate_tokens("abcd"), 1);
        assert_eq!(approximate_tokens(&"x".repeat(4000)), 1000);
    }

    #[test]
    fn test_counts_grow_with_input_size() {
        let short = count_openai_tokens("fn main() {}");
        let long = count_openai_tokens(&"fn main() {}\n".repeat(100));
        assert!(short > 0);
        assert!(long > short);
    }
}
