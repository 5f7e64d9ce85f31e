//! Deterministic tokenizer shared by indexing and querying.
//!
//! Terms are runs of characters whose lowercase form is an ASCII letter or
//! digit; everything else separates terms, so `café` yields `caf`. Tokens
//! shorter than `min_token_len` characters and stopwords are dropped. There
//! is no stemming. Every token keeps the byte range it occupies in the
//! original text so the query engine can cut snippets around it.
//!
//! # Example
//!
//! ```rust
//! use research_library_core::tokenize::{Tokenizer, TokenizerConfig};
//!
//! let tokenizer = Tokenizer::new(&TokenizerConfig::default());
//! assert_eq!(tokenizer.terms("The Quantum-Computing era"), ["quantum", "computing", "era"]);
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Stopwords dropped by the default tokenizer.
pub const DEFAULT_STOPWORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "in", "on", "at", "to", "for", "of", "and",
    "or", "it",
];

/// Shortest token (in characters) kept by the default tokenizer.
pub const DEFAULT_MIN_TOKEN_LEN: usize = 2;

/// Tokenizer settings. Persisted with index snapshots: a snapshot built
/// with different settings cannot be reused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenizerConfig {
    pub min_token_len: usize,
    pub stopwords: Vec<String>,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            min_token_len: DEFAULT_MIN_TOKEN_LEN,
            stopwords: DEFAULT_STOPWORDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl TokenizerConfig {
    /// Lowercased, sorted, deduplicated form used for comparisons.
    pub fn normalized(&self) -> Self {
        let mut stopwords: Vec<String> = self.stopwords.iter().map(|s| s.to_lowercase()).collect();
        stopwords.sort();
        stopwords.dedup();
        Self {
            min_token_len: self.min_token_len,
            stopwords,
        }
    }
}

/// A term occurrence in a text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub term: String,
    /// Byte offset of the first character in the source text.
    pub start: usize,
    /// Byte offset one past the last character.
    pub end: usize,
}

#[derive(Debug, Clone)]
pub struct Tokenizer {
    config: TokenizerConfig,
    stopwords: HashSet<String>,
}

impl Tokenizer {
    pub fn new(config: &TokenizerConfig) -> Self {
        let config = config.normalized();
        let stopwords = config.stopwords.iter().cloned().collect();
        Self { config, stopwords }
    }

    pub fn config(&self) -> &TokenizerConfig {
        &self.config
    }

    /// All kept tokens of `text`, in order of appearance.
    pub fn tokens(&self, text: &str) -> Vec<Token> {
        let mut out = Vec::new();
        let mut start: Option<usize> = None;
        for (i, ch) in text.char_indices() {
            if is_term_char(ch) {
                if start.is_none() {
                    start = Some(i);
                }
            } else if let Some(s) = start.take() {
                self.push_token(text, s, i, &mut out);
            }
        }
        if let Some(s) = start {
            self.push_token(text, s, text.len(), &mut out);
        }
        out
    }

    /// Terms of `text` without offsets.
    pub fn terms(&self, text: &str) -> Vec<String> {
        self.tokens(text).into_iter().map(|t| t.term).collect()
    }

    fn push_token(&self, text: &str, start: usize, end: usize, out: &mut Vec<Token>) {
        let term = text[start..end].to_lowercase();
        if term.chars().count() < self.config.min_token_len || self.stopwords.contains(&term) {
            return;
        }
        out.push(Token { term, start, end });
    }
}

/// A character belongs to a term when its lowercase form is ASCII
/// alphanumeric. `\u{212A}` (Kelvin sign) lowercases to `k` and counts.
fn is_term_char(ch: char) -> bool {
    ch.to_lowercase().all(|c| c.is_ascii_alphanumeric())
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new(&TokenizerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowercase_and_split() {
        let t = Tokenizer::default();
        assert_eq!(
            t.terms("Rust's borrow-checker, v2.0!"),
            ["rust", "borrow", "checker", "v2"]
        );
    }

    #[test]
    fn test_stopwords_and_short_tokens_dropped() {
        let t = Tokenizer::default();
        assert_eq!(t.terms("the weather today is sunny"), ["weather", "today", "sunny"]);
        assert!(t.terms("a I x 7").is_empty());
    }

    #[test]
    fn test_offsets_point_into_original() {
        let t = Tokenizer::default();
        let text = "Intro: QUANTUM bits";
        let tokens = t.tokens(text);
        assert_eq!(tokens[1].term, "quantum");
        assert_eq!(&text[tokens[1].start..tokens[1].end], "QUANTUM");
    }

    #[test]
    fn test_non_ascii_letters_separate_terms() {
        let t = Tokenizer::default();
        assert_eq!(t.terms("Café naïve Über"), ["caf", "na", "ve", "ber"]);
        assert_eq!(t.terms("日本語 text"), ["text"]);
    }

    #[test]
    fn test_offsets_around_multibyte_chars() {
        let t = Tokenizer::default();
        let text = "── Über café ──";
        let tokens = t.tokens(text);
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].term, "ber");
        assert_eq!(&text[tokens[0].start..tokens[0].end], "ber");
        assert_eq!(&text[tokens[1].start..tokens[1].end], "caf");
    }

    #[test]
    fn test_kelvin_sign_lowercases_into_term() {
        let t = Tokenizer::default();
        let text = "5\u{212A} run";
        let tokens = t.tokens(text);
        assert_eq!(tokens[0].term, "5k");
        assert_eq!(&text[tokens[0].start..tokens[0].end], "5\u{212A}");
    }

    #[test]
    fn test_custom_config() {
        let t = Tokenizer::new(&TokenizerConfig {
            min_token_len: 1,
            stopwords: vec!["Rust".into()],
        });
        assert_eq!(t.terms("rust a b"), ["a", "b"]);
    }

    #[test]
    fn test_normalized_config_is_order_insensitive() {
        let a = TokenizerConfig {
            min_token_len: 2,
            stopwords: vec!["b".into(), "A".into()],
        };
        let b = TokenizerConfig {
            min_token_len: 2,
            stopwords: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(a.normalized(), b.normalized());
    }
}
