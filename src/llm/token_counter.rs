//! Token counting for prompt budgeting.
//!
//! [`HeuristicCounter`] estimates from character count; [`TokenizerCounter`]
//! counts exactly with a HuggingFace `tokenizer.json`.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokenizers::Tokenizer;

use crate::config::{expand_tilde, TokenConfig};

/// Per-message framing cost in chat-style prompts (role tag and separators).
const MESSAGE_OVERHEAD: usize = 4;
/// Tokens that prime the assistant reply.
const REPLY_PRIMING: usize = 3;

#[derive(Debug, Error)]
pub enum TokenizerError {
    #[error("failed to load tokenizer from {path}: {message}")]
    Load { path: String, message: String },
}

pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

impl<T: TokenCounter + ?Sized> TokenCounter for Box<T> {
    fn count(&self, text: &str) -> usize {
        (**self).count(text)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HeuristicCounter {
    chars_per_token: f64,
}

impl HeuristicCounter {
    pub fn new(chars_per_token: f64) -> Self {
        Self {
            chars_per_token: if chars_per_token > 0.0 { chars_per_token } else { 4.0 },
        }
    }
}

impl Default for HeuristicCounter {
    fn default() -> Self {
        Self::new(4.0)
    }
}

impl TokenCounter for HeuristicCounter {
    fn count(&self, text: &str) -> usize {
        let chars = text.chars().count();
        if chars == 0 {
            return 0;
        }
        (chars as f64 / self.chars_per_token).ceil() as usize
    }
}

pub struct TokenizerCounter {
    tokenizer: Tokenizer,
}

impl TokenizerCounter {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TokenizerError> {
        let path = path.as_ref();
        let tokenizer = Tokenizer::from_file(path).map_err(|e| TokenizerError::Load {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(Self { tokenizer })
    }
}

impl TokenCounter for TokenizerCounter {
    fn count(&self, text: &str) -> usize {
        match self.tokenizer.encode(text, false) {
            Ok(encoding) => encoding.get_ids().len(),
            Err(e) => {
                tracing::warn!(error = %e, "tokenizer failed, falling back to heuristic");
                HeuristicCounter::default().count(text)
            }
        }
    }
}

/// Build the configured counter: exact when a tokenizer file is set.
pub fn create_counter(config: &TokenConfig) -> Result<Box<dyn TokenCounter>, TokenizerError> {
    match &config.tokenizer_path {
        Some(path) => Ok(Box::new(TokenizerCounter::from_file(expand_tilde(path))?)),
        None => Ok(Box::new(HeuristicCounter::new(config.chars_per_token))),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

pub fn count_messages(counter: &dyn TokenCounter, messages: &[ChatMessage]) -> usize {
    let body: usize = messages
        .iter()
        .map(|m| MESSAGE_OVERHEAD + counter.count(&m.role) + counter.count(&m.content))
        .sum();
    body + REPLY_PRIMING
}

/// Longest word-boundary prefix of `text` that fits in `budget` tokens.
pub fn truncate_to_budget<'t>(counter: &dyn TokenCounter, text: &'t str, budget: usize) -> &'t str {
    if counter.count(text) <= budget {
        return text;
    }
    let ends = word_ends(text);

    // Binary search the last end whose prefix fits.
    let (mut lo, mut hi) = (0usize, ends.len());
    while lo < hi {
        let mid = (lo + hi + 1) / 2;
        if counter.count(&text[..ends[mid - 1]]) <= budget {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    if lo == 0 {
        ""
    } else {
        text[..ends[lo - 1]].trim_end()
    }
}

/// Byte offsets just past each whitespace-delimited word.
fn word_ends(text: &str) -> Vec<usize> {
    let mut ends = Vec::new();
    let mut in_word = false;
    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            if in_word {
                ends.push(i);
            }
            in_word = false;
        } else {
            in_word = true;
        }
    }
    if in_word {
        ends.push(text.len());
    }
    ends
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One token per whitespace word; keeps budget arithmetic obvious.
    struct WordCounter;

    impl TokenCounter for WordCounter {
        fn count(&self, text: &str) -> usize {
            text.split_whitespace().count()
        }
    }

    #[test]
    fn heuristic_rounds_up() {
        let c = HeuristicCounter::new(4.0);
        assert_eq!(c.count(""), 0);
        assert_eq!(c.count("abc"), 1);
        assert_eq!(c.count("abcd"), 1);
        assert_eq!(c.count("abcde"), 2);
    }

    #[test]
    fn heuristic_counts_chars_not_bytes() {
        let c = HeuristicCounter::new(2.0);
        assert_eq!(c.count("éééé"), 2);
    }

    #[test]
    fn messages_include_framing() {
        let msgs = vec![
            ChatMessage { role: "system".into(), content: "be brief".into() },
            ChatMessage { role: "user".into(), content: "hi there friend".into() },
        ];
        // (4 + 1 + 2) + (4 + 1 + 3) + 3
        assert_eq!(count_messages(&WordCounter, &msgs), 18);
    }

    #[test]
    fn truncate_keeps_whole_words() {
        let text = "one two three four five";
        assert_eq!(truncate_to_budget(&WordCounter, text, 3), "one two three");
        assert_eq!(truncate_to_budget(&WordCounter, text, 10), text);
        assert_eq!(truncate_to_budget(&WordCounter, text, 0), "");
    }

    #[test]
    fn truncate_with_heuristic_fits_budget() {
        let c = HeuristicCounter::new(4.0);
        let text = "alpha beta gamma delta epsilon zeta eta theta";
        let cut = truncate_to_budget(&c, text, 5);
        assert!(c.count(cut) <= 5);
        assert!(text.starts_with(cut));
        assert!(!cut.is_empty());
    }

    #[test]
    fn create_counter_defaults_to_heuristic() {
        let counter = create_counter(&TokenConfig::default()).unwrap();
        assert_eq!(counter.count("12345678"), 2);
    }

    #[test]
    fn missing_tokenizer_file_errors() {
        let config = TokenConfig {
            tokenizer_path: Some("/nonexistent/tokenizer.json".into()),
            chars_per_token: 4.0,
        };
        assert!(matches!(create_counter(&config), Err(TokenizerError::Load { .. })));
    }
}
