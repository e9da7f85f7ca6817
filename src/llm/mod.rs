//! Utilities for talking to language models: request/token rate limiting,
//! token counting, and extractive summarization.

pub mod rate_limiter;
pub mod summarizer;
pub mod token_counter;

pub use rate_limiter::{RateLimitError, RateLimiter};
pub use summarizer::{ExtractiveSummarizer, Summarizer, Summary};
pub use token_counter::{HeuristicCounter, TokenCounter};
