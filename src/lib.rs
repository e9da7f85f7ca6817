//! Memory engine for AI agents, with LLM utilities and multi-agent coordination.
//!
//! Memories live in one SQLite file: FTS5 serves keyword search and
//! [sqlite-vec](https://github.com/asg017/sqlite-vec) serves vector search.
//! Recall fuses both with Reciprocal Rank Fusion, then re-ranks by relevance,
//! recency, personalization and confidence under a token budget.
//!
//! | Kind | Holds | Default visibility |
//! |------|-------|--------------------|
//! | `fact` | Knowledge, statements | shared |
//! | `event` | Things that happened | private |
//! | `preference` | Likes and settings of an agent or user | private |
//! | `procedure` | How-tos and workflows | shared |
//! | `entity` | People, projects, places | shared |
//!
//! # Modules
//!
//! - [`config`]: TOML configuration
//! - [`db`]: schema, migrations and health checks
//! - [`embedding`]: text-to-vector providers (ONNX or hashing)
//! - [`memory`]: store, recall, relations, forgetting, maintenance and ingestion
//! - [`llm`]: rate limiting, token counting and extractive summarization
//! - [`coordination`]: task assignment over a dependency graph, and weighted voting

pub mod config;
pub mod coordination;
pub mod db;
pub mod embedding;
pub mod llm;
pub mod memory;
