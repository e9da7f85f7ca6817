//! Document ingestion: chunk, embed under the rate limiter, store the chunks
//! as facts, and hang them off an extractive summary in the graph.

use anyhow::{ensure, Result};
use rusqlite::Connection;
use serde::Serialize;

use super::relations::link_memories;
use super::store::store_in;
use super::types::{MemoryKind, NewMemory};
use crate::config::IngestConfig;
use crate::embedding::EmbeddingProvider;
use crate::llm::summarizer::split_sentences;
use crate::llm::token_counter::truncate_to_budget;
use crate::llm::{RateLimiter, Summarizer, TokenCounter};

/// Relation label from a summary to each of its chunks.
pub const SUMMARIZES: &str = "summarizes";

#[derive(Debug, Clone)]
pub struct Document<'a> {
    /// File name or URL recorded in each chunk's metadata.
    pub source: &'a str,
    pub text: &'a str,
    pub agent_id: &'a str,
    pub category: Option<&'a str>,
}

/// Collaborators the ingest pipeline calls out to.
pub struct IngestContext<'a> {
    pub embedder: &'a dyn EmbeddingProvider,
    pub counter: &'a dyn TokenCounter,
    pub summarizer: &'a dyn Summarizer,
    pub limiter: &'a RateLimiter,
    pub config: &'a IngestConfig,
    pub dedup_threshold: f64,
}

#[derive(Debug, Serialize)]
pub struct IngestResult {
    pub chunk_ids: Vec<String>,
    pub summary_id: String,
    pub total_tokens: usize,
    /// Chunks absorbed by an existing near-duplicate.
    pub deduplicated: usize,
}

pub async fn ingest_document(
    conn: &mut Connection,
    doc: &Document<'_>,
    ctx: &IngestContext<'_>,
) -> Result<IngestResult> {
    ensure!(!doc.text.trim().is_empty(), "document is empty");

    let mut chunks = chunk_text(ctx.counter, doc.text, ctx.config.chunk_token_limit);
    if chunks.is_empty() {
        // Too short to hold a sentence; keep it whole.
        chunks.push(doc.text.trim().to_string());
    }
    let mut embedded = Vec::with_capacity(chunks.len());
    let mut total_tokens = 0;
    for chunk in &chunks {
        let tokens = ctx.counter.count(chunk);
        ctx.limiter.acquire(tokens).await?;
        embedded.push(ctx.embedder.embed(chunk)?);
        total_tokens += tokens;
    }

    let summary = ctx.summarizer.summarize(&[doc.text], ctx.config.summary_token_budget);
    let summary_text = if summary.text.is_empty() {
        truncate_to_budget(ctx.counter, &chunks[0], ctx.config.summary_token_budget).to_string()
    } else {
        summary.text
    };
    let summary_text = if summary_text.is_empty() {
        chunks[0].clone()
    } else {
        summary_text
    };
    ctx.limiter.acquire(ctx.counter.count(&summary_text)).await?;
    let summary_embedding = ctx.embedder.embed(&summary_text)?;

    // Everything is embedded; the writes go in as one unit.
    let tx = conn.transaction()?;
    let mut chunk_ids = Vec::with_capacity(chunks.len());
    let mut deduplicated = 0;
    for (index, (chunk, embedding)) in chunks.iter().zip(&embedded).enumerate() {
        let metadata = serde_json::json!({"source": doc.source, "chunk_index": index});
        let mut memory = NewMemory::new(chunk, MemoryKind::Fact, doc.agent_id).metadata(&metadata);
        if let Some(category) = doc.category {
            memory = memory.category(category);
        }
        let stored = store_in(&tx, &memory, embedding, Some(ctx.dedup_threshold))?;
        if stored.deduplicated {
            deduplicated += 1;
        }
        chunk_ids.push(stored.id);
    }

    let metadata = serde_json::json!({
        "summary": true,
        "source": doc.source,
        "chunk_count": chunks.len(),
    });
    let mut summary_memory =
        NewMemory::new(&summary_text, MemoryKind::Fact, doc.agent_id).metadata(&metadata);
    if let Some(category) = doc.category {
        summary_memory = summary_memory.category(category);
    }
    let summary_id = store_in(&tx, &summary_memory, &summary_embedding, None)?.id;

    for chunk_id in &chunk_ids {
        link_memories(&tx, &summary_id, SUMMARIZES, chunk_id, 1.0)?;
    }
    tx.commit()?;

    tracing::info!(
        source = doc.source,
        chunks = chunk_ids.len(),
        deduplicated,
        total_tokens,
        "document ingested"
    );

    Ok(IngestResult {
        chunk_ids,
        summary_id,
        total_tokens,
        deduplicated,
    })
}

/// Pack whole sentences into chunks of at most `limit` tokens.
///
/// A sentence longer than `limit` is cut on word boundaries; a single word
/// longer than `limit` becomes a chunk of its own.
pub fn chunk_text(counter: &dyn TokenCounter, text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();

    for sentence in split_sentences(text) {
        for piece in split_oversized(counter, &sentence, limit) {
            let candidate = if current.is_empty() {
                piece.clone()
            } else {
                format!("{current} {piece}")
            };
            if counter.count(&candidate) <= limit {
                current = candidate;
            } else {
                if !current.is_empty() {
                    chunks.push(std::mem::take(&mut current));
                }
                current = piece;
            }
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn split_oversized(counter: &dyn TokenCounter, sentence: &str, limit: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut rest = sentence.trim();
    while !rest.is_empty() {
        let mut head = truncate_to_budget(counter, rest, limit);
        if head.is_empty() {
            head = rest.split_whitespace().next().unwrap_or(rest);
        }
        pieces.push(head.to_string());
        rest = rest[head.len()..].trim_start();
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitConfig;
    use crate::embedding::hashing::HashingEmbeddingProvider;
    use crate::llm::{ExtractiveSummarizer, HeuristicCounter};

    struct WordCounter;

    impl TokenCounter for WordCounter {
        fn count(&self, text: &str) -> usize {
            text.split_whitespace().count()
        }
    }

    #[test]
    fn chunks_pack_whole_sentences() {
        let text = "One two three. Four five. Six seven eight nine.";
        let chunks = chunk_text(&WordCounter, text, 5);
        assert_eq!(chunks, vec!["One two three. Four five.", "Six seven eight nine."]);
    }

    #[test]
    fn oversized_sentences_are_split_on_words() {
        let chunks = chunk_text(&WordCounter, "a b c d e f g", 3);
        assert_eq!(chunks, vec!["a b c", "d e f", "g"]);
        assert!(chunks.iter().all(|c| WordCounter.count(c) <= 3));
    }

    #[test]
    fn giant_word_still_makes_progress() {
        let counter = HeuristicCounter::new(1.0);
        let chunks = chunk_text(&counter, "abcdefghij", 3);
        assert_eq!(chunks, vec!["abcdefghij"]);
    }

    #[tokio::test(start_paused = true)]
    async fn ingest_stores_chunks_summary_and_links() {
        let mut conn = crate::db::open_memory_database().unwrap();
        let embedder = HashingEmbeddingProvider::new();
        let summarizer = ExtractiveSummarizer::new(WordCounter);
        let limiter = RateLimiter::new(&RateLimitConfig::default());
        let config = IngestConfig {
            chunk_token_limit: 8,
            summary_token_budget: 6,
        };
        let ctx = IngestContext {
            embedder: &embedder,
            counter: &WordCounter,
            summarizer: &summarizer,
            limiter: &limiter,
            config: &config,
            dedup_threshold: 0.92,
        };
        let doc = Document {
            source: "notes.md",
            text: "Qdrant stores vectors. Neo4j stores graphs. Redis caches hot keys. Postgres keeps rows.",
            agent_id: "ingestor",
            category: Some("infra"),
        };

        let result = ingest_document(&mut conn, &doc, &ctx).await.unwrap();
        assert_eq!(result.chunk_ids.len(), 2);
        assert_eq!(result.total_tokens, 13);

        let links: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM memory_relations WHERE source_id = ?1 AND relation = 'summarizes'",
                [&result.summary_id],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(links, 2);

        let metadata: String = conn
            .query_row(
                "SELECT metadata FROM memories WHERE id = ?1",
                [&result.chunk_ids[1]],
                |r| r.get(0),
            )
            .unwrap();
        let metadata: serde_json::Value = serde_json::from_str(&metadata).unwrap();
        assert_eq!(metadata["source"], "notes.md");
        assert_eq!(metadata["chunk_index"], 1);

        let snapshot = limiter.snapshot().await;
        // Two chunks plus the summary.
        assert_eq!(snapshot.requests_available, 7.0);
    }

    #[tokio::test]
    async fn empty_document_is_rejected() {
        let mut conn = crate::db::open_memory_database().unwrap();
        let embedder = HashingEmbeddingProvider::new();
        let counter = HeuristicCounter::default();
        let summarizer = ExtractiveSummarizer::new(HeuristicCounter::default());
        let limiter = RateLimiter::new(&RateLimitConfig::default());
        let config = IngestConfig::default();
        let ctx = IngestContext {
            embedder: &embedder,
            counter: &counter,
            summarizer: &summarizer,
            limiter: &limiter,
            config: &config,
            dedup_threshold: 0.92,
        };
        let doc = Document {
            source: "empty.txt",
            text: "   ",
            agent_id: "a",
            category: None,
        };
        assert!(ingest_document(&mut conn, &doc, &ctx).await.is_err());
    }
}
