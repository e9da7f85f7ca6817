use anyhow::{Context, Result};
use std::path::Path;

use enhanced_cognee::config::CogneeConfig;
use enhanced_cognee::llm::{token_counter, ExtractiveSummarizer, RateLimiter};
use enhanced_cognee::memory::ingest::{self, Document, IngestContext};

/// Chunk, embed and store a text file, then link its summary to the chunks.
pub async fn ingest(
    config: &CogneeConfig,
    path: &Path,
    agent: Option<&str>,
    category: Option<&str>,
) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let (mut conn, provider) = super::open_store(config)?;

    let counter = token_counter::create_counter(&config.tokens)?;
    let summarizer = ExtractiveSummarizer::new(token_counter::create_counter(&config.tokens)?);
    let limiter = RateLimiter::new(&config.rate_limit);

    let source = path.display().to_string();
    let doc = Document {
        source: &source,
        text: &text,
        agent_id: agent.unwrap_or(config.storage.default_agent.as_str()),
        category,
    };
    let ctx = IngestContext {
        embedder: provider.as_ref(),
        counter: counter.as_ref(),
        summarizer: &summarizer,
        limiter: &limiter,
        config: &config.ingest,
        dedup_threshold: config.retrieval.dedup_threshold,
    };

    let result = ingest::ingest_document(&mut conn, &doc, &ctx).await?;

    println!(
        "Ingested {} as {} chunk(s), ~{} tokens ({} merged into existing memories)",
        source,
        result.chunk_ids.len(),
        result.total_tokens,
        result.deduplicated
    );
    println!("Summary: {}", result.summary_id);

    let snapshot = limiter.snapshot().await;
    tracing::debug!(
        requests = snapshot.requests_available,
        tokens = snapshot.tokens_available,
        "rate limiter after ingest"
    );
    Ok(())
}
