use anyhow::Result;
use std::sync::Arc;

use enhanced_cognee::config::CogneeConfig;
use enhanced_cognee::embedding::EmbeddingProvider;
use enhanced_cognee::llm::token_counter;
use enhanced_cognee::memory::rerank::RequesterProfile;
use enhanced_cognee::memory::search::{self, SearchConfig, SearchFilter};
use enhanced_cognee::memory::types::MemoryKind;

pub struct SearchArgs<'a> {
    pub query: &'a str,
    pub agent: Option<&'a str>,
    pub kind: Option<MemoryKind>,
    pub category: Option<&'a str>,
    pub prefer: &'a [String],
    pub limit: Option<usize>,
    pub summary: bool,
    pub json: bool,
}

/// Run a hybrid search from the terminal.
pub async fn search(config: &CogneeConfig, args: SearchArgs<'_>) -> Result<()> {
    let (conn, provider) = super::open_store(config)?;
    let counter = token_counter::create_counter(&config.tokens)?;

    let provider: Arc<dyn EmbeddingProvider> = Arc::from(provider);
    let query_text = args.query.to_string();
    let query_embedding = tokio::task::spawn_blocking(move || provider.embed(&query_text)).await??;

    let agent = args.agent.unwrap_or(config.storage.default_agent.as_str());
    let mut requester = RequesterProfile::agent(agent);
    for category in args.prefer {
        requester = requester.prefer(category.as_str());
    }

    let filter = SearchFilter {
        requester,
        kind: args.kind,
        category: args.category.map(str::to_string),
        min_confidence: config.retrieval.min_confidence,
    };
    let search_config = SearchConfig {
        max_results: args.limit.unwrap_or(config.retrieval.default_max_results),
        token_budget: config.retrieval.token_budget,
        rrf_k: config.retrieval.rrf_k,
        rerank: config.rerank.clone(),
    };

    let response = search::recall_by_query(
        &conn,
        &query_embedding,
        args.query,
        &filter,
        &search_config,
        counter.as_ref(),
    )?;

    if args.json {
        let out = if args.summary {
            serde_json::to_string_pretty(&search::to_summary(&response))?
        } else {
            serde_json::to_string_pretty(&response)?
        };
        println!("{out}");
        return Ok(());
    }

    if response.results.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    println!(
        "Showing {} of {} match(es) (token estimate: ~{})\n",
        response.results.len(),
        response.total_matched,
        response.token_estimate
    );

    if args.summary {
        for (i, result) in search::to_summary(&response).results.iter().enumerate() {
            println!("  {}. [{}] {} {:.4}  {}", i + 1, result.kind, result.id, result.score, result.preview);
        }
        return Ok(());
    }

    for (i, result) in response.results.iter().enumerate() {
        let b = &result.breakdown;
        println!(
            "  {}. [{}] {} (score: {:.4}, confidence: {:.2})",
            i + 1,
            result.kind,
            result.id,
            result.score,
            result.confidence,
        );
        println!(
            "     relevance {:.3} | recency {:.3} | personal {:.3} | confidence {:.3}",
            b.relevance, b.recency, b.personalization, b.confidence
        );
        println!("     {}", super::preview(&result.content, 120));
        println!();
    }

    Ok(())
}
