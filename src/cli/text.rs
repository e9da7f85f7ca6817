//! Text utilities: `tokens` and `summarize`.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use enhanced_cognee::config::CogneeConfig;
use enhanced_cognee::llm::token_counter::{self, ChatMessage};
use enhanced_cognee::llm::{ExtractiveSummarizer, Summarizer, TokenCounter};

pub fn tokens(
    config: &CogneeConfig,
    file: Option<&Path>,
    text: Option<&str>,
    messages: bool,
    budget: Option<usize>,
) -> Result<()> {
    let counter = token_counter::create_counter(&config.tokens)?;
    let input = super::read_input(file, text)?;

    if messages {
        let chat: Vec<ChatMessage> =
            serde_json::from_str(&input).context("expected a JSON array of {role, content}")?;
        let total = token_counter::count_messages(counter.as_ref(), &chat);
        println!("{total} tokens across {} message(s)", chat.len());
        return Ok(());
    }

    let total = counter.count(&input);
    println!("{total} tokens");
    if let Some(budget) = budget {
        let kept = token_counter::truncate_to_budget(counter.as_ref(), &input, budget);
        println!("Fits in {budget}: {}", total <= budget);
        if total > budget {
            println!("Truncated to {} tokens:", counter.count(kept));
            println!("{kept}");
        }
    }
    Ok(())
}

pub fn summarize(
    config: &CogneeConfig,
    files: &[PathBuf],
    budget: Option<usize>,
    json: bool,
) -> Result<()> {
    anyhow::ensure!(!files.is_empty(), "pass at least one file to summarize");
    let texts = files
        .iter()
        .map(|f| {
            std::fs::read_to_string(f).with_context(|| format!("failed to read {}", f.display()))
        })
        .collect::<Result<Vec<_>>>()?;
    let documents: Vec<&str> = texts.iter().map(String::as_str).collect();

    let summarizer = ExtractiveSummarizer::new(token_counter::create_counter(&config.tokens)?);
    let budget = budget.unwrap_or(config.ingest.summary_token_budget);
    let summary = summarizer.summarize(&documents, budget);

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else if summary.text.is_empty() {
        println!("Nothing to summarize.");
    } else {
        println!("{}", summary.text);
        println!();
        println!(
            "({} sentence(s), {} tokens, budget {budget})",
            summary.sentences_used, summary.token_count
        );
    }
    Ok(())
}
