//! `maintain` subcommands: confidence decay, event compaction, stale cleanup.

use anyhow::Result;

use enhanced_cognee::config::CogneeConfig;
use enhanced_cognee::llm::{token_counter, ExtractiveSummarizer};
use enhanced_cognee::memory::maintenance;

pub fn decay(config: &CogneeConfig) -> Result<()> {
    let conn = enhanced_cognee::db::open_database(config.resolved_db_path())?;

    println!("Applying confidence decay...");
    let result = maintenance::apply_decay(&conn, &config.maintenance)?;

    let total: usize = result.affected_by_kind.values().sum();
    if total == 0 {
        println!("  No memories to decay.");
        return Ok(());
    }
    println!("  Decayed {total} memories:");
    for (kind, count) in result.affected_by_kind.iter().filter(|(_, c)| **c > 0) {
        println!("    {kind}: {count}");
    }
    Ok(())
}

/// Summarize old events per agent and ISO week into one event each.
pub fn compact(config: &CogneeConfig) -> Result<()> {
    let (mut conn, provider) = super::open_store(config)?;
    let summarizer = ExtractiveSummarizer::new(token_counter::create_counter(&config.tokens)?);

    println!("Running event compaction...");
    let result = maintenance::compact_events(
        &mut conn,
        provider.as_ref(),
        &summarizer,
        &config.maintenance,
    )?;

    if result.groups_compacted == 0 {
        println!("  No event groups eligible for compaction.");
    } else {
        println!(
            "  Compacted {} memories across {} group(s):",
            result.memories_compacted, result.groups_compacted
        );
        for id in &result.summary_ids {
            println!("    summary {id}");
        }
    }
    Ok(())
}

/// Run cleanup of stale, low-confidence memories.
pub fn cleanup(config: &CogneeConfig, dry_run: bool) -> Result<()> {
    let mut conn = enhanced_cognee::db::open_database(config.resolved_db_path())?;

    let result = maintenance::cleanup_stale(&mut conn, &config.maintenance, dry_run)?;

    if result.candidates.is_empty() {
        println!("No stale memories found.");
        return Ok(());
    }

    if dry_run {
        println!(
            "Found {} candidate(s) for cleanup (dry run, nothing deleted):\n",
            result.candidates.len()
        );
        println!("{:<38} {:<12} {:<10} Preview", "ID", "Kind", "Confidence");
        println!("{}", "-".repeat(90));
        for c in &result.candidates {
            println!(
                "{:<38} {:<12} {:<10.4} {}",
                c.id, c.kind, c.confidence, c.content_preview
            );
        }
    } else {
        println!("Deleted {} stale memories.", result.deleted);
    }

    Ok(())
}

/// Decay, then compaction, then cleanup.
pub fn all(config: &CogneeConfig, dry_run: bool) -> Result<()> {
    decay(config)?;
    compact(config)?;
    cleanup(config, dry_run)
}
