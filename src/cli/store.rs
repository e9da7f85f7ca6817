//! Write-side commands: `store`, `forget` and `relate`.

use anyhow::{Context, Result};

use enhanced_cognee::config::CogneeConfig;
use enhanced_cognee::memory::types::{MemoryKind, NewMemory, Visibility};
use enhanced_cognee::memory::{forget, relations, store};

pub struct StoreArgs<'a> {
    pub content: &'a str,
    pub kind: MemoryKind,
    pub agent: Option<&'a str>,
    pub visibility: Option<Visibility>,
    pub category: Option<&'a str>,
    pub confidence: f64,
    pub metadata: Option<&'a str>,
    pub supersedes: Option<&'a str>,
}

pub fn store(config: &CogneeConfig, args: StoreArgs<'_>) -> Result<()> {
    let (mut conn, provider) = super::open_store(config)?;

    let metadata: Option<serde_json::Value> = args
        .metadata
        .map(serde_json::from_str)
        .transpose()
        .context("--metadata must be valid JSON")?;

    let agent = args.agent.unwrap_or(config.storage.default_agent.as_str());
    let mut memory = NewMemory::new(args.content, args.kind, agent).confidence(args.confidence);
    if let Some(visibility) = args.visibility {
        memory = memory.visibility(visibility);
    }
    if let Some(category) = args.category {
        memory = memory.category(category);
    }
    if let Some(ref metadata) = metadata {
        memory = memory.metadata(metadata);
    }
    if let Some(old) = args.supersedes {
        memory = memory.supersedes(old);
    }

    let embedding = provider.embed(args.content)?;
    let result = store::store_memory(
        &mut conn,
        &memory,
        &embedding,
        config.retrieval.dedup_threshold,
    )?;

    if result.deduplicated {
        println!("Merged into existing memory {} ({})", result.id, result.kind);
    } else {
        println!("Stored {} ({})", result.id, result.kind);
    }
    if let Some(old) = result.superseded {
        println!("  supersedes {old}");
    }
    Ok(())
}

pub fn forget(config: &CogneeConfig, id: &str, reason: Option<&str>, hard: bool) -> Result<()> {
    let mut conn = enhanced_cognee::db::open_database(config.resolved_db_path())?;
    let result = forget::forget_memory(&mut conn, id, reason, hard)?;
    if result.hard_deleted {
        println!("Deleted {} permanently.", result.id);
    } else {
        println!("Forgot {} (kept for audit; use --hard to delete).", result.id);
    }
    Ok(())
}

pub fn relate(
    config: &CogneeConfig,
    source: &str,
    relation: &str,
    target: &str,
    weight: f64,
) -> Result<()> {
    let conn = enhanced_cognee::db::open_database(config.resolved_db_path())?;
    let result = relations::link_memories(&conn, source, relation, target, weight)?;
    if result.deduplicated {
        println!("Relation already exists: {}", result.id);
    } else {
        println!("Linked {source} -[{relation}]-> {target} ({})", result.id);
    }
    Ok(())
}
