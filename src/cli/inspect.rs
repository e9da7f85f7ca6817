//! `inspect` and `graph`: one memory in detail, or its neighbourhood.

use anyhow::Result;

use enhanced_cognee::config::CogneeConfig;
use enhanced_cognee::memory::relations;
use enhanced_cognee::memory::search::{self, Direction};

pub fn inspect(config: &CogneeConfig, id: &str, agent: Option<&str>, json: bool) -> Result<()> {
    let conn = enhanced_cognee::db::open_database(config.resolved_db_path())?;
    let agent = agent.unwrap_or(config.storage.default_agent.as_str());
    let response = search::inspect_memory(&conn, id, Some(agent), true, true)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    let m = &response.memory;
    println!("Memory: {}", m.id);
    println!("{}", "=".repeat(50));
    println!("  Kind:           {}", m.kind);
    println!("  Agent:          {}", m.agent_id);
    println!("  Visibility:     {}", m.visibility);
    if let Some(ref category) = m.category {
        println!("  Category:       {category}");
    }
    println!("  Confidence:     {:.2}", m.confidence);
    println!("  Access count:   {}", m.access_count);
    if let Some(ref la) = m.last_accessed {
        println!("  Last accessed:  {la}");
    }
    println!("  Created:        {}", m.created_at);
    println!("  Updated:        {}", m.updated_at);
    if let Some(ref sb) = m.superseded_by {
        println!("  Superseded by:  {sb}");
    }
    if let Some(ref meta) = m.metadata {
        println!("  Metadata:       {}", serde_json::to_string_pretty(meta)?);
    }
    println!();
    println!("Content:");
    println!("  {}", m.content);

    if let Some(relations) = response.relations.as_ref().filter(|r| !r.is_empty()) {
        println!();
        println!("Relations:");
        for rel in relations {
            let arrow = match rel.direction {
                Direction::Outgoing => format!("--[{}]-->", rel.relation),
                Direction::Incoming => format!("<--[{}]--", rel.relation),
            };
            println!(
                "  {arrow} {} ({}: {}) w={:.2}",
                rel.other.id, rel.other.kind, rel.other.preview, rel.weight
            );
        }
    }

    if let Some(log) = response.log.as_ref().filter(|l| !l.is_empty()) {
        println!();
        println!("Audit Log:");
        for entry in log {
            let details = entry
                .details
                .as_ref()
                .map(|d| d.to_string())
                .unwrap_or_default();
            println!("  {} [{}] {}", entry.created_at, entry.operation, details);
        }
    }

    Ok(())
}

pub fn graph(
    config: &CogneeConfig,
    id: &str,
    agent: Option<&str>,
    depth: usize,
    relation: Option<&str>,
    json: bool,
) -> Result<()> {
    let conn = enhanced_cognee::db::open_database(config.resolved_db_path())?;
    let agent = agent.unwrap_or(config.storage.default_agent.as_str());
    let found = relations::neighbors(&conn, id, Some(agent), depth, relation)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&found)?);
        return Ok(());
    }
    if found.is_empty() {
        println!("No connected memories within {depth} hop(s).");
        return Ok(());
    }

    println!("Neighbours of {id} (max depth {depth}):");
    for n in &found {
        let edge = match n.direction {
            Direction::Outgoing => format!("{} --[{}]--> {}", n.via, n.relation, n.id),
            Direction::Incoming => format!("{} <--[{}]-- {}", n.via, n.relation, n.id),
        };
        println!("  [{}] {edge}", n.depth);
        println!("      ({}) {}", n.kind, n.preview);
    }
    Ok(())
}
