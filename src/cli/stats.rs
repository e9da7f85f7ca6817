use anyhow::Result;

use enhanced_cognee::config::CogneeConfig;
use enhanced_cognee::memory::types::{MemoryKind, Visibility};

/// Display memory statistics in the terminal.
pub fn stats(config: &CogneeConfig, agent: Option<&str>, json: bool) -> Result<()> {
    let db_path = config.resolved_db_path();
    let conn = enhanced_cognee::db::open_database(&db_path)?;

    let response = enhanced_cognee::memory::stats::memory_stats(&conn, agent, Some(&db_path))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    println!("Memory Statistics");
    println!("{}", "=".repeat(40));
    println!("  Total memories:      {}", response.total_memories);
    println!("  Active:              {}", response.active_memories);
    println!("  Superseded:          {}", response.superseded_memories);
    println!();

    println!("By Kind:");
    for kind in MemoryKind::ALL {
        let count = response.by_kind.get(kind.as_str()).copied().unwrap_or(0);
        println!("  {:<12} {}", kind, count);
    }
    println!();

    println!("By Visibility:");
    for v in [Visibility::Shared, Visibility::Private] {
        let count = response.by_visibility.get(v.as_str()).copied().unwrap_or(0);
        println!("  {:<12} {}", v, count);
    }
    println!();

    println!("Relations:             {}", response.relations);
    println!("Database size:         {}", super::format_bytes(response.db_size_bytes));

    if let Some(ref oldest) = response.oldest_memory {
        println!("Oldest memory:         {oldest}");
    }
    if let Some(ref newest) = response.newest_memory {
        println!("Newest memory:         {newest}");
    }

    Ok(())
}
