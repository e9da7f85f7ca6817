//! `doctor`: database diagnostics.

use anyhow::{Context, Result};

use enhanced_cognee::config::CogneeConfig;
use enhanced_cognee::db;
use enhanced_cognee::embedding;

/// Run database diagnostics and print a health report.
pub fn doctor(config: &CogneeConfig) -> Result<()> {
    let db_path = config.resolved_db_path();

    if !db_path.exists() {
        println!("Database: not found at {}", db_path.display());
        println!("Run `cognee store` or `cognee ingest` to create it.");
        return Ok(());
    }

    let file_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    let conn = db::open_database(&db_path).context("failed to open database (may be corrupt)")?;
    let report = db::check_database_health(&conn).context("failed to run health check")?;

    // Model id as the provider reports it; the local model may not be downloaded.
    let configured = match embedding::create_provider(&config.embedding) {
        Ok(provider) => provider.model_id().to_string(),
        Err(e) => {
            println!("Embedding provider unavailable: {e:#}");
            config.embedding.model.clone()
        }
    };

    println!("Cognee Health Report");
    println!("====================");
    println!();
    println!("Database:          {}", db_path.display());
    println!("File size:         {}", super::format_bytes(file_size));
    println!("Schema version:    {}", report.schema_version);
    println!("sqlite-vec:        {}", report.sqlite_vec_version);
    println!();
    println!("Embedding model:");
    println!("  Stored:          {}", report.embedding_model.as_deref().unwrap_or("(not set)"));
    println!("  Configured:      {configured}");
    match report.embedding_model {
        Some(ref stored) if stored != &configured => {
            println!("  WARNING: model mismatch; stored vectors will not match new queries.")
        }
        Some(_) => println!("  Status:          OK (match)"),
        None => {}
    }
    println!();
    println!("Row counts:");
    println!("  Memories:        {}", report.memory_count);
    println!("  Relations:       {}", report.relation_count);
    println!("  Audit log:       {}", report.log_count);
    println!();
    if report.integrity_ok {
        println!("Integrity check:   PASSED");
    } else {
        println!("Integrity check:   FAILED ({})", report.integrity_details);
        println!();
        println!("Restore the database from a backup before writing to it again.");
    }

    Ok(())
}
