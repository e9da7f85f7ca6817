use anyhow::Result;
use rusqlite::{params, params_from_iter, Connection};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

use super::types::MemoryKind;

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_memories: u64,
    pub active_memories: u64,
    pub superseded_memories: u64,
    pub by_kind: BTreeMap<String, u64>,
    pub by_visibility: BTreeMap<String, u64>,
    pub relations: u64,
    pub db_size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_memory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest_memory: Option<String>,
}

/// Store statistics.
///
/// With `agent`, counts cover that agent's memories plus every shared one.
/// `db_path` is only used for the file size; pass `None` for in-memory databases.
pub fn memory_stats(
    conn: &Connection,
    agent: Option<&str>,
    db_path: Option<&Path>,
) -> Result<StatsResponse> {
    let (scope, args) = agent_scope(agent);

    let (total, active): (i64, i64) = conn.query_row(
        &format!(
            "SELECT COUNT(*), COALESCE(SUM(superseded_by IS NULL), 0) FROM memories {scope}"
        ),
        params_from_iter(args.iter()),
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let mut by_kind: BTreeMap<String, u64> = MemoryKind::ALL
        .iter()
        .map(|k| (k.as_str().to_string(), 0))
        .collect();
    by_kind.extend(group_counts(conn, "kind", &scope, &args)?);

    let mut by_visibility: BTreeMap<String, u64> =
        [("shared".to_string(), 0), ("private".to_string(), 0)].into();
    by_visibility.extend(group_counts(conn, "visibility", &scope, &args)?);

    // Edges count only when both ends are in scope.
    let relations: i64 = conn.query_row(
        "SELECT COUNT(*) FROM memory_relations r \
         JOIN memories s ON s.id = r.source_id \
         JOIN memories t ON t.id = r.target_id \
         WHERE ?1 IS NULL \
            OR ((s.agent_id = ?1 OR s.visibility = 'shared') \
                AND (t.agent_id = ?1 OR t.visibility = 'shared'))",
        params![agent],
        |row| row.get(0),
    )?;

    let (oldest, newest): (Option<String>, Option<String>) = conn.query_row(
        &format!("SELECT MIN(created_at), MAX(created_at) FROM memories {scope}"),
        params_from_iter(args.iter()),
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let db_size_bytes = db_path
        .and_then(|p| std::fs::metadata(p).ok())
        .map(|m| m.len())
        .unwrap_or(0);

    Ok(StatsResponse {
        total_memories: total as u64,
        active_memories: active as u64,
        superseded_memories: (total - active) as u64,
        by_kind,
        by_visibility,
        relations: relations as u64,
        db_size_bytes,
        oldest_memory: oldest,
        newest_memory: newest,
    })
}

fn agent_scope(agent: Option<&str>) -> (String, Vec<String>) {
    match agent {
        Some(a) => (
            "WHERE (agent_id = ?1 OR visibility = 'shared')".to_string(),
            vec![a.to_string()],
        ),
        None => (String::new(), Vec::new()),
    }
}

/// `column` is one of our own column names, never user input.
fn group_counts(
    conn: &Connection,
    column: &str,
    scope: &str,
    args: &[String],
) -> Result<Vec<(String, u64)>> {
    let sql = format!("SELECT {column}, COUNT(*) FROM memories {scope} GROUP BY {column}");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(args.iter()), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
