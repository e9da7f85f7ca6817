//! The memory graph: directed, labelled, weighted edges between memories,
//! and breadth-first neighbourhood traversal over them.

use std::collections::{HashSet, VecDeque};

use anyhow::{bail, ensure, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use super::search::Direction;
use super::store::write_audit_log;
use super::truncate_preview;
use super::types::MemoryRelation;

#[derive(Debug, Serialize)]
pub struct LinkResult {
    pub id: String,
    /// `true` if this exact (source, relation, target) edge already existed.
    pub deduplicated: bool,
}

/// A memory reached during traversal.
#[derive(Debug, Clone, Serialize)]
pub struct Neighbor {
    pub id: String,
    pub kind: String,
    pub preview: String,
    /// Hops from the start node, starting at 1.
    pub depth: usize,
    /// The edge that first reached this node.
    pub relation: String,
    pub direction: Direction,
    /// Node the edge was followed from.
    pub via: String,
}

/// Link `source → target`. Idempotent on the full triple.
pub fn link_memories(
    conn: &Connection,
    source_id: &str,
    relation: &str,
    target_id: &str,
    weight: f64,
) -> Result<LinkResult> {
    let relation = relation.trim();
    ensure!(!relation.is_empty(), "relation label must not be empty");
    ensure!(source_id != target_id, "cannot link a memory to itself");
    ensure!(
        weight.is_finite() && weight > 0.0,
        "relation weight must be a positive number"
    );
    require_memory(conn, source_id, "source")?;
    require_memory(conn, target_id, "target")?;

    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM memory_relations \
             WHERE source_id = ?1 AND relation = ?2 AND target_id = ?3",
            params![source_id, relation, target_id],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(id) = existing {
        return Ok(LinkResult {
            id,
            deduplicated: true,
        });
    }

    let id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO memory_relations (id, source_id, relation, target_id, weight, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            id,
            source_id,
            relation,
            target_id,
            weight,
            chrono::Utc::now().to_rfc3339()
        ],
    )?;
    write_audit_log(
        conn,
        "link",
        source_id,
        Some(&serde_json::json!({"relation": relation, "target": target_id, "weight": weight})),
    )?;

    tracing::debug!(%source_id, %relation, %target_id, "memories linked");

    Ok(LinkResult {
        id,
        deduplicated: false,
    })
}

/// Every edge touching `memory_id`, in creation order.
pub fn list_relations(conn: &Connection, memory_id: &str) -> Result<Vec<MemoryRelation>> {
    let mut stmt = conn.prepare(
        "SELECT id, source_id, relation, target_id, weight, created_at FROM memory_relations \
         WHERE source_id = ?1 OR target_id = ?1 ORDER BY created_at, id",
    )?;
    let rows = stmt
        .query_map(params![memory_id], |row| {
            Ok(MemoryRelation {
                id: row.get(0)?,
                source_id: row.get(1)?,
                relation: row.get(2)?,
                target_id: row.get(3)?,
                weight: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Breadth-first walk in both edge directions up to `max_depth` hops.
///
/// Each reachable active memory appears once, at its shortest distance.
/// Superseded memories, and private memories not owned by `requester`, are
/// neither returned nor walked through.
pub fn neighbors(
    conn: &Connection,
    start_id: &str,
    requester: Option<&str>,
    max_depth: usize,
    relation_filter: Option<&str>,
) -> Result<Vec<Neighbor>> {
    require_memory(conn, start_id, "start")?;
    let visible: bool = conn.query_row(
        "SELECT visibility = 'shared' OR agent_id IS ?2 FROM memories WHERE id = ?1",
        params![start_id, requester],
        |row| row.get(0),
    )?;
    if !visible {
        bail!("start memory not found: {start_id}");
    }

    let mut stmt = conn.prepare(
        "SELECT 'outgoing', r.relation, m.id, m.kind, m.content \
         FROM memory_relations r JOIN memories m ON m.id = r.target_id \
         WHERE r.source_id = ?1 AND m.superseded_by IS NULL \
           AND (?2 IS NULL OR r.relation = ?2) \
           AND (m.visibility = 'shared' OR m.agent_id = ?3) \
         UNION ALL \
         SELECT 'incoming', r.relation, m.id, m.kind, m.content \
         FROM memory_relations r JOIN memories m ON m.id = r.source_id \
         WHERE r.target_id = ?1 AND m.superseded_by IS NULL \
           AND (?2 IS NULL OR r.relation = ?2) \
           AND (m.visibility = 'shared' OR m.agent_id = ?3)",
    )?;

    let mut seen: HashSet<String> = HashSet::from([start_id.to_string()]);
    let mut queue: VecDeque<(String, usize)> = VecDeque::from([(start_id.to_string(), 0)]);
    let mut found = Vec::new();

    while let Some((node, depth)) = queue.pop_front() {
        if depth >= max_depth {
            continue;
        }
        let edges = stmt
            .query_map(params![node, relation_filter, requester], |row| {
                let direction: String = row.get(0)?;
                Ok((
                    direction,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        for (direction, relation, id, kind, content) in edges {
            if !seen.insert(id.clone()) {
                continue;
            }
            queue.push_back((id.clone(), depth + 1));
            found.push(Neighbor {
                id,
                kind,
                preview: truncate_preview(&content, 100),
                depth: depth + 1,
                relation,
                direction: if direction == "outgoing" {
                    Direction::Outgoing
                } else {
                    Direction::Incoming
                },
                via: node.clone(),
            });
        }
    }

    Ok(found)
}

fn require_memory(conn: &Connection, memory_id: &str, role: &str) -> Result<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM memories WHERE id = ?1)",
        params![memory_id],
        |row| row.get(0),
    )?;
    if !exists {
        bail!("{role} memory not found: {memory_id}");
    }
    Ok(())
}
