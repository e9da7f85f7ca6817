//! Write path: validation, near-duplicate gate, insert, index sync,
//! supersession, and audit logging, all inside one transaction.

use anyhow::{bail, ensure, Result};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::Serialize;
use std::collections::HashSet;

use super::embedding_to_bytes;
use super::types::{MemoryKind, NewMemory};
use crate::embedding::EMBEDDING_DIM;

/// First KNN window of the dedup gate; doubled while every hit is still
/// within the threshold.
const DEDUP_CANDIDATES: i64 = 20;
/// Upper bound on `k` accepted by vec0.
const MAX_KNN: i64 = 4096;

#[derive(Debug, Serialize)]
pub struct StoreMemoryResult {
    pub id: String,
    pub kind: MemoryKind,
    /// `true` when an existing near-duplicate absorbed this write.
    pub deduplicated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub superseded: Option<String>,
}

pub fn store_memory(
    conn: &mut Connection,
    memory: &NewMemory<'_>,
    embedding: &[f32],
    dedup_threshold: f64,
) -> Result<StoreMemoryResult> {
    let tx = conn.transaction()?;
    let result = store_in(&tx, memory, embedding, Some(dedup_threshold))?;
    tx.commit()?;
    Ok(result)
}

/// The write path inside a caller-owned transaction.
///
/// `dedup_threshold: None` skips the near-duplicate gate; summaries use it so
/// they never collapse into one of the memories they summarize.
pub(crate) fn store_in(
    tx: &Transaction,
    memory: &NewMemory<'_>,
    embedding: &[f32],
    dedup_threshold: Option<f64>,
) -> Result<StoreMemoryResult> {
    ensure!(!memory.content.trim().is_empty(), "content must not be empty");
    ensure!(
        (0.0..=1.0).contains(&memory.confidence),
        "confidence must be between 0.0 and 1.0"
    );
    ensure!(
        embedding.len() == EMBEDDING_DIM,
        "embedding has {} dimensions, expected {EMBEDDING_DIM}",
        embedding.len()
    );

    if let Some(threshold) = dedup_threshold {
        if let Some(existing) = find_duplicate(tx, memory, embedding, threshold)? {
            absorb_duplicate(tx, &existing)?;
            write_audit_log(
                tx,
                "update",
                &existing,
                Some(&serde_json::json!({"reason": "deduplication"})),
            )?;
            tracing::debug!(id = %existing, "write absorbed by near-duplicate");
            return Ok(StoreMemoryResult {
                id: existing,
                kind: memory.kind,
                deduplicated: true,
                superseded: None,
            });
        }
    }

    let id = uuid::Uuid::now_v7().to_string();
    let rowid = insert_row(tx, &id, memory)?;

    tx.execute(
        "INSERT INTO memories_fts (rowid, content, id, kind) VALUES (?1, ?2, ?3, ?4)",
        params![rowid, memory.content, id, memory.kind.as_str()],
    )?;
    tx.execute(
        "INSERT INTO memories_vec (id, embedding) VALUES (?1, ?2)",
        params![id, embedding_to_bytes(embedding)],
    )?;

    let superseded = match memory.supersedes {
        Some(old_id) => {
            mark_superseded(tx, old_id, &id)?;
            write_audit_log(
                tx,
                "supersede",
                old_id,
                Some(&serde_json::json!({"superseded_by": &id})),
            )?;
            Some(old_id.to_string())
        }
        None => None,
    };

    write_audit_log(tx, "create", &id, None)?;

    tracing::info!(id = %id, kind = %memory.kind, agent = %memory.agent_id, "memory stored");

    Ok(StoreMemoryResult {
        id,
        kind: memory.kind,
        deduplicated: false,
        superseded,
    })
}

/// Nearest active memory of the same kind and owner within the cosine threshold.
fn find_duplicate(
    tx: &Transaction,
    memory: &NewMemory<'_>,
    embedding: &[f32],
    threshold: f64,
) -> Result<Option<String>> {
    let max_distance = super::cosine_threshold_to_l2(threshold);

    let mut stmt = tx.prepare(
        "SELECT id, distance FROM memories_vec WHERE embedding MATCH ?1 ORDER BY distance LIMIT ?2",
    )?;
    let mut k = DEDUP_CANDIDATES;
    let mut checked: HashSet<String> = HashSet::new();
    loop {
        let candidates: Vec<(String, f64)> = stmt
            .query_map(params![embedding_to_bytes(embedding), k], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        let exhausted = (candidates.len() as i64) < k;

        for (candidate, distance) in &candidates {
            if *distance > max_distance {
                return Ok(None);
            }
            if !checked.insert(candidate.clone())
                || memory.supersedes == Some(candidate.as_str())
            {
                continue;
            }
            let matches: Option<bool> = tx
                .query_row(
                    "SELECT kind = ?2 AND agent_id = ?3 AND superseded_by IS NULL \
                     FROM memories WHERE id = ?1",
                    params![candidate, memory.kind.as_str(), memory.agent_id],
                    |row| row.get(0),
                )
                .optional()?;
            if matches == Some(true) {
                return Ok(Some(candidate.clone()));
            }
        }

        if exhausted || k >= MAX_KNN {
            return Ok(None);
        }
        k = (k * 2).min(MAX_KNN);
    }
}

fn absorb_duplicate(tx: &Transaction, id: &str) -> Result<()> {
    tx.execute(
        "UPDATE memories SET updated_at = ?1, confidence = MIN(confidence + 0.1, 1.0), \
         access_count = access_count + 1 WHERE id = ?2",
        params![chrono::Utc::now().to_rfc3339(), id],
    )?;
    Ok(())
}

/// Insert the row and return its rowid for the FTS sync.
fn insert_row(tx: &Transaction, id: &str, memory: &NewMemory<'_>) -> Result<i64> {
    let now = chrono::Utc::now().to_rfc3339();
    let metadata = memory.metadata.map(serde_json::to_string).transpose()?;

    tx.execute(
        "INSERT INTO memories (id, kind, content, agent_id, visibility, category, confidence, \
         access_count, created_at, updated_at, metadata) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?8, ?9)",
        params![
            id,
            memory.kind.as_str(),
            memory.content,
            memory.agent_id,
            memory.visibility.as_str(),
            memory.category,
            memory.confidence,
            now,
            metadata,
        ],
    )?;

    Ok(tx.last_insert_rowid())
}

pub(crate) fn mark_superseded(tx: &Transaction, old_id: &str, new_id: &str) -> Result<()> {
    let rows = tx.execute(
        "UPDATE memories SET superseded_by = ?1, updated_at = ?2 WHERE id = ?3",
        params![new_id, chrono::Utc::now().to_rfc3339(), old_id],
    )?;
    if rows == 0 {
        bail!("supersedes target not found: {old_id}");
    }
    Ok(())
}

pub(crate) fn write_audit_log(
    conn: &Connection,
    operation: &str,
    memory_id: &str,
    details: Option<&serde_json::Value>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO memory_log (operation, memory_id, details, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![
            operation,
            memory_id,
            details.map(|d| d.to_string()),
            chrono::Utc::now().to_rfc3339()
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::Visibility;

    fn test_db() -> Connection {
        crate::db::open_memory_database().unwrap()
    }

    fn spike(dim: usize) -> Vec<f32> {
        let mut v = vec![0.0f32; EMBEDDING_DIM];
        v[dim] = 1.0;
        v
    }

    /// Cosine similarity ~0.997 with `spike(0)`.
    fn near_spike0() -> Vec<f32> {
        let mut v = vec![0.0f32; EMBEDDING_DIM];
        v[0] = 0.99;
        v[1] = 0.07;
        crate::embedding::l2_normalize(&mut v);
        v
    }

    fn fact<'a>(content: &'a str) -> NewMemory<'a> {
        NewMemory::new(content, MemoryKind::Fact, "agent-a")
    }

    #[test]
    fn stores_row_fts_and_vector() {
        let mut conn = test_db();
        let result = store_memory(&mut conn, &fact("Neo4j holds the graph"), &spike(0), 0.92).unwrap();
        assert!(!result.deduplicated);

        let (content, visibility): (String, String) = conn
            .query_row(
                "SELECT content, visibility FROM memories WHERE id = ?1",
                params![result.id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(content, "Neo4j holds the graph");
        assert_eq!(visibility, "shared");

        let fts_id: String = conn
            .query_row(
                "SELECT id FROM memories_fts WHERE memories_fts MATCH 'graph'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(fts_id, result.id);

        let vec_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM memories_vec WHERE id = ?1", params![result.id], |r| r.get(0))
            .unwrap();
        assert_eq!(vec_count, 1);
    }

    #[test]
    fn near_duplicate_is_absorbed() {
        let mut conn = test_db();
        let first = store_memory(&mut conn, &fact("Redis caches sessions").confidence(0.8), &spike(0), 0.92).unwrap();
        let second = store_memory(&mut conn, &fact("Redis caches the sessions"), &near_spike0(), 0.92).unwrap();

        assert!(second.deduplicated);
        assert_eq!(second.id, first.id);

        let (confidence, access): (f64, u32) = conn
            .query_row(
                "SELECT confidence, access_count FROM memories WHERE id = ?1",
                params![first.id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert!((confidence - 0.9).abs() < 1e-9);
        assert_eq!(access, 1);
    }

    #[test]
    fn dedup_is_scoped_to_kind_and_agent() {
        let mut conn = test_db();
        let first = store_memory(&mut conn, &fact("Same text"), &spike(0), 0.92).unwrap();

        let other_kind = NewMemory::new("Same text", MemoryKind::Event, "agent-a");
        let r = store_memory(&mut conn, &other_kind, &spike(0), 0.92).unwrap();
        assert!(!r.deduplicated);

        let other_agent = NewMemory::new("Same text", MemoryKind::Fact, "agent-b");
        let r = store_memory(&mut conn, &other_agent, &spike(0), 0.92).unwrap();
        assert!(!r.deduplicated);
        assert_ne!(r.id, first.id);
    }

    #[test]
    fn confidence_boost_is_capped() {
        let mut conn = test_db();
        let first = store_memory(&mut conn, &fact("cap").confidence(0.95), &spike(0), 0.92).unwrap();
        store_memory(&mut conn, &fact("cap again"), &near_spike0(), 0.92).unwrap();

        let confidence: f64 = conn
            .query_row("SELECT confidence FROM memories WHERE id = ?1", params![first.id], |r| r.get(0))
            .unwrap();
        assert!((confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn supersession_links_old_to_new() {
        let mut conn = test_db();
        let old = store_memory(&mut conn, &fact("Old fact"), &spike(0), 0.92).unwrap();
        let new = store_memory(
            &mut conn,
            &fact("New fact").supersedes(&old.id),
            &spike(100),
            0.92,
        )
        .unwrap();
        assert_eq!(new.superseded.as_deref(), Some(old.id.as_str()));

        let superseded_by: Option<String> = conn
            .query_row("SELECT superseded_by FROM memories WHERE id = ?1", params![old.id], |r| r.get(0))
            .unwrap();
        assert_eq!(superseded_by.as_deref(), Some(new.id.as_str()));

        // A superseded memory no longer absorbs duplicates.
        let again = store_memory(&mut conn, &fact("Old fact again"), &near_spike0(), 0.92).unwrap();
        assert!(!again.deduplicated);
    }

    #[test]
    fn supersedes_unknown_id_fails_and_rolls_back() {
        let mut conn = test_db();
        let err = store_memory(&mut conn, &fact("orphan").supersedes("missing"), &spike(0), 0.92)
            .unwrap_err();
        assert!(err.to_string().contains("supersedes target not found"));

        let count: i64 = conn.query_row("SELECT COUNT(*) FROM memories", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn rejects_invalid_input() {
        let mut conn = test_db();
        assert!(store_memory(&mut conn, &fact("   "), &spike(0), 0.92).is_err());
        assert!(store_memory(&mut conn, &fact("x").confidence(1.5), &spike(0), 0.92).is_err());
        assert!(store_memory(&mut conn, &fact("x"), &[1.0, 0.0], 0.92).is_err());
    }

    #[test]
    fn store_in_without_gate_keeps_duplicates() {
        let mut conn = test_db();
        let first = store_memory(&mut conn, &fact("same"), &spike(0), 0.92).unwrap();

        let tx = conn.transaction().unwrap();
        let second = store_in(&tx, &fact("same"), &spike(0), None).unwrap();
        tx.commit().unwrap();

        assert!(!second.deduplicated);
        assert_ne!(second.id, first.id);
    }

    #[test]
    fn audit_log_records_create() {
        let mut conn = test_db();
        let r = store_memory(
            &mut conn,
            &fact("logged").visibility(Visibility::Private),
            &spike(3),
            0.92,
        )
        .unwrap();
        let op: String = conn
            .query_row("SELECT operation FROM memory_log WHERE memory_id = ?1", params![r.id], |row| row.get(0))
            .unwrap();
        assert_eq!(op, "create");
    }
}
