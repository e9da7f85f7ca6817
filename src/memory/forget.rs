//! Soft and hard memory deletion.
//!
//! Soft delete marks a memory superseded by `"forgotten"` so it drops out of
//! recall but stays inspectable. Hard delete removes the row, its FTS5 and
//! vector entries, and (via foreign keys) every relation touching it.

use anyhow::{anyhow, bail, Result};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::Serialize;

use super::store::write_audit_log;

#[derive(Debug, Serialize)]
pub struct ForgetResult {
    pub id: String,
    /// `false` for a soft delete.
    pub hard_deleted: bool,
}

pub fn forget_memory(
    conn: &mut Connection,
    memory_id: &str,
    reason: Option<&str>,
    hard_delete: bool,
) -> Result<ForgetResult> {
    let tx = conn.transaction()?;
    if hard_delete {
        hard_delete_in(&tx, memory_id, reason)?;
    } else {
        soft_delete_in(&tx, memory_id, reason)?;
    }
    tx.commit()?;

    tracing::info!(id = %memory_id, hard = hard_delete, "memory forgotten");

    Ok(ForgetResult {
        id: memory_id.to_string(),
        hard_deleted: hard_delete,
    })
}

fn soft_delete_in(tx: &Transaction, memory_id: &str, reason: Option<&str>) -> Result<()> {
    let rows = tx.execute(
        "UPDATE memories SET superseded_by = 'forgotten', updated_at = ?1 WHERE id = ?2",
        params![chrono::Utc::now().to_rfc3339(), memory_id],
    )?;
    if rows == 0 {
        bail!("memory not found: {memory_id}");
    }

    let details = serde_json::json!({"reason": reason, "hard_delete": false});
    write_audit_log(tx, "delete", memory_id, Some(&details))
}

/// Remove one memory from every table. Shared with maintenance cleanup,
/// which runs many of these inside a single transaction.
pub(crate) fn hard_delete_in(tx: &Transaction, memory_id: &str, reason: Option<&str>) -> Result<()> {
    let (rowid, content, kind): (i64, String, String) = tx
        .query_row(
            "SELECT rowid, content, kind FROM memories WHERE id = ?1",
            params![memory_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?
        .ok_or_else(|| anyhow!("memory not found: {memory_id}"))?;

    // External-content FTS5 tables need the old values to delete.
    tx.execute(
        "INSERT INTO memories_fts(memories_fts, rowid, content, id, kind) \
         VALUES('delete', ?1, ?2, ?3, ?4)",
        params![rowid, content, memory_id, kind],
    )?;
    tx.execute("DELETE FROM memories_vec WHERE id = ?1", params![memory_id])?;

    // memory_log has no FK, so the entry outlives the row.
    let details = serde_json::json!({"reason": reason, "hard_delete": true});
    write_audit_log(tx, "delete", memory_id, Some(&details))?;

    tx.execute("DELETE FROM memories WHERE id = ?1", params![memory_id])?;
    Ok(())
}
