use anyhow::Result;
use chrono::Datelike;
use rusqlite::{params, Connection};
use serde::Serialize;
use std::collections::BTreeMap;

use super::forget::hard_delete_in;
use super::store::{mark_superseded, store_in, write_audit_log};
use super::truncate_preview;
use super::types::{MemoryKind, NewMemory, Visibility};
use crate::config::MaintenanceConfig;
use crate::embedding::EmbeddingProvider;
use crate::llm::Summarizer;

// ── Result types ─────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct DecayResult {
    pub affected_by_kind: BTreeMap<String, usize>,
}

#[derive(Debug, Serialize)]
pub struct CompactResult {
    pub groups_compacted: usize,
    pub memories_compacted: usize,
    pub summary_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CleanupResult {
    pub candidates: Vec<CleanupCandidate>,
    pub deleted: usize,
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
pub struct CleanupCandidate {
    pub id: String,
    pub kind: String,
    pub confidence: f64,
    pub content_preview: String,
    pub last_accessed: Option<String>,
    pub created_at: String,
}

struct EventRow {
    id: String,
    content: String,
    visibility: Visibility,
}

// ── Confidence decay ─────────────────────────────────────────────────────────

/// Multiply the confidence of every active memory by its kind's factor.
/// Events use `event_decay_factor`; the rest share `decay_factor`.
pub fn apply_decay(conn: &Connection, config: &MaintenanceConfig) -> Result<DecayResult> {
    let now = chrono::Utc::now().to_rfc3339();
    let mut affected_by_kind = BTreeMap::new();

    for kind in MemoryKind::ALL {
        let factor = match kind {
            MemoryKind::Event => config.event_decay_factor,
            _ => config.decay_factor,
        };
        let affected = conn.execute(
            "UPDATE memories SET confidence = confidence * ?1, updated_at = ?2 \
             WHERE kind = ?3 AND superseded_by IS NULL AND confidence > 0.0",
            params![factor, now, kind.as_str()],
        )?;

        if affected > 0 {
            // One entry per batch, keyed by a synthetic id.
            write_audit_log(
                conn,
                "decay",
                &format!("batch:{kind}"),
                Some(&serde_json::json!({
                    "kind": kind.as_str(),
                    "factor": factor,
                    "affected": affected,
                })),
            )?;
        }
        affected_by_kind.insert(kind.as_str().to_string(), affected);
    }

    tracing::info!(?affected_by_kind, "decay applied");
    Ok(DecayResult { affected_by_kind })
}

// ── Event compaction ─────────────────────────────────────────────────────────

/// Replace old events with one extractive summary per (agent, ISO week).
///
/// Each qualifying group is compacted in its own transaction: the summary is
/// stored as an event tagged `{"summary": true}` and every original is
/// superseded by it. Groups whose summary comes out empty are left alone.
pub fn compact_events(
    conn: &mut Connection,
    embedder: &dyn EmbeddingProvider,
    summarizer: &dyn Summarizer,
    config: &MaintenanceConfig,
) -> Result<CompactResult> {
    let cutoff = chrono::Utc::now() - chrono::Duration::days(config.compaction_age_days as i64);

    let groups = {
        let mut stmt = conn.prepare(
            "SELECT id, content, agent_id, visibility, created_at FROM memories \
             WHERE kind = 'event' AND superseded_by IS NULL AND created_at < ?1 \
             ORDER BY created_at, id",
        )?;
        let rows = stmt
            .query_map(params![cutoff.to_rfc3339()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut groups: BTreeMap<(String, String), Vec<EventRow>> = BTreeMap::new();
        for (id, content, agent, visibility, created_at) in rows {
            let Some(week) = iso_week_key(&created_at) else {
                tracing::warn!(%id, %created_at, "skipping event with unparseable timestamp");
                continue;
            };
            groups.entry((agent, week)).or_default().push(EventRow {
                id,
                content,
                visibility: visibility.parse().unwrap_or(Visibility::Private),
            });
        }
        groups
    };

    let mut result = CompactResult {
        groups_compacted: 0,
        memories_compacted: 0,
        summary_ids: Vec::new(),
    };

    for ((agent, week), members) in &groups {
        if members.len() < config.compaction_min_group_size {
            continue;
        }

        let documents: Vec<&str> = members.iter().map(|m| m.content.as_str()).collect();
        let summary = summarizer.summarize(&documents, config.summary_token_budget);
        if summary.text.is_empty() {
            tracing::warn!(%agent, %week, "summary came out empty, group left as is");
            continue;
        }

        let embedding = embedder.embed(&summary.text)?;
        let visibility = if members.iter().all(|m| m.visibility == Visibility::Shared) {
            Visibility::Shared
        } else {
            Visibility::Private
        };
        let metadata = serde_json::json!({
            "summary": true,
            "week": week,
            "source_count": members.len(),
        });
        let new_memory = NewMemory::new(&summary.text, MemoryKind::Event, agent)
            .visibility(visibility)
            .metadata(&metadata);

        let tx = conn.transaction()?;
        let stored = store_in(&tx, &new_memory, &embedding, None)?;
        for member in members {
            mark_superseded(&tx, &member.id, &stored.id)?;
        }
        let source_ids: Vec<&str> = members.iter().map(|m| m.id.as_str()).collect();
        write_audit_log(
            &tx,
            "compact",
            &stored.id,
            Some(&serde_json::json!({"week": week, "source_ids": source_ids})),
        )?;
        tx.commit()?;

        tracing::info!(%agent, %week, members = members.len(), summary = %stored.id, "events compacted");

        result.groups_compacted += 1;
        result.memories_compacted += members.len();
        result.summary_ids.push(stored.id);
    }

    Ok(result)
}

/// `2026-W08` style key from an RFC 3339 timestamp.
fn iso_week_key(timestamp: &str) -> Option<String> {
    let at = chrono::DateTime::parse_from_rfc3339(timestamp).ok()?;
    let week = at.with_timezone(&chrono::Utc).iso_week();
    Some(format!("{}-W{:02}", week.year(), week.week()))
}

// ── Cleanup ──────────────────────────────────────────────────────────────────

/// Low-confidence memories nobody has touched in `cleanup_no_access_days`.
/// Unless `dry_run`, they are hard-deleted in one transaction.
pub fn cleanup_stale(
    conn: &mut Connection,
    config: &MaintenanceConfig,
    dry_run: bool,
) -> Result<CleanupResult> {
    let threshold =
        (chrono::Utc::now() - chrono::Duration::days(config.cleanup_no_access_days as i64))
            .to_rfc3339();

    let candidates: Vec<CleanupCandidate> = {
        let mut stmt = conn.prepare(
            "SELECT id, kind, confidence, content, last_accessed, created_at \
             FROM memories \
             WHERE superseded_by IS NULL \
               AND confidence < ?1 \
               AND COALESCE(last_accessed, created_at) < ?2 \
             ORDER BY confidence, id",
        )?;
        let collected = stmt
            .query_map(params![config.cleanup_confidence_floor, threshold], |row| {
                let content: String = row.get(3)?;
                Ok(CleanupCandidate {
                    id: row.get(0)?,
                    kind: row.get(1)?,
                    confidence: row.get(2)?,
                    content_preview: truncate_preview(&content, 80),
                    last_accessed: row.get(4)?,
                    created_at: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        collected
    };

    if dry_run {
        return Ok(CleanupResult {
            deleted: 0,
            dry_run: true,
            candidates,
        });
    }

    let tx = conn.transaction()?;
    for candidate in &candidates {
        hard_delete_in(&tx, &candidate.id, Some("cleanup"))?;
    }
    tx.commit()?;

    tracing::info!(deleted = candidates.len(), "stale memories removed");

    Ok(CleanupResult {
        deleted: candidates.len(),
        dry_run: false,
        candidates,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::hashing::HashingEmbeddingProvider;
    use crate::embedding::EMBEDDING_DIM;
    use crate::llm::{ExtractiveSummarizer, HeuristicCounter};
    use crate::memory::store::store_memory;

    fn test_db() -> Connection {
        crate::db::open_memory_database().unwrap()
    }

    fn spike(dim: usize) -> Vec<f32> {
        let mut v = vec![0.0f32; EMBEDDING_DIM];
        v[dim] = 1.0;
        v
    }

    fn insert(conn: &mut Connection, memory: NewMemory<'_>, dim: usize) -> String {
        store_memory(conn, &memory, &spike(dim), 0.92).unwrap().id
    }

    fn backdate(conn: &Connection, id: &str, days: i64) {
        let at = (chrono::Utc::now() - chrono::Duration::days(days)).to_rfc3339();
        conn.execute(
            "UPDATE memories SET created_at = ?1, updated_at = ?1 WHERE id = ?2",
            params![at, id],
        )
        .unwrap();
    }

    fn confidence(conn: &Connection, id: &str) -> f64 {
        conn.query_row("SELECT confidence FROM memories WHERE id = ?1", params![id], |r| r.get(0))
            .unwrap()
    }

    fn summarizer() -> ExtractiveSummarizer<HeuristicCounter> {
        ExtractiveSummarizer::new(HeuristicCounter::default())
    }

    #[test]
    fn decay_is_faster_for_events() {
        let mut conn = test_db();
        let event = insert(&mut conn, NewMemory::new("an event", MemoryKind::Event, "a"), 0);
        let fact = insert(&mut conn, NewMemory::new("a fact", MemoryKind::Fact, "a"), 1);

        let result = apply_decay(&conn, &MaintenanceConfig::default()).unwrap();
        assert_eq!(result.affected_by_kind["event"], 1);
        assert_eq!(result.affected_by_kind["procedure"], 0);
        assert!((confidence(&conn, &event) - 0.95).abs() < 1e-9);
        assert!((confidence(&conn, &fact) - 0.98).abs() < 1e-9);

        let batches: i64 = conn
            .query_row("SELECT COUNT(*) FROM memory_log WHERE operation = 'decay'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(batches, 2);
    }

    #[test]
    fn decay_skips_superseded() {
        let mut conn = test_db();
        let old = insert(&mut conn, NewMemory::new("old", MemoryKind::Fact, "a"), 0);
        insert(&mut conn, NewMemory::new("new", MemoryKind::Fact, "a").supersedes(&old), 1);

        apply_decay(&conn, &MaintenanceConfig::default()).unwrap();
        assert_eq!(confidence(&conn, &old), 1.0);
    }

    #[test]
    fn compaction_groups_by_agent_and_week() {
        let mut conn = test_db();
        let config = MaintenanceConfig {
            compaction_min_group_size: 3,
            ..MaintenanceConfig::default()
        };

        let mut originals = Vec::new();
        for i in 0..4 {
            let content = format!("Deployed build {i} to staging. Staging tests passed.");
            let id = insert(&mut conn, NewMemory::new(&content, MemoryKind::Event, "ops"), i);
            backdate(&conn, &id, 45);
            originals.push(id);
        }
        // Too small: another agent, and a different week.
        for i in 0..2 {
            let id = insert(&mut conn, NewMemory::new("Coffee ran out.", MemoryKind::Event, "barista"), 10 + i);
            backdate(&conn, &id, 45);
            let id = insert(&mut conn, NewMemory::new("Older ops note.", MemoryKind::Event, "ops"), 20 + i);
            backdate(&conn, &id, 60);
        }
        // Too recent.
        insert(&mut conn, NewMemory::new("Fresh event.", MemoryKind::Event, "ops"), 30);

        let result =
            compact_events(&mut conn, &HashingEmbeddingProvider::new(), &summarizer(), &config).unwrap();
        assert_eq!(result.groups_compacted, 1);
        assert_eq!(result.memories_compacted, 4);

        let summary_id = &result.summary_ids[0];
        for id in &originals {
            let by: String = conn
                .query_row("SELECT superseded_by FROM memories WHERE id = ?1", params![id], |r| r.get(0))
                .unwrap();
            assert_eq!(&by, summary_id);
        }

        let (kind, agent, metadata): (String, String, String) = conn
            .query_row(
                "SELECT kind, agent_id, metadata FROM memories WHERE id = ?1",
                params![summary_id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap();
        assert_eq!(kind, "event");
        assert_eq!(agent, "ops");
        let metadata: serde_json::Value = serde_json::from_str(&metadata).unwrap();
        assert_eq!(metadata["summary"], true);
        assert_eq!(metadata["source_count"], 4);
    }

    #[test]
    fn compaction_leaves_small_groups() {
        let mut conn = test_db();
        for i in 0..2 {
            let id = insert(&mut conn, NewMemory::new("A lone event.", MemoryKind::Event, "a"), i);
            backdate(&conn, &id, 45);
        }
        let result = compact_events(
            &mut conn,
            &HashingEmbeddingProvider::new(),
            &summarizer(),
            &MaintenanceConfig::default(),
        )
        .unwrap();
        assert_eq!(result.groups_compacted, 0);
    }

    #[test]
    fn iso_week_keys() {
        assert_eq!(iso_week_key("2026-02-18T10:00:00+00:00").as_deref(), Some("2026-W08"));
        // Jan 1st 2027 is a Friday, still in week 53 of 2026.
        assert_eq!(iso_week_key("2027-01-01T00:00:00Z").as_deref(), Some("2026-W53"));
        assert!(iso_week_key("yesterday").is_none());
    }

    #[test]
    fn cleanup_dry_run_then_delete() {
        let mut conn = test_db();
        let stale = insert(&mut conn, NewMemory::new("stale", MemoryKind::Fact, "a").confidence(0.01), 0);
        backdate(&conn, &stale, 120);
        let recent = insert(&mut conn, NewMemory::new("recent", MemoryKind::Fact, "a").confidence(0.01), 1);
        let strong = insert(&mut conn, NewMemory::new("strong", MemoryKind::Fact, "a"), 2);
        backdate(&conn, &strong, 120);

        let config = MaintenanceConfig::default();
        let dry = cleanup_stale(&mut conn, &config, true).unwrap();
        assert_eq!(dry.candidates.len(), 1);
        assert_eq!(dry.candidates[0].id, stale);
        assert_eq!(dry.deleted, 0);

        let real = cleanup_stale(&mut conn, &config, false).unwrap();
        assert_eq!(real.deleted, 1);

        let remaining: Vec<String> = conn
            .prepare("SELECT id FROM memories ORDER BY id")
            .unwrap()
            .query_map([], |r| r.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        let mut expected = vec![recent, strong];
        expected.sort();
        assert_eq!(remaining, expected);
    }
}
