use anyhow::{anyhow, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::collections::HashMap;

use super::rerank::{rerank, RequesterProfile, ScoreBreakdown};
use super::truncate_preview;
use super::types::{memory_from_row, Memory, MemoryKind, Visibility, MEMORY_COLUMNS};
use crate::config::RerankConfig;
use crate::llm::token_counter::TokenCounter;

// ── Public types ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub id: String,
    pub kind: MemoryKind,
    pub content: String,
    pub agent_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub confidence: f64,
    /// Blended re-rank score; 1.0 for direct id hydration.
    pub score: f64,
    pub breakdown: ScoreBreakdown,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryResult {
    pub id: String,
    pub kind: MemoryKind,
    pub preview: String,
    pub score: f64,
}

#[derive(Debug, Serialize)]
pub struct RecallResponse {
    pub results: Vec<SearchResult>,
    /// Candidates that passed filtering, before the token budget cut.
    pub total_matched: usize,
    pub token_estimate: usize,
}

#[derive(Debug, Serialize)]
pub struct RecallSummaryResponse {
    pub results: Vec<SummaryResult>,
    pub total_matched: usize,
    pub token_estimate: usize,
}

/// Post-fusion filters. Visibility is always enforced for `requester`.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub requester: RequesterProfile,
    pub kind: Option<MemoryKind>,
    pub category: Option<String>,
    pub min_confidence: f64,
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub max_results: usize,
    pub token_budget: usize,
    pub rrf_k: usize,
    pub rerank: RerankConfig,
}

#[derive(Debug, Serialize)]
pub struct InspectResponse {
    pub memory: Memory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relations: Option<Vec<RelationEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<Vec<LogEntry>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Outgoing,
    Incoming,
}

#[derive(Debug, Serialize)]
pub struct RelationEntry {
    pub direction: Direction,
    pub relation: String,
    pub weight: f64,
    pub other: RelationTarget,
}

#[derive(Debug, Serialize)]
pub struct RelationTarget {
    pub id: String,
    pub kind: String,
    pub preview: String,
}

#[derive(Debug, Serialize)]
pub struct LogEntry {
    pub operation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub created_at: String,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Hybrid recall: vector KNN + FTS5 BM25 → RRF → filter → rerank → budget → track.
pub fn recall_by_query(
    conn: &Connection,
    query_embedding: &[f32],
    query_text: &str,
    filter: &SearchFilter,
    config: &SearchConfig,
    counter: &dyn TokenCounter,
) -> Result<RecallResponse> {
    let candidate_limit = config.max_results.max(1) * 3;

    let vec_hits = vector_search(conn, query_embedding, candidate_limit)?;
    let fts_hits = fts_search(conn, query_text, candidate_limit)?;
    let fused = rrf_merge(&vec_hits, &fts_hits, config.rrf_k);

    let ids: Vec<&str> = fused.iter().map(|(id, _)| id.as_str()).collect();
    let mut memories = fetch_memories(conn, &ids)?;

    let candidates: Vec<(Memory, f64)> = fused
        .iter()
        .filter_map(|(id, score)| memories.remove(id.as_str()).map(|m| (m, *score)))
        .filter(|(m, _)| passes_filter(m, filter))
        .collect();
    let total_matched = candidates.len();

    let ranked = rerank(
        candidates,
        &filter.requester,
        &config.rerank,
        chrono::Utc::now(),
    );

    let mut token_sum = 0usize;
    let mut results: Vec<SearchResult> = Vec::new();
    for (memory, score, breakdown) in ranked {
        let tokens = counter.count(&memory.content);
        // The best hit is always returned, even when it alone busts the budget.
        if !results.is_empty() && token_sum + tokens > config.token_budget {
            break;
        }
        token_sum += tokens;
        results.push(to_result(memory, score, breakdown));
        if results.len() >= config.max_results {
            break;
        }
    }

    let returned: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
    update_access(conn, &returned)?;

    tracing::debug!(
        vector = vec_hits.len(),
        keyword = fts_hits.len(),
        matched = total_matched,
        returned = results.len(),
        "recall by query"
    );

    Ok(RecallResponse {
        results,
        total_matched,
        token_estimate: token_sum,
    })
}

/// Hydrate memories by id in input order. Unknown ids are skipped.
pub fn recall_by_ids(
    conn: &Connection,
    ids: &[String],
    counter: &dyn TokenCounter,
) -> Result<RecallResponse> {
    let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    let mut memories = fetch_memories(conn, &id_refs)?;

    let mut token_sum = 0usize;
    let mut results = Vec::new();
    for id in ids {
        if let Some(memory) = memories.remove(id.as_str()) {
            token_sum += counter.count(&memory.content);
            results.push(to_result(memory, 1.0, ScoreBreakdown::default()));
        }
    }

    let returned: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
    update_access(conn, &returned)?;

    Ok(RecallResponse {
        total_matched: results.len(),
        results,
        token_estimate: token_sum,
    })
}

/// Compact previews for progressive disclosure.
pub fn to_summary(response: &RecallResponse) -> RecallSummaryResponse {
    let results: Vec<SummaryResult> = response
        .results
        .iter()
        .map(|r| SummaryResult {
            id: r.id.clone(),
            kind: r.kind,
            preview: truncate_preview(&r.content, 80),
            score: r.score,
        })
        .collect();

    // preview plus id/kind/score framing
    let token_estimate = results.iter().map(|r| r.preview.len() / 4 + 10).sum();

    RecallSummaryResponse {
        results,
        total_matched: response.total_matched,
        token_estimate,
    }
}

/// Full view of one memory. Another agent's private memory reads as not
/// found, and relation entries only show memories `requester` may see.
pub fn inspect_memory(
    conn: &Connection,
    memory_id: &str,
    requester: Option<&str>,
    include_relations: bool,
    include_log: bool,
) -> Result<InspectResponse> {
    let memory = conn
        .query_row(
            &format!("SELECT {MEMORY_COLUMNS} FROM memories WHERE id = ?1"),
            params![memory_id],
            memory_from_row,
        )
        .optional()?
        .filter(|m| {
            m.visibility == Visibility::Shared || requester == Some(m.agent_id.as_str())
        })
        .ok_or_else(|| anyhow!("memory not found: {memory_id}"))?;

    let relations = if include_relations {
        Some(relations_of(conn, memory_id, requester)?)
    } else {
        None
    };

    let log = if include_log {
        let mut stmt = conn.prepare(
            "SELECT operation, details, created_at FROM memory_log \
             WHERE memory_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![memory_id], |row| {
                let details: Option<String> = row.get(1)?;
                Ok(LogEntry {
                    operation: row.get(0)?,
                    details: details.and_then(|s| serde_json::from_str(&s).ok()),
                    created_at: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Some(rows)
    } else {
        None
    };

    Ok(InspectResponse {
        memory,
        relations,
        log,
    })
}

// ── Internal helpers ──────────────────────────────────────────────────────────

fn passes_filter(memory: &Memory, filter: &SearchFilter) -> bool {
    if memory.superseded_by.is_some() {
        return false;
    }
    if memory.visibility == Visibility::Private
        && filter.requester.agent_id.as_deref() != Some(memory.agent_id.as_str())
    {
        return false;
    }
    if filter.kind.is_some_and(|k| k != memory.kind) {
        return false;
    }
    if let Some(category) = &filter.category {
        if memory.category.as_ref() != Some(category) {
            return false;
        }
    }
    memory.confidence >= filter.min_confidence
}

fn to_result(memory: Memory, score: f64, breakdown: ScoreBreakdown) -> SearchResult {
    SearchResult {
        id: memory.id,
        kind: memory.kind,
        content: memory.content,
        agent_id: memory.agent_id,
        category: memory.category,
        confidence: memory.confidence,
        score,
        breakdown,
        created_at: memory.created_at,
        metadata: memory.metadata,
    }
}

fn relations_of(
    conn: &Connection,
    memory_id: &str,
    requester: Option<&str>,
) -> Result<Vec<RelationEntry>> {
    let mut stmt = conn.prepare(
        "SELECT 'outgoing', r.relation, r.weight, m.id, m.kind, m.content \
         FROM memory_relations r JOIN memories m ON r.target_id = m.id \
         WHERE r.source_id = ?1 AND (m.visibility = 'shared' OR m.agent_id = ?2) \
         UNION ALL \
         SELECT 'incoming', r.relation, r.weight, m.id, m.kind, m.content \
         FROM memory_relations r JOIN memories m ON r.source_id = m.id \
         WHERE r.target_id = ?1 AND (m.visibility = 'shared' OR m.agent_id = ?2)",
    )?;
    let rows = stmt
        .query_map(params![memory_id, requester], |row| {
            let direction: String = row.get(0)?;
            let content: String = row.get(5)?;
            Ok(RelationEntry {
                direction: if direction == "outgoing" {
                    Direction::Outgoing
                } else {
                    Direction::Incoming
                },
                relation: row.get(1)?,
                weight: row.get(2)?,
                other: RelationTarget {
                    id: row.get(3)?,
                    kind: row.get(4)?,
                    preview: truncate_preview(&content, 100),
                },
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Vector KNN via sqlite-vec, nearest first.
fn vector_search(conn: &Connection, embedding: &[f32], limit: usize) -> Result<Vec<(String, f64)>> {
    let mut stmt = conn.prepare(
        "SELECT id, distance FROM memories_vec \
         WHERE embedding MATCH ?1 ORDER BY distance LIMIT ?2",
    )?;
    let hits = stmt
        .query_map(
            params![super::embedding_to_bytes(embedding), limit as i64],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)),
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(hits)
}

/// FTS5 BM25 search, best first (FTS5 rank is more negative for better hits).
fn fts_search(conn: &Connection, query_text: &str, limit: usize) -> Result<Vec<(String, f64)>> {
    let escaped = escape_fts_query(query_text);
    if escaped.is_empty() {
        return Ok(Vec::new());
    }
    let mut stmt = conn.prepare(
        "SELECT id, rank FROM memories_fts WHERE memories_fts MATCH ?1 ORDER BY rank LIMIT ?2",
    )?;
    let hits = stmt
        .query_map(params![escaped, limit as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(hits)
}

/// Quote every whitespace token so user input cannot hit FTS5 syntax.
/// Terms are OR-ed: hybrid recall wants partial keyword matches too.
fn escape_fts_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|word| word.replace('"', ""))
        .filter(|w| !w.is_empty())
        .map(|w| format!("\"{w}\""))
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// Reciprocal Rank Fusion over the two ranked lists, best first.
/// Ties break by id so the order is deterministic.
fn rrf_merge(
    vec_hits: &[(String, f64)],
    fts_hits: &[(String, f64)],
    k: usize,
) -> Vec<(String, f64)> {
    let mut scores: HashMap<&str, f64> = HashMap::new();
    for list in [vec_hits, fts_hits] {
        for (rank, (id, _)) in list.iter().enumerate() {
            *scores.entry(id.as_str()).or_insert(0.0) += 1.0 / (k as f64 + rank as f64 + 1.0);
        }
    }

    let mut merged: Vec<(String, f64)> = scores
        .into_iter()
        .map(|(id, s)| (id.to_string(), s))
        .collect();
    merged.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    merged
}

fn fetch_memories(conn: &Connection, ids: &[&str]) -> Result<HashMap<String, Memory>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "SELECT {MEMORY_COLUMNS} FROM memories WHERE id IN ({})",
        placeholders.join(", ")
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(ids.iter()), memory_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows.into_iter().map(|m| (m.id.clone(), m)).collect())
}

fn update_access(conn: &Connection, ids: &[&str]) -> Result<()> {
    if ids.is_empty() {
        return Ok(());
    }
    let now = chrono::Utc::now().to_rfc3339();
    let mut stmt = conn.prepare(
        "UPDATE memories SET access_count = access_count + 1, last_accessed = ?1 WHERE id = ?2",
    )?;
    for id in ids {
        stmt.execute(params![now, id])?;
    }
    Ok(())
}
