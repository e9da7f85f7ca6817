#![allow(dead_code)]

use enhanced_cognee::config::RerankConfig;
use enhanced_cognee::db;
use enhanced_cognee::memory::search::SearchConfig;
use enhanced_cognee::memory::store::store_memory;
use enhanced_cognee::memory::types::{MemoryKind, NewMemory};
use rusqlite::Connection;

pub const DEDUP_THRESHOLD: f64 = 0.92;

/// Open a fresh in-memory database with schema and migrations applied.
pub fn test_db() -> Connection {
    db::open_memory_database().unwrap()
}

/// Deterministic 384-dim embedding with a spike at position `seed`.
/// Distinct seeds give orthogonal vectors.
pub fn test_embedding(seed: u16) -> Vec<f32> {
    let mut v = vec![0.0f32; 384];
    v[seed as usize % 384] = 1.0;
    v
}

/// A unit vector with cosine similarity above 0.99 to `base`.
pub fn similar_embedding(base: &[f32]) -> Vec<f32> {
    let mut v = base.to_vec();
    for i in 0..5 {
        v[(i * 37) % 384] += 0.05;
    }
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    v.iter_mut().for_each(|x| *x /= norm);
    v
}

/// Store a memory with default visibility and full confidence. Returns its id.
pub fn insert_memory(
    conn: &mut Connection,
    content: &str,
    kind: MemoryKind,
    agent: &str,
    embedding: &[f32],
) -> String {
    store_memory(
        conn,
        &NewMemory::new(content, kind, agent),
        embedding,
        DEDUP_THRESHOLD,
    )
    .unwrap()
    .id
}

pub fn search_config(max_results: usize) -> SearchConfig {
    SearchConfig {
        max_results,
        token_budget: 2000,
        rrf_k: 60,
        rerank: RerankConfig::default(),
    }
}
