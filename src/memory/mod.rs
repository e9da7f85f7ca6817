//! Memory engine: write path, hybrid recall, re-ranking, graph links,
//! deletion, statistics, maintenance, and document ingestion.

pub mod forget;
pub mod ingest;
pub mod maintenance;
pub mod relations;
pub mod rerank;
pub mod search;
pub mod stats;
pub mod store;
pub mod types;

/// View an f32 slice as the little-endian bytes sqlite-vec expects.
pub fn embedding_to_bytes(embedding: &[f32]) -> &[u8] {
    unsafe {
        std::slice::from_raw_parts(
            embedding.as_ptr() as *const u8,
            std::mem::size_of_val(embedding),
        )
    }
}

pub fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// vec0 reports L2 distance; for unit vectors `d = sqrt(2 - 2·cos)`.
pub(crate) fn cosine_threshold_to_l2(cosine: f64) -> f64 {
    (2.0 - 2.0 * cosine).max(0.0).sqrt()
}

/// Truncate on a char boundary, appending "..." when shortened.
pub(crate) fn truncate_preview(content: &str, max_bytes: usize) -> String {
    if content.len() <= max_bytes {
        return content.to_string();
    }
    let end = content
        .char_indices()
        .map(|(i, _)| i)
        .take_while(|i| *i <= max_bytes)
        .last()
        .unwrap_or(0);
    format!("{}...", &content[..end])
}
