//! Feature-hashing embedder.
//!
//! Every lowercased alphanumeric token is hashed with FNV-1a into one of
//! [`EMBEDDING_DIM`] buckets; a second hash bit picks the sign so unrelated
//! collisions tend to cancel. Texts sharing vocabulary get positive cosine
//! similarity, which is enough for keyword-grade recall without a model.

use anyhow::Result;

use super::{l2_normalize, EmbeddingProvider, EMBEDDING_DIM};

pub const MODEL_ID: &str = "hashing-fnv1a-384";

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

#[derive(Debug, Default, Clone, Copy)]
pub struct HashingEmbeddingProvider;

impl HashingEmbeddingProvider {
    pub fn new() -> Self {
        Self
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(FNV_PRIME)
    })
}

pub(crate) fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

impl EmbeddingProvider for HashingEmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = vec![0.0f32; EMBEDDING_DIM];
        for token in tokens(text) {
            let h = fnv1a(token.as_bytes());
            let bucket = (h % EMBEDDING_DIM as u64) as usize;
            let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }
        l2_normalize(&mut v);
        Ok(v)
    }

    fn model_id(&self) -> &str {
        MODEL_ID
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn embedding_is_deterministic_and_normalized() {
        let p = HashingEmbeddingProvider::new();
        let a = p.embed("Postgres stores the relational data").unwrap();
        let b = p.embed("Postgres stores the relational data").unwrap();
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn case_and_punctuation_do_not_matter() {
        let p = HashingEmbeddingProvider::new();
        let a = p.embed("Rate limiter, token bucket!").unwrap();
        let b = p.embed("rate LIMITER token bucket").unwrap();
        assert!(cosine(&a, &b) > 0.999);
    }

    #[test]
    fn shared_vocabulary_scores_higher() {
        let p = HashingEmbeddingProvider::new();
        let q = p.embed("vector search with qdrant").unwrap();
        let near = p.embed("qdrant handles vector search").unwrap();
        let far = p.embed("the weather is sunny today").unwrap();
        assert!(cosine(&q, &near) > cosine(&q, &far));
    }

    #[test]
    fn empty_text_yields_zero_vector() {
        let p = HashingEmbeddingProvider::new();
        let v = p.embed("   ").unwrap();
        assert_eq!(v.len(), EMBEDDING_DIM);
        assert!(v.iter().all(|x| *x == 0.0));
    }
}
