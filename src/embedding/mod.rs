//! Text-to-vector embedding.
//!
//! [`EmbeddingProvider`] is the seam between the memory engine and whatever turns
//! text into vectors. Two implementations ship: [`hashing::HashingEmbeddingProvider`]
//! (deterministic, offline) and [`local::LocalEmbeddingProvider`] (ONNX
//! all-MiniLM-L6-v2). Both produce L2-normalized vectors of [`EMBEDDING_DIM`].

pub mod hashing;
pub mod local;

use anyhow::Result;

use crate::config::EmbeddingConfig;

/// Dimension of every stored vector; fixed by the `memories_vec` table.
pub const EMBEDDING_DIM: usize = 384;

/// Synchronous embedding interface. Async callers go through
/// `tokio::task::spawn_blocking` for the ONNX provider.
pub trait EmbeddingProvider: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimensions(&self) -> usize {
        EMBEDDING_DIM
    }

    /// Identifier recorded in `schema_meta` so a model switch can be detected.
    fn model_id(&self) -> &str;
}

pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "hashing" => Ok(Box::new(hashing::HashingEmbeddingProvider::new())),
        "local" => Ok(Box::new(local::LocalEmbeddingProvider::new(config)?)),
        other => anyhow::bail!("unknown embedding provider: {other}. Supported: hashing, local"),
    }
}

/// L2-normalize in place. Zero vectors are left untouched.
pub(crate) fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l2_normalize_produces_unit_vector() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn l2_normalize_keeps_zero_vector() {
        let mut v = vec![0.0; 4];
        l2_normalize(&mut v);
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn create_provider_rejects_unknown_name() {
        let config = EmbeddingConfig {
            provider: "openai".into(),
            ..EmbeddingConfig::default()
        };
        let err = create_provider(&config).err().unwrap();
        assert!(err.to_string().contains("unknown embedding provider"));
    }

    #[test]
    fn create_provider_builds_hashing() {
        let provider = create_provider(&EmbeddingConfig::default()).unwrap();
        assert_eq!(provider.dimensions(), EMBEDDING_DIM);
        assert_eq!(provider.model_id(), hashing::MODEL_ID);
    }
}
