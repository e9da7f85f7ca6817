//! ONNX Runtime embedder for all-MiniLM-L6-v2.
//!
//! Expects `model.onnx` and `tokenizer.json` under the configured cache dir
//! (`cognee model download` fetches them). Output is attention-masked mean
//! pooling of the last hidden state, L2-normalized.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::{Encoding, PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

use super::{l2_normalize, EmbeddingProvider, EMBEDDING_DIM};
use crate::config::{expand_tilde, EmbeddingConfig};

/// all-MiniLM-L6-v2 was trained on sequences of at most 256 word pieces.
const MAX_SEQ_LEN: usize = 256;

pub struct LocalEmbeddingProvider {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    model: String,
}

/// Input tensors in row-major `[batch, seq]` layout.
struct EncodedBatch {
    batch: usize,
    seq: usize,
    ids: Vec<i64>,
    mask: Vec<i64>,
}

pub fn model_files(config: &EmbeddingConfig) -> (PathBuf, PathBuf) {
    let dir = expand_tilde(&config.cache_dir);
    (dir.join("model.onnx"), dir.join("tokenizer.json"))
}

fn load_tokenizer(path: &Path) -> Result<Tokenizer> {
    let mut tokenizer = Tokenizer::from_file(path)
        .map_err(|e| anyhow::anyhow!("failed to load tokenizer {}: {e}", path.display()))?;
    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length: MAX_SEQ_LEN,
            ..Default::default()
        }))
        .map_err(|e| anyhow::anyhow!("failed to configure truncation: {e}"))?;
    tokenizer.with_padding(Some(PaddingParams {
        strategy: PaddingStrategy::BatchLongest,
        ..Default::default()
    }));
    Ok(tokenizer)
}

impl LocalEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model_path, tokenizer_path) = model_files(config);
        for path in [&model_path, &tokenizer_path] {
            anyhow::ensure!(
                path.exists(),
                "{} not found. Run `cognee model download` first.",
                path.display()
            );
        }

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(&model_path)
            .context("failed to load ONNX model")?;
        let tokenizer = load_tokenizer(&tokenizer_path)?;

        tracing::info!(model = %model_path.display(), "ONNX embedding model loaded");

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            model: config.model.clone(),
        })
    }

    fn encode(&self, texts: &[&str]) -> Result<EncodedBatch> {
        let encodings: Vec<Encoding> = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow::anyhow!("tokenization failed: {e}"))?;

        let seq = encodings.first().map(|e| e.get_ids().len()).unwrap_or(0);
        let mut ids = Vec::with_capacity(encodings.len() * seq);
        let mut mask = Vec::with_capacity(encodings.len() * seq);
        for enc in &encodings {
            ids.extend(enc.get_ids().iter().map(|&id| i64::from(id)));
            mask.extend(enc.get_attention_mask().iter().map(|&m| i64::from(m)));
        }

        Ok(EncodedBatch {
            batch: encodings.len(),
            seq,
            ids,
            mask,
        })
    }
}

/// Masked mean over the sequence axis of a `[batch, seq, dim]` buffer.
fn mean_pool(hidden: &[f32], input: &EncodedBatch, out_seq: usize, dim: usize) -> Vec<Vec<f32>> {
    (0..input.batch)
        .map(|b| {
            let mut pooled = vec![0.0f32; dim];
            let mut weight = 0.0f32;
            for s in 0..out_seq.min(input.seq) {
                if input.mask[b * input.seq + s] == 0 {
                    continue;
                }
                let row = &hidden[(b * out_seq + s) * dim..][..dim];
                pooled.iter_mut().zip(row).for_each(|(acc, x)| *acc += x);
                weight += 1.0;
            }
            if weight > 0.0 {
                pooled.iter_mut().for_each(|x| *x /= weight);
            }
            l2_normalize(&mut pooled);
            pooled
        })
        .collect()
}

impl EmbeddingProvider for LocalEmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text])?
            .pop()
            .context("embedding batch returned no vectors")
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let input = self.encode(texts)?;
        let shape = vec![input.batch as i64, input.seq as i64];
        let ids = Tensor::from_array((shape.clone(), input.ids.clone().into_boxed_slice()))?;
        let mask = Tensor::from_array((shape.clone(), input.mask.clone().into_boxed_slice()))?;
        let type_ids = Tensor::from_array((
            shape,
            vec![0i64; input.batch * input.seq].into_boxed_slice(),
        ))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow::anyhow!("ONNX session lock poisoned: {e}"))?;
        let outputs = session.run(ort::inputs! {
            "input_ids" => ids,
            "attention_mask" => mask,
            "token_type_ids" => type_ids,
        })?;

        // Export names differ between conversions of the same model.
        let hidden = outputs
            .get("last_hidden_state")
            .or_else(|| outputs.get("token_embeddings"))
            .unwrap_or_else(|| &outputs[0]);
        let (out_shape, data) = hidden
            .try_extract_tensor::<f32>()
            .context("failed to read hidden-state tensor")?;

        let dims: &[i64] = &out_shape;
        anyhow::ensure!(
            dims.len() == 3 && dims[2] == EMBEDDING_DIM as i64,
            "unexpected hidden-state shape {dims:?}, expected [batch, seq, {EMBEDDING_DIM}]"
        );

        Ok(mean_pool(data, &input, dims[1] as usize, EMBEDDING_DIM))
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
