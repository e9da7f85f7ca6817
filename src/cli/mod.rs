pub mod coordination;
pub mod doctor;
pub mod ingest;
pub mod inspect;
pub mod maintenance;
pub mod search;
pub mod stats;
pub mod store;
pub mod text;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use std::path::Path;
use tokio::io::AsyncWriteExt;

use enhanced_cognee::config::{expand_tilde, CogneeConfig, EmbeddingConfig};
use enhanced_cognee::db::{self, migrations};
use enhanced_cognee::embedding::{self, EmbeddingProvider};

const MODEL_URL: &str =
    "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/onnx/model.onnx";
const TOKENIZER_URL: &str =
    "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/tokenizer.json";

/// Open the configured store and its embedding provider, recording which
/// model produced the stored vectors.
pub fn open_store(config: &CogneeConfig) -> Result<(Connection, Box<dyn EmbeddingProvider>)> {
    let conn = db::open_database(config.resolved_db_path())?;
    let provider = embedding::create_provider(&config.embedding)?;
    check_embedding_model(&conn, provider.model_id())?;
    Ok((conn, provider))
}

fn check_embedding_model(conn: &Connection, model_id: &str) -> Result<()> {
    let stored = migrations::get_embedding_model(conn)?;
    if stored.as_deref() == Some(model_id) {
        return Ok(());
    }
    let memories: i64 = conn.query_row("SELECT COUNT(*) FROM memories", [], |r| r.get(0))?;
    if memories == 0 || stored.is_none() {
        migrations::set_embedding_model(conn, model_id)?;
    } else {
        tracing::warn!(
            stored = stored.as_deref().unwrap_or_default(),
            configured = model_id,
            "stored vectors come from a different embedding model; recall quality will suffer"
        );
    }
    Ok(())
}

pub fn read_input(file: Option<&Path>, text: Option<&str>) -> Result<String> {
    match (file, text) {
        (Some(path), _) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        (None, Some(text)) => Ok(text.to_string()),
        (None, None) => anyhow::bail!("pass either a file or --text"),
    }
}

/// Download the ONNX embedding model and tokenizer to the cache directory.
pub async fn model_download(config: &EmbeddingConfig) -> Result<()> {
    let cache_dir = expand_tilde(&config.cache_dir);
    std::fs::create_dir_all(&cache_dir)
        .with_context(|| format!("failed to create cache dir: {}", cache_dir.display()))?;

    let (model_path, tokenizer_path) = embedding::local::model_files(config);

    for (url, dest, label) in [
        (MODEL_URL, &model_path, "model.onnx (~90MB)"),
        (TOKENIZER_URL, &tokenizer_path, "tokenizer.json"),
    ] {
        if dest.exists() {
            println!("Already present: {}", dest.display());
            continue;
        }
        println!("Downloading {label}...");
        download_file(url, dest).await?;
        println!("Saved to {}", dest.display());
    }

    println!("Model download complete. Set `provider = \"local\"` under [embedding] to use it.");
    Ok(())
}

/// Stream `url` into `dest` behind a progress bar; written to a temp file, then renamed.
async fn download_file(url: &str, dest: &Path) -> Result<()> {
    let mut response = reqwest::get(url)
        .await
        .with_context(|| format!("HTTP request failed for {url}"))?;

    anyhow::ensure!(
        response.status().is_success(),
        "download failed with HTTP {}",
        response.status()
    );

    let pb = match response.content_length() {
        Some(size) => {
            let pb = ProgressBar::new(size);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("  {bar:40.cyan/blue} {bytes}/{total_bytes} ({eta})")?
                    .progress_chars("##-"),
            );
            pb
        }
        None => ProgressBar::new_spinner(),
    };

    let tmp_path = dest.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp_path)
        .await
        .with_context(|| format!("failed to create temp file: {}", tmp_path.display()))?;

    while let Some(chunk) = response.chunk().await.context("error reading response")? {
        file.write_all(&chunk).await.context("error writing to file")?;
        pb.inc(chunk.len() as u64);
    }
    file.flush().await?;
    drop(file);

    tokio::fs::rename(&tmp_path, dest)
        .await
        .context("failed to rename temp file")?;

    pb.finish_and_clear();
    Ok(())
}

pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

pub fn preview(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        content.to_string()
    } else {
        let cut: String = content.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}
