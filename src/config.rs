use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct CogneeConfig {
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub rerank: RerankConfig,
    pub rate_limit: RateLimitConfig,
    pub tokens: TokenConfig,
    pub ingest: IngestConfig,
    pub maintenance: MaintenanceConfig,
    pub coordination: CoordinationConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, used when `RUST_LOG` is unset.
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
    /// Agent that owns memories stored without an explicit `--agent`.
    pub default_agent: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `"hashing"` (offline, deterministic) or `"local"` (ONNX all-MiniLM-L6-v2).
    pub provider: String,
    pub model: String,
    pub cache_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub default_max_results: usize,
    pub token_budget: usize,
    pub rrf_k: usize,
    pub dedup_threshold: f64,
    pub min_confidence: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RerankConfig {
    pub relevance_weight: f64,
    pub recency_weight: f64,
    pub personalization_weight: f64,
    pub confidence_weight: f64,
    pub recency_half_life_hours: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
    pub tokens_per_minute: u32,
    pub burst_requests: u32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TokenConfig {
    /// Optional HuggingFace `tokenizer.json`; falls back to the character heuristic.
    pub tokenizer_path: Option<String>,
    pub chars_per_token: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IngestConfig {
    pub chunk_token_limit: usize,
    pub summary_token_budget: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MaintenanceConfig {
    pub decay_factor: f64,
    pub event_decay_factor: f64,
    pub cleanup_confidence_floor: f64,
    pub cleanup_no_access_days: u64,
    pub compaction_age_days: u64,
    pub compaction_min_group_size: usize,
    pub summary_token_budget: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CoordinationConfig {
    pub quorum: f64,
    pub approval_threshold: f64,
    pub min_keyword_overlap: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_cognee_dir()
            .join("memory.db")
            .to_string_lossy()
            .into_owned();
        Self {
            db_path,
            default_agent: "default".into(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        let cache_dir = default_cognee_dir()
            .join("models")
            .to_string_lossy()
            .into_owned();
        Self {
            provider: "hashing".into(),
            model: "all-MiniLM-L6-v2".into(),
            cache_dir,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_max_results: 5,
            token_budget: 4000,
            rrf_k: 60,
            dedup_threshold: 0.92,
            min_confidence: 0.1,
        }
    }
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            relevance_weight: 0.6,
            recency_weight: 0.2,
            personalization_weight: 0.15,
            confidence_weight: 0.05,
            recency_half_life_hours: 168.0,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 50,
            tokens_per_minute: 40_000,
            burst_requests: 10,
        }
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            tokenizer_path: None,
            chars_per_token: 4.0,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_token_limit: 256,
            summary_token_budget: 200,
        }
    }
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            decay_factor: 0.98,
            event_decay_factor: 0.95,
            cleanup_confidence_floor: 0.05,
            cleanup_no_access_days: 90,
            compaction_age_days: 30,
            compaction_min_group_size: 5,
            summary_token_budget: 300,
        }
    }
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            quorum: 0.5,
            approval_threshold: 0.5,
            min_keyword_overlap: 1,
        }
    }
}

/// Returns `~/.cognee/`, or `./.cognee` when no home directory is known.
pub fn default_cognee_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".cognee")
}

/// Returns the default config file path: `~/.cognee/config.toml`
pub fn default_config_path() -> PathBuf {
    default_cognee_dir().join("config.toml")
}

impl CogneeConfig {
    /// Load the config from the default path, or defaults if the file is missing.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path. A missing file yields the defaults.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("no config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&contents).context("failed to parse config TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make downstream components misbehave.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.retrieval.dedup_threshold),
            "retrieval.dedup_threshold must be within [0, 1]"
        );
        anyhow::ensure!(
            self.rerank.recency_half_life_hours > 0.0,
            "rerank.recency_half_life_hours must be positive"
        );
        anyhow::ensure!(
            self.tokens.chars_per_token > 0.0,
            "tokens.chars_per_token must be positive"
        );
        anyhow::ensure!(
            self.rate_limit.burst_requests > 0 && self.rate_limit.requests_per_minute > 0,
            "rate_limit request settings must be positive"
        );
        anyhow::ensure!(
            self.rate_limit.tokens_per_minute > 0,
            "rate_limit.tokens_per_minute must be positive"
        );
        anyhow::ensure!(
            self.ingest.chunk_token_limit > 0,
            "ingest.chunk_token_limit must be positive"
        );
        Ok(())
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
