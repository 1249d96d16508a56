//! Configuration parsing and validation.
//!
//! The core is configured via a TOML file (or built programmatically by the
//! host). Sections:
//! - `[store]` — SQLite database path
//! - `[embedding]` — provider selection and HTTP/retry tuning
//! - `[indexing]` — chunker mode and budgets
//! - `[search]` — ranking defaults and hybrid-search behavior

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("refseek.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `local` | `openai` | `google` | `generic`
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Model identifier passed to the provider. Provider-specific default
    /// when unset.
    #[serde(default)]
    pub model: Option<String>,
    /// Bearer token / API key for HTTP providers.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Base URL for the `generic` provider.
    #[serde(default)]
    pub api_endpoint: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Per-embed deadline. Cold-start models may need warm-up, hence the
    /// generous default.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            api_key: None,
            api_endpoint: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    16
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    /// `abstract` (summary-only) | `full` (summary plus section chunks)
    #[serde(default = "default_indexing_mode")]
    pub mode: String,
    /// Token cap per chunk.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    /// Global chunk cap per item, summary included.
    #[serde(default = "default_max_chunks")]
    pub max_chunks_per_paper: usize,
    /// Exclude `item_type = "book"` from indexing and retrieval.
    #[serde(default = "default_true")]
    pub exclude_books: bool,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            mode: default_indexing_mode(),
            max_tokens: default_max_tokens(),
            max_chunks_per_paper: default_max_chunks(),
            exclude_books: default_true(),
        }
    }
}

fn default_indexing_mode() -> String {
    "abstract".to_string()
}
fn default_max_tokens() -> usize {
    2000
}
fn default_max_chunks() -> usize {
    8
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    /// Default size of the final result list.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Minimum MaxSim cosine, in percent. 30 means 0.30.
    #[serde(default = "default_min_similarity_percent")]
    pub min_similarity_percent: u32,
    /// `hybrid` | `semantic` | `keyword`
    #[serde(default = "default_search_mode")]
    pub mode: String,
    /// Derive the semantic weight from query-shape analysis.
    #[serde(default = "default_true")]
    pub auto_adjust_weights: bool,
    /// Semantic weight `w_s` when auto-adjust is off; keyword weight is
    /// `1 - w_s`.
    #[serde(default = "default_semantic_weight")]
    pub semantic_weight: f64,
    /// Size of the keyword ranking fed into fusion.
    #[serde(default = "default_keyword_top_k")]
    pub keyword_top_k: usize,
    /// Rank-fusion constant `k` in `w / (k + rank)`.
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_similarity_percent: default_min_similarity_percent(),
            mode: default_search_mode(),
            auto_adjust_weights: default_true(),
            semantic_weight: default_semantic_weight(),
            keyword_top_k: default_keyword_top_k(),
            rrf_k: default_rrf_k(),
        }
    }
}

fn default_top_k() -> usize {
    20
}
fn default_min_similarity_percent() -> u32 {
    30
}
fn default_search_mode() -> String {
    "hybrid".to_string()
}
fn default_semantic_weight() -> f64 {
    0.5
}
fn default_keyword_top_k() -> usize {
    50
}
fn default_rrf_k() -> f64 {
    60.0
}

impl SearchConfig {
    /// Minimum similarity as a fraction.
    pub fn min_similarity(&self) -> f32 {
        self.min_similarity_percent as f32 / 100.0
    }
}

/// Load and validate a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::InvalidConfig(format!("failed to read config file {}: {}", path.display(), e))
    })?;

    let config: Config = toml::from_str(&content)
        .map_err(|e| Error::InvalidConfig(format!("failed to parse config file: {}", e)))?;

    validate(&config)?;
    Ok(config)
}

/// Validate a config built programmatically or loaded from disk.
pub fn validate(config: &Config) -> Result<()> {
    match config.embedding.provider.as_str() {
        "local" | "openai" | "google" | "generic" => {}
        other => {
            return Err(Error::InvalidConfig(format!(
                "unknown embedding provider '{}'. Must be local, openai, google, or generic.",
                other
            )))
        }
    }

    match config.embedding.provider.as_str() {
        "openai" | "google" => {
            if config.embedding.api_key.as_deref().unwrap_or("").is_empty() {
                return Err(Error::InvalidConfig(format!(
                    "embedding.api_key is required for the '{}' provider",
                    config.embedding.provider
                )));
            }
        }
        "generic" => {
            if config
                .embedding
                .api_endpoint
                .as_deref()
                .unwrap_or("")
                .is_empty()
            {
                return Err(Error::InvalidConfig(
                    "embedding.api_endpoint is required for the 'generic' provider".to_string(),
                ));
            }
        }
        _ => {}
    }

    match config.indexing.mode.as_str() {
        "abstract" | "full" => {}
        other => {
            return Err(Error::InvalidConfig(format!(
                "unknown indexing mode '{}'. Must be abstract or full.",
                other
            )))
        }
    }

    if config.indexing.max_tokens == 0 {
        return Err(Error::InvalidConfig(
            "indexing.max_tokens must be > 0".to_string(),
        ));
    }
    if config.indexing.max_chunks_per_paper == 0 {
        return Err(Error::InvalidConfig(
            "indexing.max_chunks_per_paper must be >= 1".to_string(),
        ));
    }

    match config.search.mode.as_str() {
        "hybrid" | "semantic" | "keyword" => {}
        other => {
            return Err(Error::InvalidConfig(format!(
                "unknown search mode '{}'. Must be hybrid, semantic, or keyword.",
                other
            )))
        }
    }

    if config.search.top_k == 0 {
        return Err(Error::InvalidConfig(
            "search.top_k must be >= 1".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&config.search.semantic_weight) {
        return Err(Error::InvalidConfig(
            "search.semantic_weight must be in [0.0, 1.0]".to_string(),
        ));
    }
    if config.search.min_similarity_percent > 100 {
        return Err(Error::InvalidConfig(
            "search.min_similarity_percent must be in [0, 100]".to_string(),
        ));
    }

    Ok(())
}
