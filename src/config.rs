use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub reranker: RerankerConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Path to the SQLite database file holding this collection.
    pub path: PathBuf,
    /// Collection name, e.g. `github_repos` or `comms_docs`.
    pub collection: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    /// Chunks shorter than this (after trimming) are dropped as junk.
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,
    /// Number of chunks embedded and upserted per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            min_chars: default_min_chars(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_chunk_size() -> usize {
    1500
}
fn default_chunk_overlap() -> usize {
    150
}
fn default_min_chars() -> usize {
    100
}
fn default_batch_size() -> usize {
    100
}

/// Per-source overrides for the chunking parameters.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ChunkOverrides {
    pub chunk_size: Option<usize>,
    pub chunk_overlap: Option<usize>,
    pub min_chars: Option<usize>,
}

/// Fully resolved chunking parameters handed to a source.
#[derive(Debug, Clone, Copy)]
pub struct ChunkSpec {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub min_chars: usize,
}

impl ChunkingConfig {
    pub fn resolve(&self, overrides: &ChunkOverrides) -> ChunkSpec {
        ChunkSpec {
            chunk_size: overrides.chunk_size.unwrap_or(self.chunk_size),
            chunk_overlap: overrides.chunk_overlap.unwrap_or(self.chunk_overlap),
            min_chars: overrides.min_chars.unwrap_or(self.min_chars),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Nearest neighbors kept from the dense (embedding) channel.
    #[serde(default = "default_candidate_k")]
    pub k_dense: usize,
    /// Top lexical matches kept from the BM25 channel.
    #[serde(default = "default_candidate_k")]
    pub k_sparse: usize,
    #[serde(default = "default_weight")]
    pub dense_weight: f32,
    #[serde(default = "default_weight")]
    pub sparse_weight: f32,
    /// Results returned after reranking.
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k_dense: default_candidate_k(),
            k_sparse: default_candidate_k(),
            dense_weight: default_weight(),
            sparse_weight: default_weight(),
            top_n: default_top_n(),
        }
    }
}

fn default_candidate_k() -> usize {
    10
}
fn default_weight() -> f32 {
    0.5
}
fn default_top_n() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `hashed`, `openai`, or `disabled`.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Override for the embeddings endpoint (OpenAI-compatible servers).
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_embed_batch")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            endpoint: None,
            batch_size: default_embed_batch(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "hashed".to_string()
}
fn default_embed_batch() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RerankerConfig {
    /// `lexical` or `http` (TEI-style `/rerank` endpoint).
    #[serde(default = "default_reranker_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_rerank_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            provider: default_reranker_provider(),
            model: None,
            endpoint: None,
            max_retries: default_rerank_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_reranker_provider() -> String {
    "lexical".to_string()
}
fn default_rerank_retries() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SourcesConfig {
    pub github: Option<GithubSourceConfig>,
    pub web: Option<WebSourceConfig>,
    pub local: Option<LocalSourceConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GithubSourceConfig {
    /// Repositories as `owner/repo`.
    pub repos: Vec<String>,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(flatten)]
    pub chunking: ChunkOverrides,
}

impl GithubSourceConfig {
    /// Repository chunks keep any non-blank content unless a minimum is set
    /// explicitly; the global junk filter targets prose sources, and code
    /// files legitimately produce short chunks.
    pub fn chunk_spec(&self, base: &ChunkingConfig) -> ChunkSpec {
        let mut spec = base.resolve(&self.chunking);
        if self.chunking.min_chars.is_none() {
            spec.min_chars = 0;
        }
        spec
    }
}

fn default_branch() -> String {
    "main".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebSourceConfig {
    pub urls: Vec<String>,
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
    #[serde(flatten)]
    pub chunking: ChunkOverrides,
}

fn default_fetch_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct LocalSourceConfig {
    pub dir: PathBuf,
    #[serde(default = "default_extension")]
    pub extension: String,
    #[serde(flatten)]
    pub chunking: ChunkOverrides,
}

fn default_extension() -> String {
    "md".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.store.collection.trim().is_empty() {
        anyhow::bail!("store.collection must not be empty");
    }

    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.chunk_overlap must be smaller than chunking.chunk_size");
    }
    if config.chunking.batch_size == 0 {
        anyhow::bail!("chunking.batch_size must be > 0");
    }
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }

    if config.retrieval.top_n == 0 {
        anyhow::bail!("retrieval.top_n must be >= 1");
    }
    if config.retrieval.dense_weight < 0.0 || config.retrieval.sparse_weight < 0.0 {
        anyhow::bail!("retrieval weights must be non-negative");
    }
    if config.retrieval.dense_weight + config.retrieval.sparse_weight <= 0.0 {
        anyhow::bail!("at least one retrieval weight must be > 0");
    }

    match config.embedding.provider.as_str() {
        "hashed" | "disabled" => {}
        "openai" => {
            if config.embedding.model.is_none() {
                anyhow::bail!("embedding.model must be set when provider is 'openai'");
            }
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                anyhow::bail!("embedding.dims must be > 0 when provider is 'openai'");
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be hashed, openai, or disabled.",
            other
        ),
    }

    match config.reranker.provider.as_str() {
        "lexical" => {}
        "http" => {
            if config.reranker.endpoint.is_none() {
                anyhow::bail!("reranker.endpoint must be set when provider is 'http'");
            }
        }
        other => anyhow::bail!(
            "Unknown reranker provider: '{}'. Must be lexical or http.",
            other
        ),
    }

    Ok(config)
}
