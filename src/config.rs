//! TOML configuration.
//!
//! All settings are read from a single file (default `./config/rrag.toml`).
//! Only `[paths]` and `[server]` are required; every other section falls
//! back to defaults that reproduce a local, single-machine setup.
//!
//! ```toml
//! [paths]
//! upload_dir = "./uploaded_files"
//! record_dir = "./csv_files"
//!
//! [server]
//! bind = "127.0.0.1:8000"
//! ```

use anyhow::{bail, Context, Result};
use globset::Glob;
use resume_rag_core::chunk::DEFAULT_CHUNK_SIZE;
use resume_rag_core::index::Metric;
use resume_rag_core::query::DEFAULT_TOP_K;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub paths: PathsConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    /// Watched input directory; uploads land here.
    pub upload_dir: PathBuf,
    /// One normalized record per input file is written here.
    pub record_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Quiet period after the last write event before a file is read.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    /// File-name patterns accepted from the upload directory.
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
}

impl IngestConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            settle_ms: default_settle_ms(),
            include_globs: default_include_globs(),
        }
    }
}

fn default_settle_ms() -> u64 {
    100
}

fn default_include_globs() -> Vec<String> {
    vec!["*.pdf".to_string(), "*.doc".to_string(), "*.docx".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters; overlap is a tenth of this.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
        }
    }
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub metric: Metric,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            metric: Metric::default(),
        }
    }
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL (Ollama only).
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

fn default_embedding_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    /// Chat-completions endpoint; defaults per provider.
    #[serde(default)]
    pub url: Option<String>,
    /// Environment variable holding the API key; defaults per provider.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_generation_retries")]
    pub max_retries: u32,
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: default_generation_model(),
            url: None,
            api_key_env: None,
            max_retries: default_generation_retries(),
            timeout_secs: default_generation_timeout(),
        }
    }
}

fn default_generation_provider() -> String {
    "groq".to_string()
}
fn default_generation_model() -> String {
    "llama3-8b-8192".to_string()
}
fn default_generation_retries() -> u32 {
    3
}
fn default_generation_timeout() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

impl Config {
    /// Configuration rooted at `dir`, with embeddings and generation
    /// disabled. Used by commands that run without a config file.
    pub fn minimal(dir: &Path) -> Self {
        Self {
            paths: PathsConfig {
                upload_dir: dir.join("uploaded_files"),
                record_dir: dir.join("csv_files"),
            },
            ingest: IngestConfig::default(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig {
                provider: "disabled".to_string(),
                ..EmbeddingConfig::default()
            },
            generation: GenerationConfig {
                provider: "disabled".to_string(),
                ..GenerationConfig::default()
            },
            server: ServerConfig {
                bind: "127.0.0.1:8000".to_string(),
            },
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }

    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }

    for pattern in &config.ingest.include_globs {
        Glob::new(pattern)
            .with_context(|| format!("ingest.include_globs: invalid pattern '{}'", pattern))?;
    }

    match config.embedding.provider.as_str() {
        "disabled" | "local" => {}
        "openai" | "ollama" => {
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }

    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    match config.generation.provider.as_str() {
        "disabled" | "groq" | "openai" => {}
        other => bail!(
            "Unknown generation provider: '{}'. Must be disabled, groq, or openai.",
            other
        ),
    }

    Ok(())
}
