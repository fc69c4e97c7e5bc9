//! Layered configuration.
//!
//! Non-secret settings come from an optional TOML file; every section has
//! defaults, so a missing file is the same as an empty one. Secrets and a
//! few deployment overrides come from the environment (a `.env` file is
//! loaded by the binary before this runs).
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `GROQ_API_KEY` | chat-completion credentials |
//! | `PINECONE_API_KEY` | vector index credentials (pinecone provider) |
//! | `OPENAI_API_KEY` | embedding credentials (openai provider) |
//! | `CONVERSATION_STORE_URL` | overrides `history.url` |
//! | `SESSION_SECRET` / `FLASK_SECRET_KEY` | session cookie signing key |
//! | `MEDCHAT_BIND` | overrides `server.bind` |

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(skip)]
    pub secrets: Secrets,
}

/// Values that only ever come from the environment.
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    pub groq_api_key: Option<String>,
    pub pinecone_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub session_secret: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_llm_max_retries")]
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            base_url: default_llm_base_url(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout_secs(),
            max_retries: default_llm_max_retries(),
        }
    }
}

fn default_llm_provider() -> String {
    "groq".to_string()
}
fn default_llm_model() -> String {
    "llama-3.3-70b-versatile".to_string()
}
fn default_llm_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}
fn default_max_tokens() -> u32 {
    16384
}
fn default_llm_timeout_secs() -> u64 {
    120
}
fn default_llm_max_retries() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    /// Base URL for the ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
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
            model: default_embedding_model(),
            dims: default_dims(),
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "local".to_string()
}
fn default_embedding_model() -> String {
    "all-minilm-l6-v2".to_string()
}
fn default_dims() -> usize {
    384
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
pub struct IndexConfig {
    #[serde(default = "default_index_provider")]
    pub provider: String,
    #[serde(default = "default_index_name")]
    pub name: String,
    #[serde(default = "default_dims")]
    pub dimension: usize,
    #[serde(default = "default_metric")]
    pub metric: String,
    #[serde(default = "default_cloud")]
    pub cloud: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_control_url")]
    pub control_url: String,
    /// Database file for the sqlite provider.
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
    #[serde(default = "default_upsert_batch_size")]
    pub upsert_batch_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            provider: default_index_provider(),
            name: default_index_name(),
            dimension: default_dims(),
            metric: default_metric(),
            cloud: default_cloud(),
            region: default_region(),
            control_url: default_control_url(),
            path: default_index_path(),
            upsert_batch_size: default_upsert_batch_size(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_index_provider() -> String {
    "pinecone".to_string()
}
fn default_index_name() -> String {
    "medical-chatbot".to_string()
}
fn default_metric() -> String {
    "cosine".to_string()
}
fn default_cloud() -> String {
    "aws".to_string()
}
fn default_region() -> String {
    "us-east-1".to_string()
}
fn default_control_url() -> String {
    "https://api.pinecone.io".to_string()
}
fn default_index_path() -> PathBuf {
    PathBuf::from("./data/index.sqlite")
}
fn default_upsert_batch_size() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct HistoryConfig {
    /// `sqlite:` connection URL of the conversation store.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            url: None,
            ttl_secs: default_ttl_secs(),
        }
    }
}

/// Twelve hours.
fn default_ttl_secs() -> u64 {
    12 * 3600
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Fail with `empty_retrieval` instead of asking the model without context.
    #[serde(default)]
    pub require_context: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            require_context: false,
        }
    }
}

fn default_top_k() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    500
}
fn default_chunk_overlap() -> usize {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_ingest_root")]
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
    /// Use content-hash ids so re-ingestion overwrites instead of duplicating.
    #[serde(default)]
    pub dedup: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            root: default_ingest_root(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
            dedup: false,
        }
    }
}

fn default_ingest_root() -> PathBuf {
    PathBuf::from("./data")
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.pdf".to_string()]
}

impl Config {
    /// Chat-completion API key, required by `serve`.
    pub fn groq_api_key(&self) -> Result<&str, ConfigError> {
        self.secrets
            .groq_api_key
            .as_deref()
            .ok_or(ConfigError::Missing("GROQ_API_KEY"))
    }

    pub fn pinecone_api_key(&self) -> Result<&str, ConfigError> {
        self.secrets
            .pinecone_api_key
            .as_deref()
            .ok_or(ConfigError::Missing("PINECONE_API_KEY"))
    }

    pub fn openai_api_key(&self) -> Result<&str, ConfigError> {
        self.secrets
            .openai_api_key
            .as_deref()
            .ok_or(ConfigError::Missing("OPENAI_API_KEY"))
    }

    pub fn session_secret(&self) -> Result<&str, ConfigError> {
        self.secrets
            .session_secret
            .as_deref()
            .ok_or(ConfigError::Missing("SESSION_SECRET"))
    }

    pub fn history_url(&self) -> Result<&str, ConfigError> {
        self.history
            .url
            .as_deref()
            .ok_or(ConfigError::Missing("CONVERSATION_STORE_URL"))
    }

    /// Overlays environment values onto the file configuration.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        self.secrets.groq_api_key = get("GROQ_API_KEY");
        self.secrets.pinecone_api_key = get("PINECONE_API_KEY");
        self.secrets.openai_api_key = get("OPENAI_API_KEY");
        self.secrets.session_secret = get("SESSION_SECRET").or_else(|| get("FLASK_SECRET_KEY"));

        if let Some(url) = get("CONVERSATION_STORE_URL") {
            self.history.url = Some(url);
        }
        if let Some(bind) = get("MEDCHAT_BIND") {
            self.server.bind = bind;
        }
    }

    /// Checks cross-field invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunking.chunk_size == 0 {
            return Err(ConfigError::Invalid {
                key: "chunking.chunk_size",
                message: "must be > 0".into(),
            });
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(ConfigError::Invalid {
                key: "chunking.chunk_overlap",
                message: format!(
                    "must be smaller than chunk_size ({})",
                    self.chunking.chunk_size
                ),
            });
        }
        if self.retrieval.top_k == 0 {
            return Err(ConfigError::Invalid {
                key: "retrieval.top_k",
                message: "must be >= 1".into(),
            });
        }
        if self.embedding.batch_size == 0 {
            return Err(ConfigError::Invalid {
                key: "embedding.batch_size",
                message: "must be > 0".into(),
            });
        }
        if self.index.upsert_batch_size == 0 {
            return Err(ConfigError::Invalid {
                key: "index.upsert_batch_size",
                message: "must be > 0".into(),
            });
        }
        if self.embedding.dims != self.index.dimension {
            return Err(ConfigError::Invalid {
                key: "index.dimension",
                message: format!(
                    "{} does not match embedding.dims ({})",
                    self.index.dimension, self.embedding.dims
                ),
            });
        }
        if self.index.metric != "cosine" {
            return Err(ConfigError::Invalid {
                key: "index.metric",
                message: format!("unsupported metric '{}', only cosine", self.index.metric),
            });
        }

        match self.embedding.provider.as_str() {
            "local" | "openai" | "ollama" => {}
            other => {
                return Err(ConfigError::Invalid {
                    key: "embedding.provider",
                    message: format!("unknown provider '{}': local, openai or ollama", other),
                })
            }
        }
        match self.index.provider.as_str() {
            "pinecone" | "sqlite" => {}
            other => {
                return Err(ConfigError::Invalid {
                    key: "index.provider",
                    message: format!("unknown provider '{}': pinecone or sqlite", other),
                })
            }
        }
        match self.llm.provider.as_str() {
            "groq" => {}
            other => {
                return Err(ConfigError::Invalid {
                    key: "llm.provider",
                    message: format!("unknown provider '{}': groq", other),
                })
            }
        }

        Ok(())
    }
}

/// Reads the TOML file at `path` (defaults if it does not exist), overlays
/// the process environment, and validates the result.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config: Config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config file")?
    } else {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        Config::default()
    };

    config.apply_env(|key| std::env::var(key).ok());
    config.validate()?;

    Ok(config)
}
