//! TOML configuration parsing and validation.
//!
//! Every section is optional; an empty file yields [`Config::default`].
//! Secrets (API keys) are read from the environment by the providers
//! that need them, never from this file.
//!
//! ```toml
//! [chunking]
//! chunk_size = 800
//! chunk_overlap = 100
//!
//! [retrieval]
//! max_results = 5
//!
//! [session]
//! window = 2
//!
//! [generation]
//! provider = "anthropic"
//! model = "claude-sonnet-4-20250514"
//! max_tool_rounds = 2
//!
//! [embedding]
//! provider = "hash"
//! dims = 384
//!
//! [store]
//! backend = "sqlite"
//! path = "./data/course-rag.sqlite"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::chunk::ChunkingParams;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub docs: DocsConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
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

impl ChunkingConfig {
    pub fn params(&self) -> ChunkingParams {
        ChunkingParams {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
        }
    }
}

fn default_chunk_size() -> usize {
    800
}
fn default_chunk_overlap() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Minimum cosine similarity for course-name resolution. Unset means
    /// the closest catalog entry always wins.
    #[serde(default)]
    pub resolve_min_similarity: Option<f32>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            resolve_min_similarity: None,
        }
    }
}

fn default_max_results() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    /// Maximum number of query/answer turns retained per session.
    #[serde(default = "default_window")]
    pub window: usize,
    /// Sessions kept in memory. Past this, the least recently used idle
    /// session is evicted.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
            max_sessions: default_max_sessions(),
        }
    }
}

fn default_window() -> usize {
    2
}
fn default_max_sessions() -> usize {
    10_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Per backend call.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Whole query, including every tool round.
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: default_generation_model(),
            max_tool_rounds: default_max_tool_rounds(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            query_timeout_secs: default_query_timeout_secs(),
            url: None,
        }
    }
}

fn default_generation_provider() -> String {
    "anthropic".to_string()
}
fn default_generation_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}
fn default_max_tool_rounds() -> usize {
    2
}
fn default_max_tokens() -> u32 {
    800
}
fn default_query_timeout_secs() -> u64 {
    90
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
    "hash".to_string()
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
pub struct StoreConfig {
    #[serde(default = "default_store_backend")]
    pub backend: String,
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: default_store_path(),
        }
    }
}

fn default_store_backend() -> String {
    "memory".to_string()
}
fn default_store_path() -> PathBuf {
    PathBuf::from("./data/course-rag.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocsConfig {
    #[serde(default = "default_docs_path")]
    pub path: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            path: default_docs_path(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_docs_path() -> PathBuf {
    PathBuf::from("./docs")
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*.txt".to_string()]
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
    "127.0.0.1:8000".to_string()
}

/// Log levels: a default plus per-target overrides. `RUST_LOG` wins over both.
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub default: String,
    #[serde(default)]
    pub modules: BTreeMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: BTreeMap::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Chunking
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        bail!(
            "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
            config.chunking.chunk_overlap,
            config.chunking.chunk_size
        );
    }

    // Retrieval
    if config.retrieval.max_results < 1 {
        bail!("retrieval.max_results must be >= 1");
    }
    if let Some(min) = config.retrieval.resolve_min_similarity {
        if !(-1.0..=1.0).contains(&min) {
            bail!("retrieval.resolve_min_similarity must be in [-1.0, 1.0]");
        }
    }

    // Sessions
    if config.session.window < 1 {
        bail!("session.window must be >= 1");
    }
    if config.session.max_sessions < 1 {
        bail!("session.max_sessions must be >= 1");
    }

    // Generation
    if config.generation.max_tool_rounds < 1 {
        bail!("generation.max_tool_rounds must be >= 1");
    }
    if config.generation.timeout_secs == 0 {
        bail!("generation.timeout_secs must be > 0");
    }
    if config.generation.query_timeout_secs == 0 {
        bail!("generation.query_timeout_secs must be > 0");
    }
    match config.generation.provider.as_str() {
        "anthropic" | "disabled" => {}
        other => bail!(
            "Unknown generation provider: '{}'. Must be anthropic or disabled.",
            other
        ),
    }

    // Embedding
    match config.embedding.provider.as_str() {
        "hash" | "local" => {}
        "openai" | "ollama" => {
            if config.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be hash, openai, ollama, or local.",
            other
        ),
    }
    if config.embedding.timeout_secs == 0 {
        bail!("embedding.timeout_secs must be > 0");
    }
    if config.embedding.dims == Some(0) {
        bail!("embedding.dims must be > 0");
    }

    // Store
    match config.store.backend.as_str() {
        "memory" | "sqlite" => {}
        other => bail!(
            "Unknown store backend: '{}'. Must be memory or sqlite.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let cfg = parse_config("").unwrap();
        assert_eq!(cfg.chunking.chunk_size, 800);
        assert_eq!(cfg.chunking.chunk_overlap, 100);
        assert_eq!(cfg.retrieval.max_results, 5);
        assert_eq!(cfg.retrieval.resolve_min_similarity, None);
        assert_eq!(cfg.session.window, 2);
        assert_eq!(cfg.generation.max_tool_rounds, 2);
        assert_eq!(cfg.generation.max_tokens, 800);
        assert_eq!(cfg.embedding.provider, "hash");
        assert_eq!(cfg.store.backend, "memory");
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        let err = parse_config("[chunking]\nchunk_size = 100\nchunk_overlap = 100\n").unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn test_zero_max_results_rejected() {
        assert!(parse_config("[retrieval]\nmax_results = 0\n").is_err());
    }

    #[test]
    fn test_zero_window_rejected() {
        assert!(parse_config("[session]\nwindow = 0\n").is_err());
    }

    #[test]
    fn test_zero_max_sessions_rejected() {
        assert!(parse_config("[session]\nmax_sessions = 0\n").is_err());
        assert_eq!(parse_config("").unwrap().session.max_sessions, 10_000);
    }

    #[test]
    fn test_zero_timeouts_rejected() {
        for toml in [
            "[generation]\ntimeout_secs = 0\n",
            "[generation]\nquery_timeout_secs = 0\n",
            "[embedding]\ntimeout_secs = 0\n",
        ] {
            let err = parse_config(toml).unwrap_err();
            assert!(err.to_string().contains("timeout_secs"), "{}", toml);
        }
        assert!(parse_config("[generation]\ntimeout_secs = 1\nquery_timeout_secs = 1\n").is_ok());
    }

    #[test]
    fn test_unknown_providers_rejected() {
        assert!(parse_config("[embedding]\nprovider = \"magic\"\n").is_err());
        assert!(parse_config("[generation]\nprovider = \"magic\"\n").is_err());
        assert!(parse_config("[store]\nbackend = \"redis\"\n").is_err());
    }

    #[test]
    fn test_openai_requires_model() {
        assert!(parse_config("[embedding]\nprovider = \"openai\"\n").is_err());
        assert!(parse_config(
            "[embedding]\nprovider = \"openai\"\nmodel = \"text-embedding-3-small\"\n"
        )
        .is_ok());
    }

    #[test]
    fn test_similarity_floor_range() {
        assert!(parse_config("[retrieval]\nresolve_min_similarity = 0.4\n").is_ok());
        assert!(parse_config("[retrieval]\nresolve_min_similarity = 1.5\n").is_err());
    }

    #[test]
    fn test_logging_modules() {
        let cfg = parse_config("[logging]\ndefault = \"warn\"\n[logging.modules]\ncourse_rag = \"debug\"\n")
            .unwrap();
        assert_eq!(cfg.logging.default, "warn");
        assert_eq!(cfg.logging.modules.get("course_rag").map(String::as_str), Some("debug"));
    }
}
