//! Configuration System
//!
//! Hierarchical configuration loading from:
//! - `config.toml` (default configuration)
//! - `config.local.toml` (git-ignored local overrides)
//! - Environment variables (`RAGWEAVE_*` prefix)
//!
//! ## Example
//!
//! ```toml
//! [catalog]
//! sqlite_path = "conf/sqlite/knowledge_base.sqlite"
//!
//! [http]
//! host = "0.0.0.0"
//! port = 8080
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! RAGWEAVE_HTTP__PORT=9090
//! RAGWEAVE_CATALOG__SQLITE_PATH=/custom/path.sqlite
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub catalog: CatalogConfig,
    pub vector: VectorConfig,
    pub inverted: InvertedConfig,
    pub graph: GraphConfig,
    pub llm: LlmConfig,
    pub http: HttpConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Metadata catalog storage (C1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub sqlite_path: PathBuf,
    #[serde(default = "default_file_dir")]
    pub file_dir: PathBuf,
    #[serde(default = "default_lightrag_dir")]
    pub graph_ingest_dir: PathBuf,
    #[serde(default = "default_discussion_dir")]
    pub discussion_dir: PathBuf,
    #[serde(default = "default_sandbox_dir")]
    pub sandbox_dir: PathBuf,
}

fn default_file_dir() -> PathBuf {
    PathBuf::from("conf/file")
}
fn default_lightrag_dir() -> PathBuf {
    PathBuf::from("lightrag_data")
}
fn default_discussion_dir() -> PathBuf {
    PathBuf::from("discussion")
}
fn default_sandbox_dir() -> PathBuf {
    PathBuf::from("conf/tmp/sandbox_files")
}

/// Dense-vector index backend (C2). A feature-flagged capability: when
/// `enabled` is false every operation becomes a documented no-op returning
/// empty results, per the "capability interface" redesign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,
    #[serde(default = "default_hnsw_m")]
    pub hnsw_max_neighbors: usize,
    #[serde(default = "default_hnsw_ef")]
    pub hnsw_ef_construction: usize,
}

fn default_embedding_dim() -> usize {
    1536
}
fn default_hnsw_m() -> usize {
    16
}
fn default_hnsw_ef() -> usize {
    200
}

/// Inverted (hybrid text + vector) index backend (C3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvertedConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_child_chunk_size")]
    pub child_chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_rrf_k")]
    pub rrf_k: u32,
}

fn default_child_chunk_size() -> usize {
    1024
}
fn default_chunk_overlap() -> usize {
    128
}
fn default_rrf_k() -> u32 {
    60
}

/// Graph store backend (C4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Opaque chat/embedding model service (external collaborator).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_sandbox_timeout")]
    pub sandbox_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_max_retries() -> u32 {
    3
}
fn default_sandbox_timeout() -> u64 {
    30
}

/// Pipeline-wide concurrency and resource tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_chart_cap")]
    pub max_charts: usize,
    #[serde(default = "default_indicator_cap_bytes")]
    pub indicator_cap_bytes: usize,
}

fn default_heartbeat_secs() -> u64 {
    3
}
fn default_idle_timeout_secs() -> u64 {
    300
}
fn default_chart_cap() -> usize {
    5
}
fn default_indicator_cap_bytes() -> usize {
    50 * 1024
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            heartbeat_interval_secs: default_heartbeat_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            max_charts: default_chart_cap(),
            indicator_cap_bytes: default_indicator_cap_bytes(),
        }
    }
}

/// HTTP transport (C6 framing lives on top of this).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Allowed browser origins; the family `http://*:5173` is always
    /// permitted in addition to these, matching the local dev client.
    #[serde(default)]
    pub cors_origins: Vec<String>,
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_shutdown_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig { level: default_log_level(), format: default_log_format() }
    }
}

impl Config {
    /// Merges, in order: `config.toml`, `config.local.toml`, then
    /// `RAGWEAVE_*` environment variables (double-underscore nested keys).
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("config.toml"))
            .merge(Toml::file("config.local.toml"))
            .merge(Env::prefixed("RAGWEAVE_").split("__"))
            .extract()
    }

    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("RAGWEAVE_").split("__"))
            .extract()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            catalog: CatalogConfig {
                sqlite_path: PathBuf::from("conf/sqlite/knowledge_base.sqlite"),
                file_dir: default_file_dir(),
                graph_ingest_dir: default_lightrag_dir(),
                discussion_dir: default_discussion_dir(),
                sandbox_dir: default_sandbox_dir(),
            },
            vector: VectorConfig {
                enabled: true,
                embedding_dim: default_embedding_dim(),
                hnsw_max_neighbors: default_hnsw_m(),
                hnsw_ef_construction: default_hnsw_ef(),
            },
            inverted: InvertedConfig {
                enabled: true,
                child_chunk_size: default_child_chunk_size(),
                chunk_overlap: default_chunk_overlap(),
                rrf_k: default_rrf_k(),
            },
            graph: GraphConfig { enabled: true },
            llm: LlmConfig {
                enabled: true,
                base_url: default_base_url(),
                api_key: String::new(),
                chat_model: default_chat_model(),
                embedding_model: default_embedding_model(),
                max_retries: default_max_retries(),
                sandbox_timeout_secs: default_sandbox_timeout(),
            },
            http: HttpConfig {
                host: default_host(),
                port: default_port(),
                cors_origins: vec!["http://localhost:5173".to_string()],
                shutdown_timeout_secs: default_shutdown_timeout(),
            },
            pipeline: PipelineConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_paths() {
        let config = Config::default();
        assert_eq!(config.catalog.sqlite_path, PathBuf::from("conf/sqlite/knowledge_base.sqlite"));
        assert!(config.vector.enabled);
        assert_eq!(config.inverted.rrf_k, 60);
    }

    #[test]
    fn config_serialization_round_trips() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let back: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(back.http.port, config.http.port);
    }
}
