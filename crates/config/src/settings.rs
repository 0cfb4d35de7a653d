//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::constants::{endpoints, llm, models, rag, session};
use crate::ConfigError;

/// Runtime environment enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    /// Development mode - relaxed validation, warnings only
    #[default]
    Development,
    /// Staging mode - stricter validation
    Staging,
    /// Production mode - all validations enforced
    Production,
}

impl RuntimeEnvironment {
    /// Check if this is a production environment
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Runtime environment (development, staging, production)
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Completion backends, one model per pipeline stage
    #[serde(default)]
    pub llm: LlmSettings,

    /// Embedding backend
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Retrieval and fusion
    #[serde(default)]
    pub rag: RagConfig,

    /// Session context cache
    #[serde(default)]
    pub session: SessionConfig,

    /// Persistence configuration (ScyllaDB)
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_llm()?;
        self.validate_rag()?;
        self.validate_session()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        let server = &self.server;

        if server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                message: "Port cannot be 0".to_string(),
            });
        }

        if server.timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.timeout_seconds".to_string(),
                message: "Timeout must be at least 1 second".to_string(),
            });
        }

        if self.environment.is_production() && server.cors_enabled && server.cors_origins.is_empty()
        {
            tracing::warn!(
                "CORS is enabled in production but no origins are configured. \
                 This may block legitimate requests."
            );
        }

        Ok(())
    }

    fn validate_llm(&self) -> Result<(), ConfigError> {
        let llm = &self.llm;

        if llm.timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "llm.timeout_ms".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        for (stage, cfg) in llm.stages() {
            if !matches!(cfg.provider.to_lowercase().as_str(), "ollama" | "openai" | "none") {
                return Err(ConfigError::InvalidValue {
                    field: format!("llm.{}.provider", stage),
                    message: format!(
                        "Unknown provider '{}', expected ollama, openai or none",
                        cfg.provider
                    ),
                });
            }

            if !(0.0..=2.0).contains(&cfg.temperature) {
                return Err(ConfigError::InvalidValue {
                    field: format!("llm.{}.temperature", stage),
                    message: format!("Must be between 0.0 and 2.0, got {}", cfg.temperature),
                });
            }

            if cfg.provider.eq_ignore_ascii_case("openai") && llm.api_key.is_none() {
                tracing::warn!(
                    stage,
                    "OpenAI provider configured without llm.api_key; calls will fall back"
                );
            }
        }

        Ok(())
    }

    fn validate_rag(&self) -> Result<(), ConfigError> {
        let rag = &self.rag;

        // RRF k must be positive
        if rag.rrf_k <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "rag.rrf_k".to_string(),
                message: format!("Must be positive, got {}", rag.rrf_k),
            });
        }

        if rag.top_k == 0 {
            return Err(ConfigError::InvalidValue {
                field: "rag.top_k".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if rag.retrieval_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "rag.retrieval_timeout_ms".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        // A turn has to finish before the HTTP layer gives up on it
        let request_timeout_ms = self.server.timeout_seconds.saturating_mul(1000);
        if rag.turn_budget_ms == 0 || rag.turn_budget_ms >= request_timeout_ms {
            return Err(ConfigError::InvalidValue {
                field: "rag.turn_budget_ms".to_string(),
                message: format!(
                    "Must be between 1 and server.timeout_seconds ({} ms), got {}",
                    request_timeout_ms, rag.turn_budget_ms
                ),
            });
        }

        Ok(())
    }

    fn validate_session(&self) -> Result<(), ConfigError> {
        let session = &self.session;

        if session.summarization_threshold > session.max_context_length {
            return Err(ConfigError::InvalidValue {
                field: "session.summarization_threshold".to_string(),
                message: format!(
                    "Cannot be larger than max_context_length ({})",
                    session.max_context_length
                ),
            });
        }

        if session.summary_chunk_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "session.summary_chunk_size".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if session.max_summary_depth == 0 {
            return Err(ConfigError::InvalidValue {
                field: "session.max_summary_depth".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if session.session_timeout_secs == 0 || session.cleanup_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "session".to_string(),
                message: "Timeout and cleanup interval must be at least 1 second".to_string(),
            });
        }

        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// CORS allowed origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_timeout() -> u64 {
    120
}
fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_seconds: default_timeout(),
            cors_enabled: true,
            cors_origins: Vec::new(),
        }
    }
}

/// Completion model for one pipeline stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageModelConfig {
    /// Provider: "ollama", "openai" or "none"
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model name
    #[serde(default = "default_completion_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_provider() -> String {
    "ollama".to_string()
}
fn default_completion_model() -> String {
    models::COMPLETION_DEFAULT.to_string()
}
fn default_temperature() -> f32 {
    llm::TEMPERATURE
}
fn default_max_tokens() -> u32 {
    llm::MAX_TOKENS
}

impl Default for StageModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_completion_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl StageModelConfig {
    /// Stage config with no completion backend
    pub fn disabled() -> Self {
        Self {
            provider: "none".to_string(),
            ..Default::default()
        }
    }

    /// Whether a backend should be built for this stage
    pub fn is_enabled(&self) -> bool {
        !self.provider.eq_ignore_ascii_case("none")
    }
}

/// Completion backend settings, shared connection params plus per-stage models
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    /// Ollama endpoint
    #[serde(default = "default_ollama_endpoint")]
    pub endpoint: String,

    /// OpenAI-compatible endpoint
    #[serde(default = "default_openai_endpoint")]
    pub openai_endpoint: String,

    /// API key for OpenAI-compatible providers
    #[serde(default = "default_openai_api_key")]
    pub api_key: Option<String>,

    /// Per-call timeout in milliseconds
    #[serde(default = "default_llm_timeout_ms")]
    pub timeout_ms: u64,

    /// Retries for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default)]
    pub decomposition: StageModelConfig,

    #[serde(default)]
    pub multiquery: StageModelConfig,

    #[serde(default)]
    pub response: StageModelConfig,

    #[serde(default)]
    pub evaluation: StageModelConfig,

    #[serde(default)]
    pub summarization: StageModelConfig,
}

fn default_ollama_endpoint() -> String {
    std::env::var("OLLAMA_BASE_URL").unwrap_or_else(|_| endpoints::OLLAMA_DEFAULT.to_string())
}
fn default_openai_endpoint() -> String {
    endpoints::OPENAI_DEFAULT.to_string()
}
fn default_openai_api_key() -> Option<String> {
    std::env::var("OPENAI_API_KEY").ok()
}
fn default_llm_timeout_ms() -> u64 {
    llm::TIMEOUT_MS
}
fn default_max_retries() -> u32 {
    llm::MAX_RETRIES
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            endpoint: default_ollama_endpoint(),
            openai_endpoint: default_openai_endpoint(),
            api_key: default_openai_api_key(),
            timeout_ms: default_llm_timeout_ms(),
            max_retries: default_max_retries(),
            decomposition: StageModelConfig::default(),
            multiquery: StageModelConfig::default(),
            response: StageModelConfig::default(),
            evaluation: StageModelConfig::default(),
            summarization: StageModelConfig::default(),
        }
    }
}

impl LlmSettings {
    /// All stages with their names
    pub fn stages(&self) -> [(&'static str, &StageModelConfig); 5] {
        [
            ("decomposition", &self.decomposition),
            ("multiquery", &self.multiquery),
            ("response", &self.response),
            ("evaluation", &self.evaluation),
            ("summarization", &self.summarization),
        ]
    }
}

/// Embedding backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider: "ollama" or "none"
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Embedding model
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding endpoint
    #[serde(default = "default_ollama_endpoint")]
    pub endpoint: String,
}

fn default_embedding_model() -> String {
    std::env::var("EMBEDDINGS_MODEL").unwrap_or_else(|_| models::EMBEDDING_DEFAULT.to_string())
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_embedding_model(),
            endpoint: default_ollama_endpoint(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        !self.provider.eq_ignore_ascii_case("none")
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    /// Enable vector retrieval
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Qdrant endpoint URL
    #[serde(default = "default_qdrant_endpoint")]
    pub qdrant_endpoint: String,

    /// Qdrant collection name
    #[serde(default = "default_qdrant_collection")]
    pub qdrant_collection: String,

    /// Qdrant API key (optional, for cloud deployments)
    #[serde(default)]
    pub qdrant_api_key: Option<String>,

    /// Nearest chunks fetched per query
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Reciprocal Rank Fusion smoothing constant
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f64,

    /// Per-query embed+search timeout in milliseconds
    #[serde(default = "default_retrieval_timeout_ms")]
    pub retrieval_timeout_ms: u64,

    /// Maximum related chunks pulled in by context expansion
    #[serde(default = "default_expansion_limit")]
    pub expansion_limit: usize,

    /// Wall-clock budget for one chat turn in milliseconds; stages that
    /// would start after it runs out take their fallback instead
    #[serde(default = "default_turn_budget_ms")]
    pub turn_budget_ms: u64,
}

fn default_qdrant_endpoint() -> String {
    endpoints::QDRANT_DEFAULT.to_string()
}
fn default_qdrant_collection() -> String {
    "documents".to_string()
}
fn default_top_k() -> usize {
    rag::DEFAULT_TOP_K
}
fn default_rrf_k() -> f64 {
    rag::RRF_K
}
fn default_retrieval_timeout_ms() -> u64 {
    rag::RETRIEVAL_TIMEOUT_MS
}
fn default_expansion_limit() -> usize {
    rag::EXPANSION_LIMIT
}
fn default_turn_budget_ms() -> u64 {
    rag::TURN_BUDGET_MS
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            qdrant_endpoint: default_qdrant_endpoint(),
            qdrant_collection: default_qdrant_collection(),
            qdrant_api_key: None,
            top_k: default_top_k(),
            rrf_k: default_rrf_k(),
            retrieval_timeout_ms: default_retrieval_timeout_ms(),
            expansion_limit: default_expansion_limit(),
            turn_budget_ms: default_turn_budget_ms(),
        }
    }
}

/// Session context cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Idle seconds before a cache entry is evicted
    #[serde(default = "default_session_timeout")]
    pub session_timeout_secs: u64,

    /// Minimum seconds between cleanup passes
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,

    /// Hard ceiling on context length (chars)
    #[serde(default = "default_max_context_length")]
    pub max_context_length: usize,

    /// Context length above which history is summarized (chars)
    #[serde(default = "default_summarization_threshold")]
    pub summarization_threshold: usize,

    /// Messages per summarization chunk
    #[serde(default = "default_summary_chunk_size")]
    pub summary_chunk_size: usize,

    /// Hard cap on summarization passes
    #[serde(default = "default_max_summary_depth")]
    pub max_summary_depth: usize,

    /// Messages loaded from history when building context
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_session_timeout() -> u64 {
    session::SESSION_TIMEOUT_SECS
}
fn default_cleanup_interval() -> u64 {
    session::CLEANUP_INTERVAL_SECS
}
fn default_max_context_length() -> usize {
    session::MAX_CONTEXT_LENGTH
}
fn default_summarization_threshold() -> usize {
    session::SUMMARIZATION_THRESHOLD
}
fn default_summary_chunk_size() -> usize {
    session::SUMMARY_CHUNK_SIZE
}
fn default_max_summary_depth() -> usize {
    session::MAX_SUMMARY_DEPTH
}
fn default_history_limit() -> usize {
    session::HISTORY_LIMIT
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_timeout_secs: default_session_timeout(),
            cleanup_interval_secs: default_cleanup_interval(),
            max_context_length: default_max_context_length(),
            summarization_threshold: default_summarization_threshold(),
            summary_chunk_size: default_summary_chunk_size(),
            max_summary_depth: default_max_summary_depth(),
            history_limit: default_history_limit(),
        }
    }
}

/// Persistence configuration for ScyllaDB
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Enable ScyllaDB persistence (false = in-memory only)
    #[serde(default)]
    pub enabled: bool,

    /// ScyllaDB host addresses
    #[serde(default = "default_scylla_hosts")]
    pub scylla_hosts: Vec<String>,

    /// ScyllaDB keyspace name
    #[serde(default = "default_scylla_keyspace")]
    pub keyspace: String,

    /// ScyllaDB replication factor
    #[serde(default = "default_replication_factor")]
    pub replication_factor: u8,
}

fn default_scylla_hosts() -> Vec<String> {
    std::env::var("SCYLLA_HOSTS")
        .map(|s| s.split(',').map(|h| h.trim().to_string()).collect())
        .unwrap_or_else(|_| vec!["127.0.0.1:9042".to_string()])
}

fn default_scylla_keyspace() -> String {
    std::env::var("SCYLLA_KEYSPACE").unwrap_or_else(|_| "ragchat".to_string())
}

fn default_replication_factor() -> u8 {
    1
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: false, // Disabled by default for development
            scylla_hosts: default_scylla_hosts(),
            keyspace: default_scylla_keyspace(),
            replication_factor: default_replication_factor(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,

    /// Enable Prometheus metrics at /metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: true,
        }
    }
}

/// Load settings from `config/` and the environment
///
/// Priority: env vars > config/{env}.* > config/default.* > defaults
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    load_settings_from(Path::new("config"), env)
}

/// Load settings from an explicit config directory
pub fn load_settings_from(config_dir: &Path, env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    // Load default config
    let default_path = config_dir.join("default");
    builder = builder.add_source(File::with_name(&default_path.to_string_lossy()).required(false));

    // Load environment-specific config
    if let Some(env_name) = env {
        let env_path = config_dir.join(env_name);
        builder = builder.add_source(File::with_name(&env_path.to_string_lossy()).required(false));
    }

    // Load from environment variables
    builder = builder.add_source(
        Environment::with_prefix("RAGCHAT")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    // Validate
    settings.validate()?;

    Ok(settings)
}
