//! Configuration management for the RAG chat orchestrator
//!
//! Supports loading configuration from:
//! - YAML/TOML/JSON files (`config/default`, `config/{env}`)
//! - Environment variables (RAGCHAT_ prefix, `__` separator)

pub mod constants;
pub mod settings;

pub use settings::{
    load_settings, load_settings_from, EmbeddingConfig, LlmSettings, ObservabilityConfig, PersistenceConfig,
    RagConfig, RuntimeEnvironment, ServerConfig, SessionConfig, Settings, StageModelConfig,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Environment error: {0}")]
    Environment(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl From<ConfigError> for ragchat_core::Error {
    fn from(err: ConfigError) -> Self {
        ragchat_core::Error::Config(err.to_string())
    }
}
