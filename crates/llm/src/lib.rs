//! Completion backends for the RAG chat orchestrator
//!
//! Features:
//! - Ollama and OpenAI-compatible single-prompt backends
//! - Retry with exponential backoff for transient failures, inside a per-call
//!   deadline enforced by the `LanguageModel` adapter
//! - Per-stage provider selection at startup

pub mod adapter;
pub mod backend;
pub mod factory;

pub use adapter::{LanguageModelAdapter, RetryPolicy};
pub use backend::{BackendConfig, Completion, LlmBackend, OllamaBackend, OpenAIBackend};
pub use factory::{LlmFactory, LlmProvider, LlmProviderConfig};

use thiserror::Error;

/// LLM errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout")]
    Timeout,

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<LlmError> for ragchat_core::Error {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Network(msg) => ragchat_core::Error::CapabilityUnavailable(msg),
            LlmError::Timeout => ragchat_core::Error::CapabilityUnavailable("completion timed out".to_string()),
            LlmError::InvalidResponse(msg) => ragchat_core::Error::Parse(msg),
            LlmError::Configuration(msg) => ragchat_core::Error::Config(msg),
            other => ragchat_core::Error::Llm(other.to_string()),
        }
    }
}
