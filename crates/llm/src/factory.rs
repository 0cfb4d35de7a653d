//! LLM Factory
//!
//! Resolves the completion backend for each pipeline stage once, at startup.
//! Components only ever see `Arc<dyn LanguageModel>`.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use ragchat_config::{LlmSettings, StageModelConfig};
use ragchat_core::LanguageModel;

use crate::{
    adapter::{LanguageModelAdapter, RetryPolicy},
    backend::{BackendConfig, OllamaBackend, OpenAIBackend},
    LlmError,
};

/// LLM provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    /// Local models
    Ollama,
    /// OpenAI and OpenAI-compatible servers
    OpenAI,
}

impl FromStr for LlmProvider {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" | "local" => Ok(Self::Ollama),
            "openai" | "gpt" => Ok(Self::OpenAI),
            _ => Err(LlmError::Configuration(format!("Unknown LLM provider: {}", s))),
        }
    }
}

/// Fully resolved backend settings for one stage
#[derive(Debug, Clone)]
pub struct LlmProviderConfig {
    pub provider: LlmProvider,
    pub api_key: Option<String>,
    pub endpoint: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Deadline for one `generate` call, retries included
    pub timeout: Duration,
    pub max_retries: u32,
}

impl LlmProviderConfig {
    /// Combine shared connection settings with one stage's model.
    ///
    /// Returns `Ok(None)` when the stage has no completion backend.
    pub fn for_stage(
        settings: &LlmSettings,
        stage: &StageModelConfig,
    ) -> Result<Option<Self>, LlmError> {
        if !stage.is_enabled() {
            return Ok(None);
        }

        let provider: LlmProvider = stage.provider.parse()?;
        let endpoint = match provider {
            LlmProvider::Ollama => settings.endpoint.clone(),
            LlmProvider::OpenAI => settings.openai_endpoint.clone(),
        };

        Ok(Some(Self {
            provider,
            api_key: settings.api_key.clone(),
            endpoint,
            model: stage.model.clone(),
            max_tokens: stage.max_tokens,
            temperature: stage.temperature,
            timeout: Duration::from_millis(settings.timeout_ms),
            max_retries: settings.max_retries,
        }))
    }
}

/// Builds `LanguageModel`s from resolved configs
pub struct LlmFactory;

impl LlmFactory {
    pub fn create(config: &LlmProviderConfig) -> Result<Arc<dyn LanguageModel>, LlmError> {
        let retry = RetryPolicy::new(config.max_retries);
        let backend_config = BackendConfig {
            model: config.model.clone(),
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            attempt_timeout: retry.attempt_timeout(config.timeout),
        };

        let model: Arc<dyn LanguageModel> = match config.provider {
            LlmProvider::Ollama => Arc::new(LanguageModelAdapter::new(
                OllamaBackend::new(backend_config)?,
                config.timeout,
                retry,
            )),
            LlmProvider::OpenAI => Arc::new(LanguageModelAdapter::new(
                OpenAIBackend::new(backend_config)?,
                config.timeout,
                retry,
            )),
        };
        Ok(model)
    }

    /// Create the model for one pipeline stage.
    ///
    /// Misconfiguration is logged and yields `None` so the stage runs on its
    /// fallback instead of failing startup.
    pub fn for_stage(
        name: &str,
        settings: &LlmSettings,
        stage: &StageModelConfig,
    ) -> Option<Arc<dyn LanguageModel>> {
        let config = match LlmProviderConfig::for_stage(settings, stage) {
            Ok(Some(config)) => config,
            Ok(None) => {
                tracing::info!(stage = name, "No completion backend configured, using fallback");
                return None;
            }
            Err(e) => {
                tracing::warn!(stage = name, error = %e, "Invalid LLM config, using fallback");
                return None;
            }
        };

        match Self::create(&config) {
            Ok(model) => {
                tracing::info!(
                    stage = name,
                    provider = ?config.provider,
                    model = %config.model,
                    "Completion backend ready"
                );
                Some(model)
            }
            Err(e) => {
                tracing::warn!(stage = name, error = %e, "Failed to create LLM backend, using fallback");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> LlmSettings {
        LlmSettings {
            endpoint: "http://ollama:11434".to_string(),
            openai_endpoint: "https://api.openai.com/v1".to_string(),
            api_key: None,
            timeout_ms: 1500,
            ..LlmSettings::default()
        }
    }

    #[test]
    fn test_provider_parse() {
        assert_eq!("ollama".parse::<LlmProvider>().unwrap(), LlmProvider::Ollama);
        assert_eq!("OpenAI".parse::<LlmProvider>().unwrap(), LlmProvider::OpenAI);
        assert_eq!("gpt".parse::<LlmProvider>().unwrap(), LlmProvider::OpenAI);
        assert!("none".parse::<LlmProvider>().is_err());
        assert!("invalid".parse::<LlmProvider>().is_err());
    }

    #[test]
    fn test_stage_config_disabled() {
        let stage = StageModelConfig::disabled();
        assert!(LlmProviderConfig::for_stage(&settings(), &stage).unwrap().is_none());
        assert!(LlmFactory::for_stage("response", &settings(), &stage).is_none());
    }

    #[test]
    fn test_stage_config_uses_shared_connection() {
        let stage = StageModelConfig {
            model: "mistral".to_string(),
            temperature: 0.2,
            ..Default::default()
        };

        let config = LlmProviderConfig::for_stage(&settings(), &stage).unwrap().unwrap();
        assert_eq!(config.provider, LlmProvider::Ollama);
        assert_eq!(config.endpoint, "http://ollama:11434");
        assert_eq!(config.model, "mistral");
        assert_eq!(config.timeout, Duration::from_millis(1500));
    }

    #[test]
    fn test_stage_config_unknown_provider() {
        let stage = StageModelConfig {
            provider: "mystery".to_string(),
            ..Default::default()
        };
        assert!(LlmProviderConfig::for_stage(&settings(), &stage).is_err());
    }

    #[test]
    fn test_create_ollama() {
        let stage = StageModelConfig {
            model: "llama3.2".to_string(),
            ..Default::default()
        };
        let model = LlmFactory::for_stage("response", &settings(), &stage).unwrap();
        assert_eq!(model.model_name(), "llama3.2");
    }

    #[test]
    fn test_openai_without_key_falls_back() {
        let stage = StageModelConfig {
            provider: "openai".to_string(),
            ..Default::default()
        };
        let config = LlmProviderConfig::for_stage(&settings(), &stage).unwrap().unwrap();
        assert!(LlmFactory::create(&config).is_err());
        assert!(LlmFactory::for_stage("evaluation", &settings(), &stage).is_none());
    }
}
