//! Ollama Embeddings
//!
//! Uses Ollama's embedding API for generating dense vectors.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use ragchat_config::{
    constants::{endpoints, models, rag},
    EmbeddingConfig,
};
use ragchat_core::Embedder;

use crate::RagError;

/// Ollama embedding configuration
#[derive(Debug, Clone)]
pub struct OllamaEmbeddingConfig {
    /// Ollama API endpoint
    pub endpoint: String,
    /// Model name
    pub model: String,
    /// HTTP request timeout
    pub timeout: Duration,
}

impl Default for OllamaEmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: endpoints::OLLAMA_DEFAULT.to_string(),
            model: models::EMBEDDING_DEFAULT.to_string(),
            timeout: Duration::from_millis(rag::RETRIEVAL_TIMEOUT_MS),
        }
    }
}

impl From<&EmbeddingConfig> for OllamaEmbeddingConfig {
    fn from(config: &EmbeddingConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            ..Default::default()
        }
    }
}

/// Request to Ollama embedding API
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

/// Response from Ollama embedding API
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Ollama embedder
pub struct OllamaEmbedder {
    client: Client,
    config: OllamaEmbeddingConfig,
}

impl OllamaEmbedder {
    /// Create a new Ollama embedder
    pub fn new(config: OllamaEmbeddingConfig) -> Result<Self, RagError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RagError::Connection(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn embed_url(&self) -> String {
        format!("{}/api/embed", self.config.endpoint.trim_end_matches('/'))
    }

    /// Embed a single text
    pub async fn embed_text(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let request = EmbedRequest {
            model: &self.config.model,
            input: text,
        };

        let response = self
            .client
            .post(self.embed_url())
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::Connection(format!("Ollama request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(RagError::Embedding(format!(
                "Ollama embedding failed: {} - {}",
                status, text
            )));
        }

        let embed_response: EmbedResponse = response
            .json()
            .await
            .map_err(|e| RagError::Embedding(format!("Failed to parse Ollama response: {}", e)))?;

        first_embedding(embed_response)
    }
}

fn first_embedding(response: EmbedResponse) -> Result<Vec<f32>, RagError> {
    response
        .embeddings
        .into_iter()
        .next()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| RagError::Embedding("No embedding returned".to_string()))
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> ragchat_core::Result<Vec<f32>> {
        Ok(self.embed_text(text).await?)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
