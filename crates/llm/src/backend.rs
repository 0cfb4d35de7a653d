//! Completion backends
//!
//! One non-streaming HTTP round trip per call against Ollama or an
//! OpenAI-compatible server. Retries and the overall call deadline belong to
//! the adapter; a backend only enforces its per-attempt timeout.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use ragchat_core::FinishReason;

use crate::LlmError;

/// Timeout for availability checks
const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection and sampling parameters shared by both backends
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub model: String,
    /// Base URL; Ollama without `/api`, OpenAI-compatible including `/v1`
    pub endpoint: String,
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Bound on a single HTTP attempt
    pub attempt_timeout: Duration,
}

/// Reply from one attempt
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub finish_reason: FinishReason,
}

/// Single-attempt completion over HTTP
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<Completion, LlmError>;

    async fn is_available(&self) -> bool;

    fn model_name(&self) -> &str;
}

fn http_client(timeout: Duration) -> Result<Client, LlmError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| LlmError::Configuration(format!("Failed to create HTTP client: {}", e)))
}

/// Map the HTTP status, then decode the body.
///
/// 5xx and 429 come back as `Network` so the adapter retries them.
async fn read_json<T: DeserializeOwned>(response: Response, model: &str) -> Result<T, LlmError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(match status {
            StatusCode::NOT_FOUND => LlmError::ModelNotFound(model.to_string()),
            StatusCode::TOO_MANY_REQUESTS => LlmError::Network(format!("Rate limited: {}", body)),
            s if s.is_server_error() => LlmError::Network(format!("Server error {}: {}", s, body)),
            s => LlmError::Api(format!("HTTP {}: {}", s, body)),
        });
    }

    response
        .json()
        .await
        .map_err(|e| LlmError::InvalidResponse(e.to_string()))
}

fn finish_reason(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("length") => FinishReason::Length,
        _ => FinishReason::Stop,
    }
}

/// Ollama `/api/generate` backend
pub struct OllamaBackend {
    client: Client,
    config: BackendConfig,
}

impl OllamaBackend {
    pub fn new(config: BackendConfig) -> Result<Self, LlmError> {
        let client = http_client(config.attempt_timeout)?;
        Ok(Self { client, config })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api{}", self.config.endpoint.trim_end_matches('/'), path)
    }

    fn build_request<'a>(&'a self, prompt: &'a str) -> OllamaGenerateRequest<'a> {
        OllamaGenerateRequest {
            model: &self.config.model,
            prompt,
            stream: false,
            options: OllamaOptions {
                temperature: self.config.temperature,
                num_predict: self.config.max_tokens,
            },
        }
    }
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    async fn complete(&self, prompt: &str) -> Result<Completion, LlmError> {
        let response = self
            .client
            .post(self.api_url("/generate"))
            .json(&self.build_request(prompt))
            .send()
            .await?;

        let reply: OllamaGenerateResponse = read_json(response, &self.config.model).await?;
        Ok(Completion {
            text: reply.response,
            finish_reason: finish_reason(reply.done_reason.as_deref()),
        })
    }

    async fn is_available(&self) -> bool {
        self.client
            .get(self.api_url("/tags"))
            .timeout(HEALTH_CHECK_TIMEOUT)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[derive(Debug, Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    response: String,
    #[serde(default)]
    done_reason: Option<String>,
}

/// OpenAI-compatible `/chat/completions` backend (OpenAI, vLLM, LM Studio)
pub struct OpenAIBackend {
    client: Client,
    config: BackendConfig,
}

impl OpenAIBackend {
    /// Remote endpoints need an API key; local servers do not
    pub fn new(config: BackendConfig) -> Result<Self, LlmError> {
        let is_local = config.endpoint.starts_with("http://localhost")
            || config.endpoint.starts_with("http://127.0.0.1");
        if config.api_key.as_deref().map_or(true, str::is_empty) && !is_local {
            return Err(LlmError::Configuration(
                "API key required for remote endpoints".to_string(),
            ));
        }

        let client = http_client(config.attempt_timeout)?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.endpoint.trim_end_matches('/'), path)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) if !key.is_empty() => request.bearer_auth(key),
            _ => request,
        }
    }

    fn build_request<'a>(&'a self, prompt: &'a str) -> ChatCompletionRequest<'a> {
        ChatCompletionRequest {
            model: &self.config.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        }
    }
}

#[async_trait]
impl LlmBackend for OpenAIBackend {
    async fn complete(&self, prompt: &str) -> Result<Completion, LlmError> {
        let response = self
            .authorized(self.client.post(self.url("/chat/completions")))
            .json(&self.build_request(prompt))
            .send()
            .await?;

        let reply: ChatCompletionResponse = read_json(response, &self.config.model).await?;
        let choice = reply
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("No choices in response".to_string()))?;

        Ok(Completion {
            text: choice.message.content,
            finish_reason: finish_reason(choice.finish_reason.as_deref()),
        })
    }

    async fn is_available(&self) -> bool {
        self.authorized(self.client.get(self.url("/models")))
            .timeout(HEALTH_CHECK_TIMEOUT)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(endpoint: &str, api_key: Option<&str>) -> BackendConfig {
        BackendConfig {
            model: "llama3.2".to_string(),
            endpoint: endpoint.to_string(),
            api_key: api_key.map(str::to_string),
            max_tokens: 256,
            temperature: 0.2,
            attempt_timeout: Duration::from_secs(10),
        }
    }

    #[test]
    fn test_ollama_request_shape() {
        let backend = OllamaBackend::new(config("http://ollama:11434/", None)).unwrap();
        assert_eq!(backend.api_url("/generate"), "http://ollama:11434/api/generate");

        let json = serde_json::to_value(backend.build_request("hi")).unwrap();
        assert_eq!(json["prompt"], "hi");
        assert_eq!(json["stream"], false);
        assert_eq!(json["options"]["num_predict"], 256);
    }

    #[test]
    fn test_ollama_response_parsing() {
        let reply: OllamaGenerateResponse =
            serde_json::from_str(r#"{"response":"hello","done":true,"done_reason":"length"}"#).unwrap();
        assert_eq!(reply.response, "hello");
        assert_eq!(finish_reason(reply.done_reason.as_deref()), FinishReason::Length);

        let reply: OllamaGenerateResponse =
            serde_json::from_str(r#"{"response":"hi","done":true}"#).unwrap();
        assert_eq!(finish_reason(reply.done_reason.as_deref()), FinishReason::Stop);
    }

    #[test]
    fn test_openai_requires_key_for_remote() {
        assert!(OpenAIBackend::new(config("https://api.openai.com/v1", None)).is_err());
        assert!(OpenAIBackend::new(config("https://api.openai.com/v1", Some(""))).is_err());
        assert!(OpenAIBackend::new(config("https://api.openai.com/v1", Some("sk-test"))).is_ok());
        assert!(OpenAIBackend::new(config("http://localhost:8000/v1", None)).is_ok());
    }

    #[test]
    fn test_openai_request_is_single_user_message() {
        let backend = OpenAIBackend::new(config("http://localhost:8000/v1/", None)).unwrap();
        assert_eq!(backend.url("/chat/completions"), "http://localhost:8000/v1/chat/completions");

        let json = serde_json::to_value(backend.build_request("rank these")).unwrap();
        assert_eq!(json["messages"].as_array().unwrap().len(), 1);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "rank these");
    }

    #[test]
    fn test_openai_response_parsing() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"hi"},"finish_reason":"length"}],"usage":{"completion_tokens":3}}"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices[0].message.content, "hi");
        assert_eq!(parsed.choices[0].finish_reason.as_deref(), Some("length"));
    }
}
