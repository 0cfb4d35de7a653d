//! Language Model traits

use async_trait::async_trait;
use crate::{GenerateRequest, GenerateResponse, Result};

/// Language Model interface (the completion gateway)
///
/// Implementations:
/// - `LanguageModelAdapter` over `OllamaBackend` - Local Ollama inference
/// - `LanguageModelAdapter` over `OpenAIBackend` - OpenAI-compatible APIs
///
/// # Example
///
/// ```ignore
/// let llm: Arc<dyn LanguageModel> = LlmFactory::create(&config)?;
/// let request = GenerateRequest::prompt("What is reciprocal rank fusion?");
/// let response = llm.generate(request).await?;
/// println!("{}", response.text);
/// ```
#[async_trait]
pub trait LanguageModel: Send + Sync + 'static {
    /// Generate completion
    ///
    /// Any non-success or malformed reply is an error.
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse>;

    /// Check if model is available
    async fn is_available(&self) -> bool;

    /// Get model name for logging
    fn model_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockLlm;

    #[async_trait]
    impl LanguageModel for MockLlm {
        async fn generate(&self, _request: GenerateRequest) -> Result<GenerateResponse> {
            Ok(GenerateResponse::text("Mock response"))
        }

        async fn is_available(&self) -> bool {
            true
        }

        fn model_name(&self) -> &str {
            "mock-llm"
        }
    }

    #[tokio::test]
    async fn test_mock_llm() {
        let llm = MockLlm;
        let request = GenerateRequest::prompt("Hello");
        let response = llm.generate(request).await.unwrap();
        assert_eq!(response.text, "Mock response");
        assert!(llm.is_available().await);
        assert_eq!(llm.model_name(), "mock-llm");
    }
}
