//! Language Model adapter
//!
//! Bridges an `LlmBackend` to the core `LanguageModel` trait. The adapter
//! owns the call deadline and retries transient failures inside it; each
//! attempt gets an even share of the deadline so a hung first attempt cannot
//! starve the retries.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ragchat_core::{GenerateRequest, GenerateResponse, LanguageModel, Result};

use crate::backend::{Completion, LlmBackend};
use crate::LlmError;

/// Retry schedule for transient backend failures
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Delay before the first retry, doubled on each further retry
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Per-attempt bound such that every attempt fits inside `deadline`
    pub fn attempt_timeout(&self, deadline: Duration) -> Duration {
        deadline / (self.max_retries + 1)
    }
}

/// Network failures and per-attempt timeouts are worth another attempt
pub(crate) fn is_retryable(error: &LlmError) -> bool {
    matches!(error, LlmError::Network(_) | LlmError::Timeout)
}

/// `LanguageModel` over an `LlmBackend`, with deadline and retries
pub struct LanguageModelAdapter {
    backend: Arc<dyn LlmBackend>,
    model_name: String,
    timeout: Duration,
    retry: RetryPolicy,
}

impl LanguageModelAdapter {
    pub fn new<B: LlmBackend + 'static>(backend: B, timeout: Duration, retry: RetryPolicy) -> Self {
        let model_name = backend.model_name().to_string();
        Self {
            backend: Arc::new(backend),
            model_name,
            timeout,
            retry,
        }
    }

    async fn complete_with_retry(&self, prompt: &str) -> std::result::Result<Completion, LlmError> {
        let mut backoff = self.retry.initial_backoff;
        let mut attempt = 0;

        loop {
            match self.backend.complete(prompt).await {
                Ok(completion) => return Ok(completion),
                Err(e) if is_retryable(&e) && attempt < self.retry.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        model = %self.model_name,
                        error = %e,
                        "Completion failed, retrying in {:?} (attempt {}/{})",
                        backoff,
                        attempt,
                        self.retry.max_retries
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl LanguageModel for LanguageModelAdapter {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse> {
        let completion = tokio::time::timeout(self.timeout, self.complete_with_retry(&request.prompt))
            .await
            .map_err(|_| LlmError::Timeout)??;

        Ok(GenerateResponse {
            text: completion.text,
            finish_reason: completion.finish_reason,
        })
    }

    async fn is_available(&self) -> bool {
        self.backend.is_available().await
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragchat_core::{Error, FinishReason};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails the first `failures` calls with `error`, then echoes the prompt
    struct FlakyBackend {
        failures: usize,
        error: fn() -> LlmError,
        delay: Duration,
        calls: Arc<AtomicUsize>,
    }

    impl FlakyBackend {
        fn new(failures: usize, error: fn() -> LlmError) -> Self {
            Self {
                failures,
                error,
                delay: Duration::ZERO,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl LlmBackend for FlakyBackend {
        async fn complete(&self, prompt: &str) -> std::result::Result<Completion, LlmError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if call < self.failures {
                return Err((self.error)());
            }
            Ok(Completion {
                text: format!("echo: {}", prompt),
                finish_reason: FinishReason::Stop,
            })
        }

        async fn is_available(&self) -> bool {
            true
        }

        fn model_name(&self) -> &str {
            "echo"
        }
    }

    #[tokio::test]
    async fn test_adapter_generates() {
        let adapter = LanguageModelAdapter::new(
            FlakyBackend::new(0, || LlmError::Timeout),
            Duration::from_secs(1),
            RetryPolicy::default(),
        );

        let response = adapter.generate(GenerateRequest::prompt("hi")).await.unwrap();
        assert_eq!(response.text, "echo: hi");
        assert_eq!(response.finish_reason, FinishReason::Stop);
        assert_eq!(adapter.model_name(), "echo");
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_leaves_room_for_retry() {
        // First attempt runs until its own timeout, then the retry succeeds
        let retry = RetryPolicy::new(2);
        let deadline = Duration::from_secs(30);
        let mut backend = FlakyBackend::new(1, || LlmError::Timeout);
        backend.delay = retry.attempt_timeout(deadline);
        let calls = Arc::clone(&backend.calls);

        let adapter = LanguageModelAdapter::new(backend, deadline, retry);
        let response = adapter.generate(GenerateRequest::prompt("hi")).await.unwrap();

        assert_eq!(response.text, "echo: hi");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_are_bounded() {
        let backend = FlakyBackend::new(10, || LlmError::Network("reset".into()));
        let calls = Arc::clone(&backend.calls);
        let adapter =
            LanguageModelAdapter::new(backend, Duration::from_secs(5), RetryPolicy::new(2));

        let err = adapter.generate(GenerateRequest::prompt("hi")).await.unwrap_err();
        assert!(matches!(err, Error::CapabilityUnavailable(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let backend = FlakyBackend::new(1, || LlmError::Api("HTTP 400".into()));
        let calls = Arc::clone(&backend.calls);
        let adapter =
            LanguageModelAdapter::new(backend, Duration::from_secs(1), RetryPolicy::new(2));

        let err = adapter.generate(GenerateRequest::prompt("hi")).await.unwrap_err();
        assert!(matches!(err, Error::Llm(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_adapter_times_out() {
        let mut backend = FlakyBackend::new(0, || LlmError::Timeout);
        backend.delay = Duration::from_millis(200);
        let adapter =
            LanguageModelAdapter::new(backend, Duration::from_millis(10), RetryPolicy::default());

        let err = adapter.generate(GenerateRequest::prompt("hi")).await.unwrap_err();
        assert!(matches!(err, Error::CapabilityUnavailable(_)));
        assert!(err.is_capability_failure());
    }

    #[test]
    fn test_attempt_timeout_splits_deadline() {
        assert_eq!(
            RetryPolicy::new(2).attempt_timeout(Duration::from_secs(30)),
            Duration::from_secs(10)
        );
        assert_eq!(
            RetryPolicy::new(0).attempt_timeout(Duration::from_secs(30)),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn test_retryable_errors() {
        assert!(is_retryable(&LlmError::Timeout));
        assert!(is_retryable(&LlmError::Network("reset".into())));
        assert!(!is_retryable(&LlmError::Api("400".into())));
        assert!(!is_retryable(&LlmError::InvalidResponse("bad".into())));
    }
}
