//! Test doubles for the completion capability

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use ragchat_core::{Error, GenerateRequest, GenerateResponse, LanguageModel, Result};

/// Replies by applying a closure to the prompt
pub(crate) struct ScriptedLlm<F> {
    reply: F,
    calls: AtomicUsize,
}

impl<F> ScriptedLlm<F>
where
    F: Fn(&str) -> Result<String> + Send + Sync + 'static,
{
    pub(crate) fn new(reply: F) -> Self {
        Self {
            reply,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<F> LanguageModel for ScriptedLlm<F>
where
    F: Fn(&str) -> Result<String> + Send + Sync + 'static,
{
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.reply)(&request.prompt).map(GenerateResponse::text)
    }

    async fn is_available(&self) -> bool {
        true
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Always replies with the same text
pub(crate) fn fixed(text: &'static str) -> ScriptedLlm<impl Fn(&str) -> Result<String> + Send + Sync + 'static> {
    ScriptedLlm::new(move |_| Ok(text.to_string()))
}

/// Always fails as an unreachable backend
pub(crate) fn unavailable() -> ScriptedLlm<impl Fn(&str) -> Result<String> + Send + Sync + 'static> {
    ScriptedLlm::new(|_| Err(Error::CapabilityUnavailable("connection refused".into())))
}

/// Replies with fixed text after a delay, recording how many calls overlap
pub(crate) struct SlowLlm {
    reply: &'static str,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl SlowLlm {
    pub(crate) fn new(reply: &'static str, delay: Duration) -> Self {
        Self {
            reply,
            delay,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for SlowLlm {
    async fn generate(&self, _request: GenerateRequest) -> Result<GenerateResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let overlapping = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(overlapping, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(GenerateResponse::text(self.reply))
    }

    async fn is_available(&self) -> bool {
        true
    }

    fn model_name(&self) -> &str {
        "slow"
    }
}
