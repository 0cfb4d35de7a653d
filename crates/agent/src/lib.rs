//! Agentic RAG pipeline
//!
//! Features:
//! - Query decomposition into sub-questions
//! - Multi-query expansion for retrieval recall
//! - Grounded response generation with follow-up suggestions
//! - Response quality evaluation with heuristic fallback
//! - Per-session context cache with recursive summarization
//! - Turn orchestration across all of the above
//!
//! Every LLM-backed component degrades to a deterministic fallback when its
//! model is not configured or a call fails, so a turn always completes.

pub mod decomposer;
pub mod evaluator;
pub mod expander;
pub mod generator;
pub mod orchestrator;
pub mod session_context;
pub mod suggestions;

mod parsing;
#[cfg(test)]
mod testing;

pub use decomposer::QueryDecomposer;
pub use evaluator::ResponseEvaluator;
pub use expander::MultiQueryExpander;
pub use generator::{compose_final_response, ResponseGenerator};
pub use orchestrator::{Orchestrator, RequestDocument, StageModels, TurnRequest, TurnResponse};
pub use session_context::{CacheEntry, SessionContextManager};
pub use suggestions::SuggestionGenerator;

use std::sync::Arc;

use ragchat_core::{GenerateRequest, LanguageModel, Result};

/// Single-prompt completion; returns the trimmed reply text
pub(crate) async fn complete(llm: &Arc<dyn LanguageModel>, prompt: String) -> Result<String> {
    let response = llm.generate(GenerateRequest::prompt(prompt)).await?;
    if response.is_truncated() {
        tracing::debug!(model = llm.model_name(), "Completion stopped at token limit");
    }
    Ok(response.text.trim().to_string())
}

/// Count a component falling back to its deterministic output
pub(crate) fn record_fallback(stage: &'static str) {
    metrics::counter!("ragchat_fallbacks_total", "stage" => stage).increment(1);
}
