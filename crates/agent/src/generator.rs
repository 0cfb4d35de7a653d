//! Response Generator
//!
//! Answers the question from retrieved and session context only.

use std::sync::Arc;

use ragchat_core::{Error, LanguageModel, Result};

use crate::complete;

/// Grounded answer generation
pub struct ResponseGenerator {
    llm: Option<Arc<dyn LanguageModel>>,
}

impl ResponseGenerator {
    pub fn new(llm: Option<Arc<dyn LanguageModel>>) -> Self {
        Self { llm }
    }

    fn prompt(query: &str, context: &str) -> String {
        format!(
            "Answer the following question based only on the provided context.\n\nContext:\n{}\n\nQuestion: {}",
            context, query
        )
    }

    /// Generate the draft answer.
    ///
    /// Without a model this echoes the inputs in a fixed template so the turn
    /// still completes. A failed call or an empty reply is an error; the
    /// orchestrator turns it into a degraded response.
    pub async fn generate(&self, query: &str, context: &str) -> Result<String> {
        let llm = match &self.llm {
            Some(llm) => llm,
            None => {
                return Ok(format!(
                    "[No LLM configured] Context: {}\nQuestion: {}",
                    context, query
                ))
            }
        };

        let reply = complete(llm, Self::prompt(query, context)).await?;
        if reply.is_empty() {
            return Err(Error::Parse("empty completion".to_string()));
        }
        Ok(reply)
    }
}

/// Append follow-up suggestions to the draft answer
pub fn compose_final_response(draft: &str, suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        return draft.to_string();
    }

    let mut response = String::with_capacity(draft.len() + 64);
    response.push_str(draft);
    response.push_str("\n\nSuggested Next Questions:");
    for suggestion in suggestions {
        response.push_str("\n- ");
        response.push_str(suggestion);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixed, unavailable, ScriptedLlm};

    #[tokio::test]
    async fn test_no_model_template() {
        let generator = ResponseGenerator::new(None);
        let draft = generator.generate("Why?", "Because.").await.unwrap();
        assert_eq!(draft, "[No LLM configured] Context: Because.\nQuestion: Why?");
    }

    #[tokio::test]
    async fn test_prompt_carries_context_and_query() {
        let llm = Arc::new(ScriptedLlm::new(|prompt: &str| {
            assert!(prompt.starts_with("Answer the following question based only on the provided context."));
            assert!(prompt.contains("Context:\nchunk text"));
            assert!(prompt.ends_with("Question: what?"));
            Ok("  answer  ".to_string())
        }));
        let generator = ResponseGenerator::new(Some(llm));

        assert_eq!(generator.generate("what?", "chunk text").await.unwrap(), "answer");
    }

    #[tokio::test]
    async fn test_failure_propagates() {
        let generator = ResponseGenerator::new(Some(Arc::new(unavailable())));
        let err = generator.generate("q", "c").await.unwrap_err();
        assert!(err.is_capability_failure());
    }

    #[tokio::test]
    async fn test_empty_reply_is_error() {
        let generator = ResponseGenerator::new(Some(Arc::new(fixed("   "))));
        assert!(matches!(generator.generate("q", "c").await, Err(Error::Parse(_))));
    }

    #[test]
    fn test_compose_final_response() {
        assert_eq!(compose_final_response("draft", &[]), "draft");

        let suggestions = vec!["First?".to_string(), "Second?".to_string()];
        assert_eq!(
            compose_final_response("draft", &suggestions),
            "draft\n\nSuggested Next Questions:\n- First?\n- Second?"
        );
    }
}
