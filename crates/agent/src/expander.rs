//! Multi-Query Expander
//!
//! Rewrites each question into several paraphrases so distance-based
//! search sees more than one phrasing.

use std::sync::Arc;

use futures::future::join_all;
use ragchat_core::LanguageModel;

use crate::parsing::{dedup_preserving_order, parse_lines};
use crate::{complete, record_fallback};

/// Generates alternative phrasings of questions
pub struct MultiQueryExpander {
    llm: Option<Arc<dyn LanguageModel>>,
}

impl MultiQueryExpander {
    pub fn new(llm: Option<Arc<dyn LanguageModel>>) -> Self {
        Self { llm }
    }

    fn prompt(question: &str) -> String {
        format!(
            "You are an AI language model assistant. Your task is to generate five different versions \
             of the given user question to retrieve relevant documents from a vector database. \
             By generating multiple perspectives on the user question, your goal is to help the user \
             overcome some of the limitations of the distance-based similarity search. \
             Provide these alternative questions separated by newlines. Original question: {}",
            question
        )
    }

    /// Expand every question concurrently.
    ///
    /// Output is de-duplicated with first occurrences kept. A question whose
    /// rewrite fails (or yields nothing) contributes itself unchanged.
    pub async fn expand(&self, questions: &[String]) -> Vec<String> {
        let llm = match &self.llm {
            Some(llm) => llm,
            None => return dedup_preserving_order(questions.iter().cloned()),
        };

        let rewrites = join_all(questions.iter().map(|q| self.expand_one(llm, q))).await;
        dedup_preserving_order(rewrites.into_iter().flatten())
    }

    async fn expand_one(&self, llm: &Arc<dyn LanguageModel>, question: &str) -> Vec<String> {
        match complete(llm, Self::prompt(question)).await {
            Ok(reply) => {
                let variants = parse_lines(&reply);
                if variants.is_empty() {
                    record_fallback("multiquery");
                    vec![question.to_string()]
                } else {
                    variants
                }
            }
            Err(e) => {
                tracing::warn!(question = %question, error = %e, "Query expansion failed, keeping question");
                record_fallback("multiquery");
                vec![question.to_string()]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{unavailable, ScriptedLlm};
    use ragchat_core::Error;

    #[tokio::test]
    async fn test_no_model_returns_inputs() {
        let expander = MultiQueryExpander::new(None);
        let questions = vec!["a".to_string(), "b".to_string(), "a".to_string()];
        assert_eq!(expander.expand(&questions).await, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_expands_each_question_in_order() {
        let llm = Arc::new(ScriptedLlm::new(|prompt: &str| {
            let question = prompt.rsplit("Original question: ").next().unwrap_or_default();
            Ok(format!("{} v1\n{} v2\nshared", question, question))
        }));
        let expander = MultiQueryExpander::new(Some(llm.clone()));

        let questions = vec!["alpha".to_string(), "beta".to_string()];
        let expanded = expander.expand(&questions).await;

        assert_eq!(
            expanded,
            vec!["alpha v1", "alpha v2", "shared", "beta v1", "beta v2"]
        );
        assert_eq!(llm.calls(), 2);
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_failed_question() {
        let llm = Arc::new(ScriptedLlm::new(|prompt: &str| {
            if prompt.ends_with("broken") {
                Err(Error::Llm("500".into()))
            } else {
                Ok("rewritten".to_string())
            }
        }));
        let expander = MultiQueryExpander::new(Some(llm));

        let questions = vec!["fine".to_string(), "broken".to_string()];
        assert_eq!(expander.expand(&questions).await, vec!["rewritten", "broken"]);
    }

    #[tokio::test]
    async fn test_total_failure_returns_inputs() {
        let expander = MultiQueryExpander::new(Some(Arc::new(unavailable())));
        let questions = vec!["x".to_string(), "y".to_string()];
        assert_eq!(expander.expand(&questions).await, vec!["x", "y"]);
    }
}
