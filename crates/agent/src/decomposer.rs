//! Query Decomposer
//!
//! Breaks a complex question into sub-questions that can be retrieved for
//! independently.

use std::sync::Arc;

use ragchat_config::constants::rag;
use ragchat_core::LanguageModel;

use crate::parsing::parse_lines;
use crate::{complete, record_fallback};

/// Splits a query into sub-questions
pub struct QueryDecomposer {
    llm: Option<Arc<dyn LanguageModel>>,
    max_questions: usize,
}

impl QueryDecomposer {
    pub fn new(llm: Option<Arc<dyn LanguageModel>>) -> Self {
        Self {
            llm,
            max_questions: rag::DECOMPOSE_MAX,
        }
    }

    /// Override the sub-question cap
    pub fn with_max_questions(mut self, max_questions: usize) -> Self {
        self.max_questions = max_questions;
        self
    }

    fn prompt(query: &str) -> String {
        format!(
            "You are a helpful assistant that generates multiple sub-questions related to an input question.\n\
             The goal is to break down the input into a set of sub-problems / sub-questions that can be answered in isolation.\n\
             Generate multiple search queries related to: {}\n\
             Output ({} queries):",
            query,
            rag::DECOMPOSE_MAX
        )
    }

    /// Decompose `query`.
    ///
    /// The result always starts with the original query. Falls back to
    /// `[query]` when no model is configured, the call fails or the reply is
    /// empty.
    pub async fn decompose(&self, query: &str) -> Vec<String> {
        let llm = match &self.llm {
            Some(llm) => llm,
            None => return vec![query.to_string()],
        };

        let reply = match complete(llm, Self::prompt(query)).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "Decomposition failed, using original query");
                record_fallback("decomposition");
                return vec![query.to_string()];
            }
        };

        let mut sub_questions: Vec<String> = parse_lines(&reply)
            .into_iter()
            .filter(|q| q != query)
            .take(self.max_questions)
            .collect();

        if sub_questions.is_empty() {
            tracing::debug!("Decomposition reply had no sub-questions");
            record_fallback("decomposition");
        }

        sub_questions.insert(0, query.to_string());
        sub_questions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixed, unavailable};

    #[tokio::test]
    async fn test_no_model_returns_original() {
        let decomposer = QueryDecomposer::new(None);
        assert_eq!(decomposer.decompose("What is RAG?").await, vec!["What is RAG?"]);
    }

    #[tokio::test]
    async fn test_parses_and_caps_sub_questions() {
        let llm = Arc::new(fixed(
            "1. What is retrieval?\n2. What is generation?\n3. How do they combine?\n4. Extra one",
        ));
        let decomposer = QueryDecomposer::new(Some(llm));

        let result = decomposer.decompose("What is RAG?").await;
        assert_eq!(
            result,
            vec![
                "What is RAG?",
                "What is retrieval?",
                "What is generation?",
                "How do they combine?"
            ]
        );
    }

    #[tokio::test]
    async fn test_original_not_duplicated() {
        let llm = Arc::new(fixed("What is RAG?\nWhy use RAG?"));
        let decomposer = QueryDecomposer::new(Some(llm));

        assert_eq!(
            decomposer.decompose("What is RAG?").await,
            vec!["What is RAG?", "Why use RAG?"]
        );
    }

    #[tokio::test]
    async fn test_failure_falls_back() {
        let decomposer = QueryDecomposer::new(Some(Arc::new(unavailable())));
        assert_eq!(decomposer.decompose("q").await, vec!["q"]);
    }

    #[test]
    fn test_prompt_mentions_query() {
        let prompt = QueryDecomposer::prompt("how do vaccines work");
        assert!(prompt.contains("related to: how do vaccines work"));
        assert!(prompt.ends_with("Output (3 queries):"));
    }
}
