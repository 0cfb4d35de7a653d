//! Follow-up question suggestions

use std::sync::Arc;

use ragchat_config::constants::rag;
use ragchat_core::LanguageModel;

use crate::parsing::parse_lines;
use crate::{complete, record_fallback};

/// Suggests questions the user might ask next
pub struct SuggestionGenerator {
    llm: Option<Arc<dyn LanguageModel>>,
    max_suggestions: usize,
}

impl SuggestionGenerator {
    pub fn new(llm: Option<Arc<dyn LanguageModel>>) -> Self {
        Self {
            llm,
            max_suggestions: rag::SUGGESTIONS_MAX,
        }
    }

    fn prompt(query: &str, context: &str, response: &str) -> String {
        format!(
            "Given the following user query, context, and response, suggest 3 possible follow-up \
             questions or hints the user might ask next.\n\n\
             User Query: {}\n\nContext:\n{}\n\nResponse:\n{}\n\nSuggestions:",
            query, context, response
        )
    }

    /// Up to three suggestions; empty when no model is configured or the
    /// call fails
    pub async fn suggest(&self, query: &str, context: &str, response: &str) -> Vec<String> {
        let llm = match &self.llm {
            Some(llm) => llm,
            None => return Vec::new(),
        };

        match complete(llm, Self::prompt(query, context, response)).await {
            Ok(reply) => parse_lines(&reply)
                .into_iter()
                .take(self.max_suggestions)
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "Suggestion generation failed");
                record_fallback("suggestions");
                Vec::new()
            }
        }
    }
}
