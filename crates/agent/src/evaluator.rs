//! Response Evaluator
//!
//! Scores answer quality in [0, 1]. Never fails: a missing model, a failed
//! call or an unparseable reply all fall back to a lexical heuristic.

use std::collections::HashSet;
use std::sync::Arc;

use once_cell::sync::Lazy;
use ragchat_core::LanguageModel;
use regex::Regex;

use crate::{complete, record_fallback};

static SCORE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+(?:\.\d+)?").unwrap());

/// Response length at which the length component saturates (chars)
const LENGTH_SATURATION: f32 = 500.0;

/// LLM-as-judge quality scoring
pub struct ResponseEvaluator {
    llm: Option<Arc<dyn LanguageModel>>,
}

impl ResponseEvaluator {
    pub fn new(llm: Option<Arc<dyn LanguageModel>>) -> Self {
        Self { llm }
    }

    fn prompt(query: &str, response: &str, context: &str) -> String {
        format!(
            "Evaluate the quality of the following response to a user query based on the given context.\n\
             Rate the response on a scale of 0.0 to 1.0 considering:\n\
             - Relevance to the query\n\
             - Accuracy based on context\n\
             - Completeness of the answer\n\
             - Clarity and coherence\n\n\
             Query: {}\n\
             Context: {}\n\
             Response: {}\n\n\
             Provide only a numeric score (0.0-1.0):",
            query, context, response
        )
    }

    /// Score `response`, always within [0, 1]
    pub async fn evaluate(&self, query: &str, response: &str, context: &str) -> f32 {
        if let Some(llm) = &self.llm {
            match complete(llm, Self::prompt(query, response, context)).await {
                Ok(reply) => match parse_score(&reply) {
                    Some(score) => return score,
                    None => tracing::warn!(reply = %reply, "No score in evaluation reply, using heuristic"),
                },
                Err(e) => tracing::warn!(error = %e, "Evaluation failed, using heuristic"),
            }
            record_fallback("evaluation");
        }

        heuristic_score(query, response)
    }
}

/// First decimal number in the reply, clamped to [0, 1]
pub fn parse_score(reply: &str) -> Option<f32> {
    SCORE
        .find(reply)
        .and_then(|m| m.as_str().parse::<f32>().ok())
        .map(|score| score.clamp(0.0, 1.0))
}

/// `0.6 * word overlap + 0.4 * length score`
///
/// Overlap is the share of distinct lowercased query words that appear in
/// the response; length score saturates at 500 chars.
pub fn heuristic_score(query: &str, response: &str) -> f32 {
    let query_lower = query.to_lowercase();
    let response_lower = response.to_lowercase();
    let query_words: HashSet<&str> = query_lower.split_whitespace().collect();
    let response_words: HashSet<&str> = response_lower.split_whitespace().collect();

    let overlap = if query_words.is_empty() {
        0.0
    } else {
        query_words.intersection(&response_words).count() as f32 / query_words.len() as f32
    };
    let length_score = (response.chars().count() as f32 / LENGTH_SATURATION).min(1.0);

    (overlap * 0.6 + length_score * 0.4).clamp(0.0, 1.0)
}
