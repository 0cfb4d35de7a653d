//! Completion request/response types
//!
//! Every pipeline stage sends one prompt and reads back one reply; sampling
//! parameters are fixed per stage when the backend is built.

use serde::{Deserialize, Serialize};

/// Single-prompt completion request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
}

impl GenerateRequest {
    pub fn prompt(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
        }
    }
}

/// Completion reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub text: String,
    pub finish_reason: FinishReason,
}

impl GenerateResponse {
    /// Reply that ran to completion
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            text: content.into(),
            finish_reason: FinishReason::Stop,
        }
    }

    /// Whether the backend stopped at its token limit
    pub fn is_truncated(&self) -> bool {
        self.finish_reason == FinishReason::Length
    }
}

/// Why the backend stopped generating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    #[default]
    Stop,
    /// Hit the max tokens limit
    Length,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_response_is_complete() {
        let response = GenerateResponse::text("done");
        assert_eq!(response.finish_reason, FinishReason::Stop);
        assert!(!response.is_truncated());
    }

    #[test]
    fn test_finish_reason_serialization() {
        assert_eq!(serde_json::to_string(&FinishReason::Length).unwrap(), "\"length\"");
    }
}
