//! Error types shared across the workspace

use thiserror::Error;

/// Result alias using the core error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error taxonomy
///
/// Crate-level errors (`LlmError`, `RagError`, `PersistenceError`, ...)
/// convert into this type at crate boundaries.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Completion, embedding or search capability unreachable or non-success
    #[error("Capability unavailable: {0}")]
    CapabilityUnavailable(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// Persistent store unreachable or constraint violation
    #[error("Store error: {0}")]
    Store(String),

    /// Malformed capability reply
    #[error("Parse error: {0}")]
    Parse(String),

    /// Bad input, rejected before entering the pipeline
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the error comes from an upstream model or search capability.
    ///
    /// These are recovered locally by component fallbacks.
    pub fn is_capability_failure(&self) -> bool {
        matches!(
            self,
            Error::CapabilityUnavailable(_) | Error::Llm(_) | Error::Retrieval(_) | Error::Parse(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_failure_classification() {
        assert!(Error::Llm("timeout".into()).is_capability_failure());
        assert!(Error::Parse("bad json".into()).is_capability_failure());
        assert!(!Error::Store("down".into()).is_capability_failure());
        assert!(!Error::Validation("empty".into()).is_capability_failure());
    }

    #[test]
    fn test_error_display() {
        let err = Error::NotFound("session abc".to_string());
        assert_eq!(err.to_string(), "Not found: session abc");
    }
}
