//! Centralized constants for the RAG chat orchestrator
//!
//! Single source of truth for default values used across the workspace.

/// Service endpoints (defaults for local development)
pub mod endpoints {
    /// Ollama LLM and embedding endpoint
    pub const OLLAMA_DEFAULT: &str = "http://localhost:11434";

    /// OpenAI API endpoint
    pub const OPENAI_DEFAULT: &str = "https://api.openai.com/v1";

    /// Qdrant vector store endpoint (REST API port)
    pub const QDRANT_DEFAULT: &str = "http://127.0.0.1:6333";
}

/// Model defaults
pub mod models {
    /// Default completion model for every stage
    pub const COMPLETION_DEFAULT: &str = "llama3.2";

    /// Default embedding model
    pub const EMBEDDING_DEFAULT: &str = "nomic-embed-text:1.5";
}

/// Retrieval and fusion defaults
pub mod rag {
    /// Nearest chunks fetched per query
    pub const DEFAULT_TOP_K: usize = 5;

    /// Reciprocal Rank Fusion smoothing constant
    pub const RRF_K: f64 = 60.0;

    /// Per-query embed+search timeout
    pub const RETRIEVAL_TIMEOUT_MS: u64 = 10_000;

    /// Maximum related chunks pulled in by context expansion
    pub const EXPANSION_LIMIT: usize = 256;

    /// Wall-clock budget for one chat turn, kept under the request timeout
    pub const TURN_BUDGET_MS: u64 = 100_000;

    /// Maximum sub-questions kept from decomposition
    pub const DECOMPOSE_MAX: usize = 3;

    /// Maximum follow-up suggestions
    pub const SUGGESTIONS_MAX: usize = 3;
}

/// Session context cache defaults
pub mod session {
    /// Idle time before a cache entry is evicted (seconds)
    pub const SESSION_TIMEOUT_SECS: u64 = 1800;

    /// Minimum time between cleanup passes (seconds)
    pub const CLEANUP_INTERVAL_SECS: u64 = 300;

    /// Hard ceiling on context handed to the response generator (chars)
    pub const MAX_CONTEXT_LENGTH: usize = 4096;

    /// Context size above which history is summarized (chars)
    pub const SUMMARIZATION_THRESHOLD: usize = 3200;

    /// Messages per summarization chunk
    pub const SUMMARY_CHUNK_SIZE: usize = 10;

    /// Hard cap on summarization passes
    pub const MAX_SUMMARY_DEPTH: usize = 3;

    /// Messages loaded from history when building context
    pub const HISTORY_LIMIT: usize = 50;
}

/// LLM call defaults
pub mod llm {
    /// Per-call timeout (milliseconds)
    pub const TIMEOUT_MS: u64 = 30_000;

    /// Retries for transient (5xx / network) failures
    pub const MAX_RETRIES: u32 = 2;

    /// Default sampling temperature
    pub const TEMPERATURE: f32 = 0.7;

    /// Default generation budget
    pub const MAX_TOKENS: u32 = 1024;
}
