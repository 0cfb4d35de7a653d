//! Retrieval for the RAG chat orchestrator
//!
//! Features:
//! - Concurrent embed-then-search fan-out over many query variants
//! - Reciprocal Rank Fusion of the resulting ranked lists
//! - Context expansion to sibling chunks of the same source document
//! - Dense vector search via Qdrant
//! - Ollama embeddings

pub mod context;
pub mod fusion;
pub mod ollama_embeddings;
pub mod retriever;
pub mod vector_store;

pub use context::{expand_related, format_context, ContextExpander};
pub use fusion::fuse;
pub use ollama_embeddings::{OllamaEmbedder, OllamaEmbeddingConfig};
pub use retriever::{MultiRetriever, QueryRetrieval, RetrieverConfig};
pub use vector_store::{VectorStore, VectorStoreConfig};

use thiserror::Error;

/// RAG errors
#[derive(Error, Debug, Clone)]
pub enum RagError {
    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Timed out after {0}ms")]
    Timeout(u64),

    #[error("Connection error: {0}")]
    Connection(String),
}

impl From<RagError> for ragchat_core::Error {
    fn from(err: RagError) -> Self {
        match err {
            RagError::Connection(msg) => ragchat_core::Error::CapabilityUnavailable(msg),
            other => ragchat_core::Error::Retrieval(other.to_string()),
        }
    }
}
