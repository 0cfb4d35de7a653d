//! Retrieval traits for RAG

use async_trait::async_trait;
use crate::{DocumentChunk, Result};

/// Embedding capability: text → dense vector
///
/// Dimensionality is opaque to the pipeline.
#[async_trait]
pub trait Embedder: Send + Sync + 'static {
    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Get embedding model name for logging
    fn model_name(&self) -> &str;
}

/// Vector search capability over the chunk corpus
#[async_trait]
pub trait VectorSearch: Send + Sync + 'static {
    /// Fetch the `top_k` nearest chunks, ordered by ascending distance
    async fn search(&self, embedding: &[f32], top_k: usize) -> Result<Vec<DocumentChunk>>;

    /// Fetch every chunk belonging to any of the given source documents
    async fn chunks_for_documents(&self, doc_ids: &[String]) -> Result<Vec<DocumentChunk>>;
}
