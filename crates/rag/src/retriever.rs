//! Multi-query Retriever
//!
//! Runs one embed-then-search round trip per query variant, all
//! concurrently, and hands back one slot per input query in input order.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use ragchat_config::{constants::rag, RagConfig};
use ragchat_core::{DocumentChunk, Embedder, VectorSearch};

use crate::RagError;

/// Retriever configuration
#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    /// Results per query
    pub top_k: usize,
    /// Bound on each embed or search call
    pub timeout: Duration,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            top_k: rag::DEFAULT_TOP_K,
            timeout: Duration::from_millis(rag::RETRIEVAL_TIMEOUT_MS),
        }
    }
}

impl From<&RagConfig> for RetrieverConfig {
    fn from(config: &RagConfig) -> Self {
        Self {
            top_k: config.top_k,
            timeout: Duration::from_millis(config.retrieval_timeout_ms),
        }
    }
}

/// Outcome of retrieval for one query
#[derive(Debug, Clone)]
pub struct QueryRetrieval {
    pub query: String,
    pub outcome: Result<Vec<DocumentChunk>, RagError>,
}

impl QueryRetrieval {
    /// Ranked list for fusion; a failed slot contributes nothing
    pub fn chunks(&self) -> &[DocumentChunk] {
        match &self.outcome {
            Ok(chunks) => chunks,
            Err(_) => &[],
        }
    }
}

/// Concurrent retriever over the embedding and vector search capabilities
pub struct MultiRetriever {
    config: RetrieverConfig,
    embedder: Option<Arc<dyn Embedder>>,
    search: Option<Arc<dyn VectorSearch>>,
}

impl MultiRetriever {
    pub fn new(
        config: RetrieverConfig,
        embedder: Option<Arc<dyn Embedder>>,
        search: Option<Arc<dyn VectorSearch>>,
    ) -> Self {
        Self {
            config,
            embedder,
            search,
        }
    }

    /// Retriever with no capabilities; every query yields an empty list
    pub fn disabled() -> Self {
        Self::new(RetrieverConfig::default(), None, None)
    }

    /// Whether both capabilities are wired
    pub fn is_enabled(&self) -> bool {
        self.embedder.is_some() && self.search.is_some()
    }

    /// Vector search handle, shared with the context expander
    pub fn vector_search(&self) -> Option<Arc<dyn VectorSearch>> {
        self.search.clone()
    }

    /// Retrieve for every query concurrently.
    ///
    /// The result has exactly one slot per input query, in input order,
    /// regardless of the order in which round trips complete.
    pub async fn retrieve_many(&self, queries: &[String]) -> Vec<QueryRetrieval> {
        let results = join_all(queries.iter().map(|q| self.retrieve_one(q))).await;

        queries
            .iter()
            .zip(results)
            .map(|(query, outcome)| {
                if let Err(ref e) = outcome {
                    tracing::warn!(query = %query, error = %e, "Retrieval failed, continuing with partial results");
                }
                QueryRetrieval {
                    query: query.clone(),
                    outcome,
                }
            })
            .collect()
    }

    async fn retrieve_one(&self, query: &str) -> Result<Vec<DocumentChunk>, RagError> {
        let (embedder, search) = match (&self.embedder, &self.search) {
            (Some(embedder), Some(search)) => (embedder, search),
            _ => return Ok(Vec::new()),
        };

        let vector = self
            .bounded(embedder.embed(query))
            .await?
            .map_err(|e| RagError::Embedding(e.to_string()))?;

        let chunks = self
            .bounded(search.search(&vector, self.config.top_k))
            .await?
            .map_err(|e| RagError::Search(e.to_string()))?;

        tracing::debug!(query = %query, results = chunks.len(), "Retrieved chunks");
        Ok(chunks)
    }

    async fn bounded<F: Future>(&self, fut: F) -> Result<F::Output, RagError> {
        tokio::time::timeout(self.config.timeout, fut)
            .await
            .map_err(|_| RagError::Timeout(self.config.timeout.as_millis() as u64))
    }
}
