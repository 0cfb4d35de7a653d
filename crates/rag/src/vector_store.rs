//! Vector Store using Qdrant
//!
//! Dense similarity search over the chunk corpus, plus whole-document
//! lookup for context expansion.

use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::{
    qdrant::{
        point_id::PointIdOptions, value::Kind, Condition, Filter, PointId, ScrollPointsBuilder,
        SearchPointsBuilder, Value,
    },
    Qdrant,
};
use ragchat_config::{constants::endpoints, RagConfig};
use ragchat_core::{DocumentChunk, VectorSearch};

use crate::RagError;

/// Page size for document scrolls
const SCROLL_PAGE: u32 = 128;

/// Vector store configuration
#[derive(Debug, Clone)]
pub struct VectorStoreConfig {
    /// Qdrant endpoint
    pub endpoint: String,
    /// Collection name
    pub collection: String,
    /// API key (optional)
    pub api_key: Option<String>,
    /// Maximum chunks returned by a document lookup
    pub expansion_limit: usize,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            endpoint: endpoints::QDRANT_DEFAULT.to_string(),
            collection: "documents".to_string(),
            api_key: None,
            expansion_limit: 256,
        }
    }
}

impl From<&RagConfig> for VectorStoreConfig {
    fn from(config: &RagConfig) -> Self {
        Self {
            endpoint: config.qdrant_endpoint.clone(),
            collection: config.qdrant_collection.clone(),
            api_key: config.qdrant_api_key.clone(),
            expansion_limit: config.expansion_limit,
        }
    }
}

/// Vector store client
pub struct VectorStore {
    client: Qdrant,
    config: VectorStoreConfig,
}

impl VectorStore {
    /// Create a new vector store connection
    pub fn new(config: VectorStoreConfig) -> Result<Self, RagError> {
        let mut builder = Qdrant::from_url(&config.endpoint);

        if let Some(ref api_key) = config.api_key {
            builder = builder.api_key(api_key.clone());
            tracing::info!("Qdrant connection using API key authentication");
        }

        let client = builder
            .build()
            .map_err(|e| RagError::Connection(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Collection name
    pub fn collection(&self) -> &str {
        &self.config.collection
    }

    /// Search by vector
    pub async fn search_points(
        &self,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<DocumentChunk>, RagError> {
        let request = SearchPointsBuilder::new(
            &self.config.collection,
            query_embedding.to_vec(),
            top_k as u64,
        )
        .with_payload(true);

        let results = self
            .client
            .search_points(request)
            .await
            .map_err(|e| RagError::Search(e.to_string()))?;

        // Qdrant returns points best-first
        Ok(results
            .result
            .into_iter()
            .map(|point| chunk_from_point(point.id, point.payload))
            .collect())
    }

    /// Fetch every chunk whose `doc_id` payload is in `doc_ids`
    pub async fn scroll_documents(&self, doc_ids: &[String]) -> Result<Vec<DocumentChunk>, RagError> {
        let filter = Filter::must([Condition::matches("doc_id", doc_ids.to_vec())]);
        let mut chunks = Vec::new();
        let mut offset: Option<PointId> = None;

        loop {
            let mut request = ScrollPointsBuilder::new(&self.config.collection)
                .filter(filter.clone())
                .limit(SCROLL_PAGE)
                .with_payload(true);
            if let Some(next) = offset.take() {
                request = request.offset(next);
            }

            let page = self
                .client
                .scroll(request)
                .await
                .map_err(|e| RagError::VectorStore(e.to_string()))?;

            chunks.extend(
                page.result
                    .into_iter()
                    .map(|point| chunk_from_point(point.id, point.payload)),
            );

            match page.next_page_offset {
                Some(next) if chunks.len() < self.config.expansion_limit => offset = Some(next),
                _ => break,
            }
        }

        chunks.truncate(self.config.expansion_limit);
        Ok(chunks)
    }
}

#[async_trait]
impl VectorSearch for VectorStore {
    async fn search(
        &self,
        embedding: &[f32],
        top_k: usize,
    ) -> ragchat_core::Result<Vec<DocumentChunk>> {
        Ok(self.search_points(embedding, top_k).await?)
    }

    async fn chunks_for_documents(
        &self,
        doc_ids: &[String],
    ) -> ragchat_core::Result<Vec<DocumentChunk>> {
        if doc_ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.scroll_documents(doc_ids).await?)
    }
}

fn point_id_string(id: Option<PointId>) -> String {
    id.and_then(|pid| pid.point_id_options)
        .map(|options| match options {
            PointIdOptions::Uuid(u) => u,
            PointIdOptions::Num(n) => n.to_string(),
        })
        .unwrap_or_default()
}

/// Map a Qdrant point to a chunk.
///
/// The "text" (or "content") payload key becomes the chunk content and
/// "doc_id" its source document; other string values land in metadata.
fn chunk_from_point(id: Option<PointId>, payload: HashMap<String, Value>) -> DocumentChunk {
    let mut chunk = DocumentChunk::new(point_id_string(id), String::new());

    for (key, value) in payload {
        let text = match value.kind {
            Some(Kind::StringValue(s)) => s,
            Some(Kind::IntegerValue(n)) if key == "doc_id" => n.to_string(),
            _ => continue,
        };
        match key.as_str() {
            "text" | "content" => chunk.content = text,
            "doc_id" => chunk.doc_id = Some(text),
            _ => {
                chunk.metadata.insert(key, text);
            }
        }
    }

    chunk
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_rag_config() {
        let mut rag = RagConfig::default();
        rag.qdrant_collection = "manuals".to_string();
        rag.expansion_limit = 32;

        let config = VectorStoreConfig::from(&rag);
        assert_eq!(config.collection, "manuals");
        assert_eq!(config.expansion_limit, 32);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_chunk_from_point_maps_payload() {
        let mut payload: HashMap<String, Value> = HashMap::new();
        payload.insert("text".to_string(), "Chunk body".into());
        payload.insert("doc_id".to_string(), "doc-1".into());
        payload.insert("source".to_string(), "manual.pdf".into());
        payload.insert("page".to_string(), 3i64.into());

        let id = Some(PointId::from(42u64));
        let chunk = chunk_from_point(id, payload);

        assert_eq!(chunk.id, "42");
        assert_eq!(chunk.content, "Chunk body");
        assert_eq!(chunk.doc_id.as_deref(), Some("doc-1"));
        assert_eq!(chunk.metadata.get("source").map(String::as_str), Some("manual.pdf"));
        assert!(!chunk.metadata.contains_key("page"));
    }

    #[test]
    fn test_chunk_from_point_numeric_doc_id() {
        let mut payload: HashMap<String, Value> = HashMap::new();
        payload.insert("content".to_string(), "body".into());
        payload.insert("doc_id".to_string(), 7i64.into());

        let chunk = chunk_from_point(None, payload);
        assert_eq!(chunk.id, "");
        assert_eq!(chunk.doc_id.as_deref(), Some("7"));
    }
}
