//! Integration tests for the chat pipeline (plan -> retrieve -> generate -> persist)
//!
//! These tests drive the orchestrator through its public API with
//! in-process capabilities.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use ragchat_agent::{Orchestrator, SessionContextManager, StageModels, TurnRequest};
use ragchat_config::{RagConfig, SessionConfig};
use ragchat_core::{
    ChatStore, DocumentChunk, Embedder, GenerateRequest, GenerateResponse, LanguageModel, Result,
    VectorSearch,
};
use ragchat_persistence::InMemoryChatStore;
use ragchat_rag::{MultiRetriever, RetrieverConfig};

/// Summarizes by counting calls, answers by echoing the question line
struct EchoModel {
    calls: AtomicUsize,
}

impl EchoModel {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl LanguageModel for EchoModel {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let prompt = request.prompt;

        let text = if prompt.contains("Summarized Context:") {
            format!("summary #{}", n)
        } else if prompt.ends_with("Suggestions:") {
            "1. What next?".to_string()
        } else {
            let question = prompt.rsplit("Question: ").next().unwrap_or_default();
            format!("answer to {} {}", question, "detail ".repeat(20))
        };
        Ok(GenerateResponse::text(text))
    }

    async fn is_available(&self) -> bool {
        true
    }

    fn model_name(&self) -> &str {
        "echo"
    }
}

struct ByteEmbedder;

#[async_trait]
impl Embedder for ByteEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(vec![text.bytes().next().unwrap_or_default() as f32])
    }

    fn model_name(&self) -> &str {
        "byte"
    }
}

/// Chunks whose first byte is closest to the query's first byte
struct KnowledgeBase(Vec<DocumentChunk>);

#[async_trait]
impl VectorSearch for KnowledgeBase {
    async fn search(&self, embedding: &[f32], top_k: usize) -> Result<Vec<DocumentChunk>> {
        let target = embedding.first().copied().unwrap_or_default();
        let mut chunks = self.0.clone();
        chunks.sort_by(|a, b| {
            let da = (a.content.bytes().next().unwrap_or_default() as f32 - target).abs();
            let db = (b.content.bytes().next().unwrap_or_default() as f32 - target).abs();
            da.total_cmp(&db)
        });
        chunks.truncate(top_k);
        Ok(chunks)
    }

    async fn chunks_for_documents(&self, doc_ids: &[String]) -> Result<Vec<DocumentChunk>> {
        Ok(self
            .0
            .iter()
            .filter(|c| c.doc_id.as_ref().is_some_and(|d| doc_ids.contains(d)))
            .cloned()
            .collect())
    }
}

fn knowledge_base() -> Arc<dyn VectorSearch> {
    Arc::new(KnowledgeBase(vec![
        DocumentChunk::new("r1", "rust ownership moves values").with_doc_id("rust"),
        DocumentChunk::new("r2", "borrowing lends references").with_doc_id("rust"),
        DocumentChunk::new("p1", "python uses reference counting").with_doc_id("python"),
    ]))
}

fn session_config() -> SessionConfig {
    SessionConfig {
        max_context_length: 600,
        summarization_threshold: 400,
        summary_chunk_size: 2,
        ..SessionConfig::default()
    }
}

#[tokio::test]
async fn test_multi_turn_conversation_stays_bounded() {
    let model = Arc::new(EchoModel::new());
    let store = Arc::new(InMemoryChatStore::new());
    let models = StageModels {
        response: Some(model.clone()),
        summarization: Some(model.clone()),
        ..StageModels::default()
    };
    let sessions = Arc::new(SessionContextManager::new(
        store.clone(),
        models.summarization.clone(),
        session_config(),
    ));
    let retriever = MultiRetriever::new(
        RetrieverConfig::default(),
        Some(Arc::new(ByteEmbedder)),
        Some(knowledge_base()),
    );
    let orchestrator = Orchestrator::new(
        &RagConfig::default(),
        models,
        retriever,
        store.clone(),
        Arc::clone(&sessions),
    );

    for i in 0..8 {
        let turn = orchestrator
            .process_turn(
                TurnRequest::new(format!("rust question {}", i))
                    .with_user("u1")
                    .with_session("s1"),
            )
            .await
            .unwrap();
        assert!(turn.persisted);
        assert!(turn.response.starts_with(&format!("answer to rust question {}", i)));

        let entry = sessions.cached("s1").unwrap();
        assert!(entry.context.len() <= 600, "context grew to {}", entry.context.len());
    }

    assert_eq!(store.read_history("s1", 50).await.unwrap().len(), 8);
    // Context outgrew the limit, so history was condensed at least once
    assert!(sessions.cached("s1").unwrap().context.contains("summary #"));
}

#[tokio::test]
async fn test_sessions_are_isolated() {
    let store = Arc::new(InMemoryChatStore::new());
    let sessions = Arc::new(SessionContextManager::new(store.clone(), None, session_config()));
    let orchestrator = Orchestrator::new(
        &RagConfig::default(),
        StageModels::default(),
        MultiRetriever::disabled(),
        store.clone(),
        Arc::clone(&sessions),
    );

    orchestrator
        .process_turn(TurnRequest::new("alpha").with_session("a"))
        .await
        .unwrap();
    let turn = orchestrator
        .process_turn(TurnRequest::new("beta").with_session("b"))
        .await
        .unwrap();

    assert!(!turn.response.contains("alpha"));
    assert_eq!(sessions.active_sessions(), 2);
}
