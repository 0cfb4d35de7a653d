//! Pipeline Orchestrator
//!
//! Drives one conversational turn: decompose, expand, retrieve, fuse,
//! generate, evaluate, suggest, persist. Only a validation failure aborts a
//! turn; every capability or store failure degrades the turn instead.
//!
//! A turn runs under a wall-clock budget. Once it is spent, the remaining
//! stages take their fallbacks without calling out.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use ragchat_config::RagConfig;
use ragchat_core::{ChatStore, DocumentChunk, Error, LanguageModel, NewMessage, Result};
use ragchat_rag::{format_context, fuse, ContextExpander, MultiRetriever};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

use crate::evaluator::heuristic_score;
use crate::parsing::dedup_preserving_order;
use crate::{
    compose_final_response, MultiQueryExpander, QueryDecomposer, ResponseEvaluator,
    ResponseGenerator, SessionContextManager, SuggestionGenerator,
};

/// doc_id given to chunks supplied with the request
const REQUEST_DOC_ID: &str = "request";

/// One completion model per stage; `None` selects the stage's fallback
#[derive(Clone, Default)]
pub struct StageModels {
    pub decomposition: Option<Arc<dyn LanguageModel>>,
    pub multiquery: Option<Arc<dyn LanguageModel>>,
    pub response: Option<Arc<dyn LanguageModel>>,
    pub evaluation: Option<Arc<dyn LanguageModel>>,
    pub summarization: Option<Arc<dyn LanguageModel>>,
}

/// Incoming chat turn
#[derive(Debug, Clone, Deserialize)]
pub struct TurnRequest {
    pub query: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    /// Extra documents ranked alongside retrieval results
    #[serde(default)]
    pub documents: Option<Vec<RequestDocument>>,
}

/// Request-supplied document, either plain text or a full chunk
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RequestDocument {
    Text(String),
    Chunk(DocumentChunk),
}

impl From<RequestDocument> for DocumentChunk {
    fn from(document: RequestDocument) -> Self {
        match document {
            RequestDocument::Text(text) => DocumentChunk::new("", text),
            RequestDocument::Chunk(chunk) => chunk,
        }
    }
}

impl From<DocumentChunk> for RequestDocument {
    fn from(chunk: DocumentChunk) -> Self {
        Self::Chunk(chunk)
    }
}

impl From<String> for RequestDocument {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for RequestDocument {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl TurnRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            user_id: None,
            session_id: None,
            documents: None,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_documents<D: Into<RequestDocument>>(
        mut self,
        documents: impl IntoIterator<Item = D>,
    ) -> Self {
        self.documents = Some(documents.into_iter().map(Into::into).collect());
        self
    }
}

/// Result of a chat turn
#[derive(Debug, Clone, Serialize)]
pub struct TurnResponse {
    pub response: String,
    pub session_id: String,
    pub user_id: String,
    pub suggested_questions: Vec<String>,
    pub evaluation_score: f32,
    /// Seconds
    pub processing_time: f64,
    /// Whether the turn reached the persistent store
    #[serde(skip)]
    pub persisted: bool,
}

/// Turn pipeline over the injected capabilities
pub struct Orchestrator {
    decomposer: QueryDecomposer,
    expander: MultiQueryExpander,
    retriever: MultiRetriever,
    context_expander: ContextExpander,
    generator: ResponseGenerator,
    evaluator: ResponseEvaluator,
    suggestions: SuggestionGenerator,
    rrf_k: f64,
    turn_budget: Duration,
    store: Arc<dyn ChatStore>,
    sessions: Arc<SessionContextManager>,
}

impl Orchestrator {
    pub fn new(
        config: &RagConfig,
        models: StageModels,
        retriever: MultiRetriever,
        store: Arc<dyn ChatStore>,
        sessions: Arc<SessionContextManager>,
    ) -> Self {
        let context_expander = ContextExpander::new(
            retriever.vector_search(),
            config.expansion_limit,
            Duration::from_millis(config.retrieval_timeout_ms),
        );

        Self {
            decomposer: QueryDecomposer::new(models.decomposition),
            expander: MultiQueryExpander::new(models.multiquery),
            retriever,
            context_expander,
            generator: ResponseGenerator::new(models.response.clone()),
            evaluator: ResponseEvaluator::new(models.evaluation),
            // Suggestions share the response model
            suggestions: SuggestionGenerator::new(models.response),
            rrf_k: config.rrf_k,
            turn_budget: Duration::from_millis(config.turn_budget_ms),
            store,
            sessions,
        }
    }

    /// Session context cache shared with the HTTP layer
    pub fn sessions(&self) -> &Arc<SessionContextManager> {
        &self.sessions
    }

    /// Process one chat turn
    pub async fn process_turn(&self, request: TurnRequest) -> Result<TurnResponse> {
        let start = Instant::now();

        let query = request.query.trim();
        if query.is_empty() {
            return Err(Error::Validation("query must not be empty".to_string()));
        }

        let user_id = request
            .user_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let session_id = request
            .session_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        tracing::info!(session_id = %session_id, user_id = %user_id, "Processing turn");
        let deadline = start + self.turn_budget;

        self.ensure_session(&session_id, &user_id).await;
        let session_context = within_budget(
            deadline,
            "session_context",
            self.sessions.get_context(&session_id, &user_id),
        )
        .await
        .unwrap_or_default();

        // Query planning
        let decomposed = within_budget(deadline, "decomposition", self.decomposer.decompose(query))
            .await
            .unwrap_or_else(|| vec![query.to_string()]);
        let expanded = within_budget(deadline, "multiquery", self.expander.expand(&decomposed))
            .await
            .unwrap_or_default();
        let queries = dedup_preserving_order(decomposed.iter().cloned().chain(expanded));
        tracing::debug!(
            sub_questions = decomposed.len().saturating_sub(1),
            queries = queries.len(),
            "Query plan ready"
        );

        // Retrieval
        let retrievals = within_budget(deadline, "retrieval", self.retriever.retrieve_many(&queries))
            .await
            .unwrap_or_default();
        let mut ranked_lists: Vec<Vec<DocumentChunk>> = retrievals
            .iter()
            .map(|r| r.chunks().to_vec())
            .collect();
        if let Some(documents) = request.documents {
            ranked_lists.push(request_chunks(documents));
        }

        let fused = fuse(&ranked_lists, self.rrf_k);
        let expanded_chunks =
            within_budget(deadline, "expansion", self.context_expander.expand(&fused)).await;
        let chunks = expanded_chunks.unwrap_or_else(|| fused.into_iter().map(|f| f.chunk).collect());
        let retrieved_context = format_context(&chunks);
        let context = join_context(&session_context, &retrieved_context);

        // Generation
        let generated = within_budget(deadline, "response", self.generator.generate(query, &context))
            .await
            .unwrap_or_else(|| Err(Error::CapabilityUnavailable("turn time budget exhausted".to_string())));
        let draft = match generated {
            Ok(draft) => draft,
            Err(e) => {
                tracing::error!(session_id = %session_id, error = %e, "Response generation failed");
                crate::record_fallback("response");
                format!(
                    "I apologize, but I encountered an error processing your request: {}",
                    e
                )
            }
        };

        let (evaluation_score, suggested_questions) = within_budget(deadline, "evaluation", async {
            tokio::join!(
                self.evaluator.evaluate(query, &draft, &context),
                self.suggestions.suggest(query, &context, &draft),
            )
        })
        .await
        .unwrap_or_else(|| (heuristic_score(query, &draft), Vec::new()));
        let response = compose_final_response(&draft, &suggested_questions);

        let persisted = self
            .persist(&session_id, &user_id, query, &response, evaluation_score, &decomposed, chunks.len())
            .await;

        // Always attempted; a cut-off rebuild leaves the entry stale, so drop it
        // and let the next turn reload from history
        let update = self.sessions.update(&session_id, &user_id, query, &response);
        if tokio::time::timeout_at(deadline, update).await.is_err() {
            tracing::warn!(session_id = %session_id, "Session update cut off by turn budget");
            self.sessions.evict(&session_id).await;
        }
        if self.sessions.should_cleanup() {
            let sessions = Arc::clone(&self.sessions);
            tokio::spawn(async move {
                sessions.cleanup_memory().await;
            });
        }

        let processing_time = start.elapsed().as_secs_f64();
        metrics::counter!("ragchat_turns_total").increment(1);
        metrics::histogram!("ragchat_turn_duration_seconds").record(processing_time);

        tracing::info!(
            session_id = %session_id,
            chunks = chunks.len(),
            score = evaluation_score,
            persisted,
            elapsed_ms = (processing_time * 1000.0) as u64,
            "Turn complete"
        );

        Ok(TurnResponse {
            response,
            session_id,
            user_id,
            suggested_questions,
            evaluation_score,
            processing_time,
            persisted,
        })
    }

    async fn ensure_session(&self, session_id: &str, user_id: &str) {
        if let Err(e) = self.store.create_user(user_id).await {
            tracing::warn!(user_id = %user_id, error = %e, "Failed to create user");
            metrics::counter!("ragchat_store_failures_total").increment(1);
        }
        if let Err(e) = self.store.create_session(session_id, user_id).await {
            tracing::warn!(session_id = %session_id, error = %e, "Failed to create session");
            metrics::counter!("ragchat_store_failures_total").increment(1);
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn persist(
        &self,
        session_id: &str,
        user_id: &str,
        query: &str,
        response: &str,
        score: f32,
        decomposed: &[String],
        context_chunks: usize,
    ) -> bool {
        let mut metadata = HashMap::new();
        metadata.insert("context_chunks".to_string(), context_chunks.to_string());

        let message = NewMessage {
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            query: query.to_string(),
            response: response.to_string(),
            score: Some(score),
            metadata,
        };

        let result = async {
            let message_id = self.store.append_message(message).await?;
            let sub_questions = decomposed.get(1..).unwrap_or_default();
            self.store
                .save_decomposition(message_id, query, sub_questions)
                .await
        }
        .await;

        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "Failed to persist turn");
                metrics::counter!("ragchat_store_failures_total").increment(1);
                false
            }
        }
    }
}

/// Run a stage unless the turn budget is spent; `None` means the stage was
/// skipped or cut off and the caller takes its fallback
async fn within_budget<F: Future>(deadline: Instant, stage: &'static str, fut: F) -> Option<F::Output> {
    if Instant::now() >= deadline {
        tracing::warn!(stage, "Turn budget spent, skipping stage");
        crate::record_fallback("turn_budget");
        return None;
    }

    match tokio::time::timeout_at(deadline, fut).await {
        Ok(output) => Some(output),
        Err(_) => {
            tracing::warn!(stage, "Turn budget ran out during stage");
            crate::record_fallback("turn_budget");
            None
        }
    }
}

/// Request documents as one ranked list, in the order given
fn request_chunks(documents: Vec<RequestDocument>) -> Vec<DocumentChunk> {
    documents
        .into_iter()
        .map(DocumentChunk::from)
        .enumerate()
        .filter(|(_, doc)| !doc.content.trim().is_empty())
        .map(|(i, mut doc)| {
            if doc.id.is_empty() {
                doc.id = format!("{}-{}", REQUEST_DOC_ID, i);
            }
            if doc.doc_id.is_none() {
                doc.doc_id = Some(REQUEST_DOC_ID.to_string());
            }
            doc
        })
        .collect()
}

/// Session context, a blank line, then retrieved context; empty parts are
/// omitted
fn join_context(session_context: &str, retrieved_context: &str) -> String {
    match (session_context.is_empty(), retrieved_context.is_empty()) {
        (true, _) => retrieved_context.to_string(),
        (_, true) => session_context.to_string(),
        _ => format!("{}\n\n{}", session_context, retrieved_context),
    }
}
