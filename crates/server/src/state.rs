//! Application State
//!
//! Shared state across all handlers.

use parking_lot::RwLock;
use std::sync::Arc;

use ragchat_agent::{Orchestrator, SessionContextManager, StageModels};
use ragchat_config::Settings;
use ragchat_core::ChatStore;
use ragchat_persistence::InMemoryChatStore;
use ragchat_rag::MultiRetriever;

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RwLock<Settings>>,
    pub orchestrator: Arc<Orchestrator>,
    /// Session context cache, shared with the orchestrator
    pub sessions: Arc<SessionContextManager>,
    pub store: Arc<dyn ChatStore>,
}

impl AppState {
    /// Wire the pipeline over the given capabilities
    pub fn new(
        config: Settings,
        models: StageModels,
        retriever: MultiRetriever,
        store: Arc<dyn ChatStore>,
    ) -> Self {
        let sessions = Arc::new(SessionContextManager::new(
            Arc::clone(&store),
            models.summarization.clone(),
            config.session.clone(),
        ));
        let orchestrator = Arc::new(Orchestrator::new(
            &config.rag,
            models,
            retriever,
            Arc::clone(&store),
            Arc::clone(&sessions),
        ));

        Self {
            config: Arc::new(RwLock::new(config)),
            orchestrator,
            sessions,
            store,
        }
    }

    /// State with no models, no retrieval and an in-memory store
    pub fn in_memory(config: Settings) -> Self {
        Self::new(
            config,
            StageModels::default(),
            MultiRetriever::disabled(),
            Arc::new(InMemoryChatStore::new()),
        )
    }

    /// Get a read guard to the current configuration
    pub fn get_config(&self) -> parking_lot::RwLockReadGuard<'_, Settings> {
        self.config.read()
    }

    /// Whether chat history is shared across instances
    pub fn is_distributed_store(&self) -> bool {
        self.store.is_distributed()
    }
}
