//! Persistent chat store trait

use async_trait::async_trait;
use uuid::Uuid;

use crate::{ChatMessage, ChatSession, NewMessage, Result};

/// Persistent store for users, sessions and append-only message history
///
/// Implementations:
/// - `ScyllaChatStore` - ScyllaDB backed
/// - `InMemoryChatStore` - process-local, for development and tests
#[async_trait]
pub trait ChatStore: Send + Sync + 'static {
    /// Create a user if it does not exist
    async fn create_user(&self, user_id: &str) -> Result<()>;

    /// Create an active session if it does not exist
    async fn create_session(&self, session_id: &str, user_id: &str) -> Result<()>;

    /// Append a message, returning its ID
    async fn append_message(&self, message: NewMessage) -> Result<Uuid>;

    /// Record the sub-questions a message's query was decomposed into
    async fn save_decomposition(
        &self,
        message_id: Uuid,
        original_query: &str,
        sub_questions: &[String],
    ) -> Result<()>;

    /// Read the most recent `limit` messages, oldest first
    async fn read_history(&self, session_id: &str, limit: usize) -> Result<Vec<ChatMessage>>;

    /// List a user's sessions, most recently active first
    async fn list_sessions(&self, user_id: &str) -> Result<Vec<ChatSession>>;

    /// Mark sessions inactive (history is kept)
    async fn mark_inactive(&self, session_ids: &[String]) -> Result<()>;

    /// Delete a session and its history. Returns false if it did not exist.
    async fn delete_session(&self, session_id: &str) -> Result<bool>;

    /// Check store connectivity
    async fn health_check(&self) -> bool {
        true
    }

    /// Whether the store is shared across processes
    fn is_distributed(&self) -> bool {
        false
    }
}
