//! In-memory chat store
//!
//! Process-local fallback used when ScyllaDB is disabled or unreachable.
//! History is lost on restart.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use ragchat_core::{ChatMessage, ChatSession, ChatStore, NewMessage, SessionStatus};
use uuid::Uuid;

/// Sub-questions recorded for one message
#[derive(Debug, Clone, PartialEq)]
pub struct Decomposition {
    pub original_query: String,
    pub sub_questions: Vec<String>,
}

#[derive(Default)]
struct Tables {
    users: HashMap<String, chrono::DateTime<Utc>>,
    sessions: HashMap<String, ChatSession>,
    messages: HashMap<String, Vec<ChatMessage>>,
    decompositions: HashMap<Uuid, Decomposition>,
}

/// In-memory implementation of the chat store
#[derive(Default)]
pub struct InMemoryChatStore {
    tables: RwLock<Tables>,
}

impl InMemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decomposition recorded for a message, if any
    pub fn decomposition(&self, message_id: Uuid) -> Option<Decomposition> {
        self.tables.read().decompositions.get(&message_id).cloned()
    }

    /// Session record, if any
    pub fn session(&self, session_id: &str) -> Option<ChatSession> {
        self.tables.read().sessions.get(session_id).cloned()
    }

    /// Number of known users
    pub fn user_count(&self) -> usize {
        self.tables.read().users.len()
    }
}

#[async_trait]
impl ChatStore for InMemoryChatStore {
    async fn create_user(&self, user_id: &str) -> ragchat_core::Result<()> {
        self.tables
            .write()
            .users
            .entry(user_id.to_string())
            .or_insert_with(Utc::now);
        Ok(())
    }

    async fn create_session(&self, session_id: &str, user_id: &str) -> ragchat_core::Result<()> {
        self.tables
            .write()
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| ChatSession::new(session_id, user_id));
        Ok(())
    }

    async fn append_message(&self, message: NewMessage) -> ragchat_core::Result<Uuid> {
        let message = ChatMessage::from_new(message);
        let message_id = message.message_id;

        let mut tables = self.tables.write();
        if let Some(session) = tables.sessions.get_mut(&message.session_id) {
            session.last_activity = message.timestamp;
            session.status = SessionStatus::Active;
        }
        tables
            .messages
            .entry(message.session_id.clone())
            .or_default()
            .push(message);

        Ok(message_id)
    }

    async fn save_decomposition(
        &self,
        message_id: Uuid,
        original_query: &str,
        sub_questions: &[String],
    ) -> ragchat_core::Result<()> {
        self.tables.write().decompositions.insert(
            message_id,
            Decomposition {
                original_query: original_query.to_string(),
                sub_questions: sub_questions.to_vec(),
            },
        );
        Ok(())
    }

    async fn read_history(
        &self,
        session_id: &str,
        limit: usize,
    ) -> ragchat_core::Result<Vec<ChatMessage>> {
        let tables = self.tables.read();
        let history = match tables.messages.get(session_id) {
            Some(messages) => {
                let start = messages.len().saturating_sub(limit);
                messages[start..].to_vec()
            }
            None => Vec::new(),
        };
        Ok(history)
    }

    async fn list_sessions(&self, user_id: &str) -> ragchat_core::Result<Vec<ChatSession>> {
        let mut sessions: Vec<ChatSession> = self
            .tables
            .read()
            .sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        Ok(sessions)
    }

    async fn mark_inactive(&self, session_ids: &[String]) -> ragchat_core::Result<()> {
        let mut tables = self.tables.write();
        for session_id in session_ids {
            if let Some(session) = tables.sessions.get_mut(session_id) {
                session.status = SessionStatus::Inactive;
            }
        }
        Ok(())
    }

    async fn delete_session(&self, session_id: &str) -> ragchat_core::Result<bool> {
        let mut tables = self.tables.write();
        let existed = tables.sessions.remove(session_id).is_some();
        if let Some(messages) = tables.messages.remove(session_id) {
            for message in messages {
                tables.decompositions.remove(&message.message_id);
            }
            return Ok(true);
        }
        Ok(existed)
    }
}
