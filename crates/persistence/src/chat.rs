//! Chat history persistence using ScyllaDB

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ragchat_core::{ChatMessage, ChatSession, ChatStore, NewMessage, SessionStatus};
use scylla::frame::response::result::Row;
use scylla::prepared_statement::PreparedStatement;
use uuid::Uuid;

use crate::{PersistenceError, ScyllaClient};

/// Statements run on every chat turn, prepared once at startup
#[derive(Clone)]
struct TurnStatements {
    insert_message: PreparedStatement,
    touch_session: PreparedStatement,
    select_history: PreparedStatement,
}

impl TurnStatements {
    async fn prepare(client: &ScyllaClient) -> Result<Self, PersistenceError> {
        let keyspace = client.keyspace();
        let session = client.session();

        let insert_message = session
            .prepare(format!(
                "INSERT INTO {}.chat_messages (
                    session_id, timestamp, message_id, user_id,
                    query, response, score, metadata_json
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                keyspace
            ))
            .await?;
        let touch_session = session
            .prepare(format!(
                "UPDATE {}.chat_sessions SET last_activity = ?, status = ? WHERE session_id = ?",
                keyspace
            ))
            .await?;
        let select_history = session
            .prepare(format!(
                "SELECT message_id, session_id, user_id, query, response, score, timestamp, metadata_json
                 FROM {}.chat_messages WHERE session_id = ? LIMIT ?",
                keyspace
            ))
            .await?;

        Ok(Self {
            insert_message,
            touch_session,
            select_history,
        })
    }
}

/// ScyllaDB implementation of the chat store
#[derive(Clone)]
pub struct ScyllaChatStore {
    client: ScyllaClient,
    statements: TurnStatements,
}

impl ScyllaChatStore {
    /// Wrap a connected client; the schema must already exist
    pub async fn new(client: ScyllaClient) -> Result<Self, PersistenceError> {
        let statements = TurnStatements::prepare(&client).await?;
        Ok(Self { client, statements })
    }

    async fn insert_user(&self, user_id: &str) -> Result<(), PersistenceError> {
        let now = Utc::now().timestamp_millis();
        let query = format!(
            "INSERT INTO {}.users (user_id, created_at, last_active) VALUES (?, ?, ?) IF NOT EXISTS",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(query, (user_id, now, now))
            .await?;
        Ok(())
    }

    async fn insert_session(&self, session_id: &str, user_id: &str) -> Result<(), PersistenceError> {
        let now = Utc::now().timestamp_millis();
        let query = format!(
            "INSERT INTO {}.chat_sessions (session_id, user_id, status, created_at, last_activity)
             VALUES (?, ?, ?, ?, ?) IF NOT EXISTS",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(
                query,
                (session_id, user_id, SessionStatus::Active.as_str(), now, now),
            )
            .await?;

        let index = format!(
            "INSERT INTO {}.sessions_by_user (user_id, session_id, created_at) VALUES (?, ?, ?)",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(index, (user_id, session_id, now))
            .await?;
        Ok(())
    }

    async fn insert_message(&self, message: &ChatMessage) -> Result<(), PersistenceError> {
        let metadata_json = serde_json::to_string(&message.metadata)?;
        let timestamp = message.timestamp.timestamp_millis();

        self.client
            .session()
            .execute_unpaged(
                &self.statements.insert_message,
                (
                    &message.session_id,
                    timestamp,
                    message.message_id,
                    &message.user_id,
                    &message.query,
                    &message.response,
                    message.score,
                    metadata_json,
                ),
            )
            .await?;

        self.client
            .session()
            .execute_unpaged(
                &self.statements.touch_session,
                (timestamp, SessionStatus::Active.as_str(), &message.session_id),
            )
            .await?;

        tracing::debug!(
            message_id = %message.message_id,
            session_id = %message.session_id,
            "Chat message stored"
        );
        Ok(())
    }

    async fn select_history(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, PersistenceError> {
        let limit = i32::try_from(limit).unwrap_or(i32::MAX);

        let result = self
            .client
            .session()
            .execute_unpaged(&self.statements.select_history, (session_id, limit))
            .await?;

        let mut messages = Vec::new();
        if let Some(rows) = result.rows {
            for row in rows {
                messages.push(row_to_message(row)?);
            }
        }

        // Clustering order is newest first
        messages.reverse();
        Ok(messages)
    }

    async fn select_session(&self, session_id: &str) -> Result<Option<ChatSession>, PersistenceError> {
        let query = format!(
            "SELECT session_id, user_id, status, created_at, last_activity
             FROM {}.chat_sessions WHERE session_id = ?",
            self.client.keyspace()
        );
        let result = self
            .client
            .session()
            .query_unpaged(query, (session_id,))
            .await?;

        if let Some(rows) = result.rows {
            if let Some(row) = rows.into_iter().next() {
                return Ok(Some(row_to_session(row)?));
            }
        }
        Ok(None)
    }

    async fn select_user_sessions(&self, user_id: &str) -> Result<Vec<ChatSession>, PersistenceError> {
        let query = format!(
            "SELECT session_id FROM {}.sessions_by_user WHERE user_id = ?",
            self.client.keyspace()
        );
        let result = self
            .client
            .session()
            .query_unpaged(query, (user_id,))
            .await?;

        let mut sessions = Vec::new();
        if let Some(rows) = result.rows {
            for row in rows {
                let (session_id,): (String,) = row
                    .into_typed()
                    .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;
                if let Some(session) = self.select_session(&session_id).await? {
                    sessions.push(session);
                }
            }
        }

        sessions.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        Ok(sessions)
    }

    async fn update_status(
        &self,
        session_id: &str,
        status: SessionStatus,
    ) -> Result<(), PersistenceError> {
        let query = format!(
            "UPDATE {}.chat_sessions SET status = ? WHERE session_id = ? IF EXISTS",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(query, (status.as_str(), session_id))
            .await?;
        Ok(())
    }

    async fn remove_session(&self, session_id: &str) -> Result<bool, PersistenceError> {
        let session = match self.select_session(session_id).await? {
            Some(session) => session,
            None => return Ok(false),
        };
        let keyspace = self.client.keyspace();

        // Decompositions are keyed by message, so collect IDs first
        let ids_query = format!(
            "SELECT message_id FROM {}.chat_messages WHERE session_id = ?",
            keyspace
        );
        let result = self
            .client
            .session()
            .query_unpaged(ids_query, (session_id,))
            .await?;
        if let Some(rows) = result.rows {
            let delete_decomposition = format!(
                "DELETE FROM {}.query_decomposition WHERE message_id = ?",
                keyspace
            );
            for row in rows {
                let (message_id,): (Uuid,) = row
                    .into_typed()
                    .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;
                self.client
                    .session()
                    .query_unpaged(delete_decomposition.as_str(), (message_id,))
                    .await?;
            }
        }

        let statements = [
            format!("DELETE FROM {}.chat_messages WHERE session_id = ?", keyspace),
            format!("DELETE FROM {}.chat_sessions WHERE session_id = ?", keyspace),
        ];
        for statement in statements {
            self.client
                .session()
                .query_unpaged(statement, (session_id,))
                .await?;
        }

        let index = format!(
            "DELETE FROM {}.sessions_by_user WHERE user_id = ? AND session_id = ?",
            keyspace
        );
        self.client
            .session()
            .query_unpaged(index, (&session.user_id, session_id))
            .await?;

        tracing::info!(session_id = %session_id, "Chat session deleted");
        Ok(true)
    }
}

#[async_trait]
impl ChatStore for ScyllaChatStore {
    async fn create_user(&self, user_id: &str) -> ragchat_core::Result<()> {
        Ok(self.insert_user(user_id).await?)
    }

    async fn create_session(&self, session_id: &str, user_id: &str) -> ragchat_core::Result<()> {
        Ok(self.insert_session(session_id, user_id).await?)
    }

    async fn append_message(&self, message: NewMessage) -> ragchat_core::Result<Uuid> {
        let message = ChatMessage::from_new(message);
        self.insert_message(&message).await?;
        Ok(message.message_id)
    }

    async fn save_decomposition(
        &self,
        message_id: Uuid,
        original_query: &str,
        sub_questions: &[String],
    ) -> ragchat_core::Result<()> {
        let query = format!(
            "INSERT INTO {}.query_decomposition (message_id, original_query, sub_questions, created_at)
             VALUES (?, ?, ?, ?)",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(
                query,
                (
                    message_id,
                    original_query,
                    sub_questions.to_vec(),
                    Utc::now().timestamp_millis(),
                ),
            )
            .await
            .map_err(PersistenceError::from)?;
        Ok(())
    }

    async fn read_history(
        &self,
        session_id: &str,
        limit: usize,
    ) -> ragchat_core::Result<Vec<ChatMessage>> {
        Ok(self.select_history(session_id, limit).await?)
    }

    async fn list_sessions(&self, user_id: &str) -> ragchat_core::Result<Vec<ChatSession>> {
        Ok(self.select_user_sessions(user_id).await?)
    }

    async fn mark_inactive(&self, session_ids: &[String]) -> ragchat_core::Result<()> {
        for session_id in session_ids {
            self.update_status(session_id, SessionStatus::Inactive).await?;
        }
        if !session_ids.is_empty() {
            tracing::info!(count = session_ids.len(), "Sessions marked inactive");
        }
        Ok(())
    }

    async fn delete_session(&self, session_id: &str) -> ragchat_core::Result<bool> {
        Ok(self.remove_session(session_id).await?)
    }

    async fn health_check(&self) -> bool {
        self.client
            .session()
            .query_unpaged("SELECT release_version FROM system.local", &[])
            .await
            .is_ok()
    }

    fn is_distributed(&self) -> bool {
        true
    }
}

fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
}

fn row_to_message(row: Row) -> Result<ChatMessage, PersistenceError> {
    let (message_id, session_id, user_id, query, response, score, timestamp, metadata_json): (
        Uuid,
        String,
        String,
        String,
        String,
        Option<f32>,
        i64,
        Option<String>,
    ) = row
        .into_typed()
        .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;

    let metadata: HashMap<String, String> = match metadata_json {
        Some(json) if !json.is_empty() => serde_json::from_str(&json)?,
        _ => HashMap::new(),
    };

    Ok(ChatMessage {
        message_id,
        session_id,
        user_id,
        query,
        response,
        score,
        timestamp: millis_to_datetime(timestamp),
        metadata,
    })
}

fn row_to_session(row: Row) -> Result<ChatSession, PersistenceError> {
    let (session_id, user_id, status, created_at, last_activity): (
        String,
        String,
        Option<String>,
        Option<i64>,
        Option<i64>,
    ) = row
        .into_typed()
        .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;

    let created_at = created_at.map(millis_to_datetime).unwrap_or_else(Utc::now);
    Ok(ChatSession {
        session_id,
        user_id,
        status: status
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(SessionStatus::Active),
        created_at,
        last_activity: last_activity.map(millis_to_datetime).unwrap_or(created_at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millis_to_datetime() {
        let dt = millis_to_datetime(1_700_000_000_000);
        assert_eq!(dt.timestamp_millis(), 1_700_000_000_000);
    }
}
