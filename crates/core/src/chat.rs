//! Chat data model
//!
//! Chunks and fused results flow through retrieval; messages and sessions
//! are owned by the persistent chat store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

use crate::Error;

/// Unit of retrieved source text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// Chunk ID (may be empty for ad-hoc chunks)
    #[serde(default)]
    pub id: String,
    /// Chunk text
    pub content: String,
    /// Groups chunks produced from one source document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<String>,
    /// Additional metadata
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl DocumentChunk {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            doc_id: None,
            metadata: HashMap::new(),
        }
    }

    /// Set the source document ID
    pub fn with_doc_id(mut self, doc_id: impl Into<String>) -> Self {
        self.doc_id = Some(doc_id.into());
        self
    }

    /// Add a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Identity used to merge the same chunk across ranked lists.
    ///
    /// Falls back to content when the chunk carries no ID.
    pub fn identity(&self) -> &str {
        if self.id.is_empty() {
            &self.content
        } else {
            &self.id
        }
    }
}

/// Chunk with its reciprocal-rank-fusion score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedChunk {
    pub chunk: DocumentChunk,
    pub score: f64,
}

/// Session status in the persistent store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Inactive,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

impl FromStr for SessionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            other => Err(Error::Parse(format!("unknown session status: {}", other))),
        }
    }
}

/// Chat session record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub session_id: String,
    pub user_id: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl ChatSession {
    pub fn new(session_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            status: SessionStatus::Active,
            created_at: now,
            last_activity: now,
        }
    }
}

/// Message to append to a session's history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessage {
    pub session_id: String,
    pub user_id: String,
    pub query: String,
    pub response: String,
    pub score: Option<f32>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Stored chat message (append-only)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub message_id: Uuid,
    pub session_id: String,
    pub user_id: String,
    pub query: String,
    pub response: String,
    pub score: Option<f32>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl ChatMessage {
    /// Materialize a new message with a fresh ID and timestamp
    pub fn from_new(message: NewMessage) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            session_id: message.session_id,
            user_id: message.user_id,
            query: message.query,
            response: message.response,
            score: message.score,
            timestamp: Utc::now(),
            metadata: message.metadata,
        }
    }

    /// Format as a conversation turn for context building
    pub fn format_turn(&self) -> String {
        format!("User: {}\nAssistant: {}", self.query, self.response)
    }
}
