//! Chat history persistence for the RAG chat orchestrator
//!
//! Provides persistent storage for:
//! - Users and chat sessions
//! - Append-only chat messages
//! - Query decompositions
//!
//! `ScyllaChatStore` is the production backend; `InMemoryChatStore` serves
//! development and tests.

pub mod chat;
pub mod client;
pub mod error;
pub mod memory;
pub mod schema;

pub use chat::ScyllaChatStore;
pub use client::{ScyllaClient, ScyllaConfig};
pub use error::PersistenceError;
pub use memory::{Decomposition, InMemoryChatStore};

/// Connect to ScyllaDB, ensure the schema and build the chat store
pub async fn init(config: ScyllaConfig) -> Result<ScyllaChatStore, PersistenceError> {
    let client = ScyllaClient::connect(config).await?;
    client.ensure_schema().await?;
    ScyllaChatStore::new(client).await
}
