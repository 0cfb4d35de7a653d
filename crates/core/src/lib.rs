//! Core traits and types for the RAG chat orchestrator
//!
//! This crate provides foundational types used across all other crates:
//! - Capability traits for pluggable backends (LLM, embeddings, vector search, chat store)
//! - Chat data model (chunks, fused results, messages, sessions)
//! - Completion request/response types
//! - Error types

pub mod chat;
pub mod error;
pub mod llm_types;
pub mod traits;

pub use chat::{
    ChatMessage, ChatSession, DocumentChunk, FusedChunk, NewMessage, SessionStatus,
};
pub use error::{Error, Result};
pub use llm_types::{FinishReason, GenerateRequest, GenerateResponse};

pub use traits::{
    // Persistence
    ChatStore,
    // Retrieval
    Embedder,
    // LLM
    LanguageModel,
    VectorSearch,
};
