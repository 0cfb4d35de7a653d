//! Capability traits for the RAG chat orchestrator
//!
//! Every external collaborator is consumed through one of these traits so
//! that backends can be swapped by configuration and mocked in tests.
//!
//! ```text
//! Language Models:
//!   - LanguageModel: prompt → completion text
//!
//! Retrieval:
//!   - Embedder: text → vector
//!   - VectorSearch: vector → nearest chunks, doc_id → related chunks
//!
//! Persistence:
//!   - ChatStore: users, sessions, append-only message history
//! ```

mod llm;
mod retriever;
mod store;

pub use llm::LanguageModel;
pub use retriever::{Embedder, VectorSearch};
pub use store::ChatStore;
