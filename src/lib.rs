//! DocuChat backend core
//!
//! This library provides the pieces behind an AI chat assistant:
//! - User registration, login and federated identity verification
//! - Chat sessions and messages persisted in MySQL
//! - Per-user document ingestion (PDF) into a Qdrant vector index
//! - Query intent classification (WEB / PDF / CHAT)
//! - Retrieval orchestration over the document index and web search
//! - Response generation through the Mistral API

pub mod auth;
pub mod config;
pub mod embeddings;
pub mod engine;
pub mod error;
pub mod index;
pub mod ingest;
pub mod intent;
pub mod llm;
pub mod search;
pub mod store;

// Re-export common types
pub use config::Config;
pub use embeddings::EmbeddingClient;
pub use engine::{AgentRequest, AgentResponse, Engine, SourceLabel};
pub use error::{Error, Result};
pub use index::{DocumentChunk, DocumentIndex, DocumentSearch};
pub use intent::Intent;
pub use llm::{ChatMessage, MistralClient};
pub use search::WebSearchClient;
pub use store::Store;
