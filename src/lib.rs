//! Mimir - exam-question generation engine
//!
//! Mimir turns a subject and topic (or a bag of keywords) into a set of
//! exam-style questions. A request flows through:
//!
//! - a [`DocumentRetriever`](retrieval::DocumentRetriever) that finds
//!   exemplar questions by embedding similarity, falling back to a plain
//!   table scan,
//! - BM25 reranking or stratified sampling of the candidates,
//! - a topic-indexed [`GenerationCache`](cache::GenerationCache) whose recent
//!   outputs are mixed into the prompt as extra examples,
//! - a [`ModelRouter`](router::ModelRouter) that walks registered models in
//!   priority or measured-latency order until one answers,
//! - a forgiving [parser](parse::parse_questions) for the model's output.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use mimir::providers::{CredentialedClientFactory, HuggingFaceEmbedder, ProviderKeys};
//! use mimir::store::MemoryStore;
//! use mimir::{GenerationService, TopicRequest};
//!
//! #[tokio::main]
//! async fn main() -> mimir::Result<()> {
//!     let keys = ProviderKeys {
//!         groq: Some("gsk-your-key".into()),
//!         ..Default::default()
//!     };
//!     let service = GenerationService::builder()
//!         .client_factory(Arc::new(CredentialedClientFactory::new(keys)))
//!         .store(Arc::new(MemoryStore::new()))
//!         .embedder(Arc::new(HuggingFaceEmbedder::new("hf_your_key")?))
//!         .build()?;
//!     service.initialize().await;
//!
//!     let response = service
//!         .generate_for_topic(&TopicRequest::new("GS2", "Federalism", 3))
//!         .await;
//!     for question in &response.questions {
//!         println!("{}", question.question);
//!     }
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod parse;
pub mod providers;
pub mod retrieval;
pub mod router;
pub mod service;
pub mod store;
pub mod telemetry;
pub mod types;

pub use error::{MimirError, Result};
pub use service::{GenerationService, GenerationServiceBuilder, GenerationSettings};

pub use types::{
    AttemptResult, Document, GeneratedQuestion, GenerationMeta, GenerationResponse,
    GenerationStatus, KeywordRequest, ModelDescriptor, PaperRequest, PerformanceRecord, Provider,
    SUBJECTS, TopicRequest,
};

/// Crate version from Cargo.toml.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");
