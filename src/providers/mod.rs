//! External service adapters.
//!
//! - [`LlmClient`] adapters over the llm crate, built per model by a
//!   [`ClientFactory`]
//! - [`EmbeddingProvider`] for query embeddings (HuggingFace)
//! - [`NewsProvider`] for current-affairs context (NewsAPI)
//! - Retry decorators for the embedding and news providers

pub mod factory;
pub mod huggingface;
pub mod llm_chat;
pub mod news;
pub mod retry;
pub mod traits;

pub use factory::{ClientFactory, CredentialedClientFactory, ProviderKeys};
pub use huggingface::HuggingFaceEmbedder;
pub use llm_chat::{ChatParams, LlmChatClient};
pub use news::NewsApiClient;
pub use retry::{RetryConfig, RetryingEmbeddingProvider, RetryingNewsProvider};
pub use traits::{EmbeddingProvider, LlmClient, NewsProvider, NewsSnippet};
