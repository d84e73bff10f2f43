//! Provider traits for the external services the engine consumes.
//!
//! Each capability gets its own small trait rather than a single "god trait".
//! This enables:
//! - Decorator patterns: `RetryingEmbeddingProvider`
//! - One adapter per LLM provider behind a single `invoke` contract
//! - Test doubles that implement only what a test exercises

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

// ============================================================================
// LLM client
// ============================================================================

/// A callable LLM backend.
///
/// One contract hides each provider's distinct auth and model-id scheme.
/// Clients enforce their own request timeout; the router does not.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Client name for logging/debugging.
    fn name(&self) -> &str;

    /// Send `prompt` and return the model's text, trimmed.
    async fn invoke(&self, prompt: &str) -> Result<String>;
}

// ============================================================================
// Embedding Provider
// ============================================================================

/// Provider for text embeddings.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Provider name for logging/debugging.
    fn name(&self) -> &str;

    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts (batch).
    ///
    /// Default implementation calls `embed` sequentially.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }
}

// ============================================================================
// News Provider
// ============================================================================

/// A short news item with source attribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsSnippet {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub source: String,
}

/// Recent-news lookup used by current-affairs generation.
#[async_trait]
pub trait NewsProvider: Send + Sync {
    /// Provider name for logging/debugging.
    fn name(&self) -> &str;

    /// Snippets matching `query` published within the last `months` months.
    async fn search(&self, query: &str, months: u32) -> Result<Vec<NewsSnippet>>;
}
