//! Retrieved exemplar documents.

use serde::{Deserialize, Serialize};

/// Exemplar text retrieved from the vector store, with its topic tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    /// Free-text topic tag from the document metadata (empty when untagged).
    #[serde(default)]
    pub topic: String,
    /// Stored embedding. Empty when the backend does not return vectors.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
}

impl Document {
    /// Create a document without an embedding.
    pub fn new(content: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            topic: topic.into(),
            embedding: Vec::new(),
        }
    }

    /// Attach an embedding vector.
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = embedding;
        self
    }
}
