//! Exemplar retrieval, relevance reranking and stratified sampling.

mod rerank;
mod sample;

pub use rerank::{Bm25, tokenize};
pub use sample::stratified_sample;

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::Result;
use crate::providers::EmbeddingProvider;
use crate::store::VectorStore;
use crate::telemetry;
use crate::types::Document;

/// Vector-similarity lookup with a plain-scan fallback.
pub struct DocumentRetriever {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
}

impl DocumentRetriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Top-`k` documents for `query`, optionally restricted to `topic`.
    ///
    /// Falls back to a topic-filtered scan when embedding or search fails,
    /// and to an empty list when the scan fails too. Never errors.
    #[instrument(skip(self, query), fields(query_len = query.len()))]
    pub async fn retrieve(&self, query: &str, k: usize, topic: Option<&str>) -> Vec<Document> {
        if k == 0 {
            return Vec::new();
        }

        match self.search(query, k, topic).await {
            Ok(docs) => return docs,
            Err(e) => {
                warn!(error = %e, "similarity search failed, falling back to table scan");
                metrics::counter!(telemetry::RETRIEVAL_FALLBACKS_TOTAL, "stage" => "table_scan")
                    .increment(1);
            }
        }

        match self.store.table_scan(topic, k).await {
            Ok(docs) if !docs.is_empty() => {
                debug!(count = docs.len(), "table scan fallback returned documents");
                docs.into_iter().take(k).collect()
            }
            Ok(_) => {
                metrics::counter!(telemetry::RETRIEVAL_FALLBACKS_TOTAL, "stage" => "empty")
                    .increment(1);
                Vec::new()
            }
            Err(e) => {
                warn!(error = %e, "table scan fallback failed, continuing without examples");
                metrics::counter!(telemetry::RETRIEVAL_FALLBACKS_TOTAL, "stage" => "empty")
                    .increment(1);
                Vec::new()
            }
        }
    }

    async fn search(&self, query: &str, k: usize, topic: Option<&str>) -> Result<Vec<Document>> {
        let embedding = self.embedder.embed(query).await?;
        let mut docs = self.store.similarity_search(&embedding, k, topic).await?;
        docs.truncate(k);
        Ok(docs)
    }
}
