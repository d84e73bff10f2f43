//! Integration tests for exemplar retrieval, reranking and sampling.

use std::sync::Arc;

use async_trait::async_trait;
use rand::SeedableRng;
use rand::rngs::StdRng;

use mimir::retrieval::{Bm25, DocumentRetriever, stratified_sample};
use mimir::store::{MemoryStore, VectorStore};
use mimir::{Document, MimirError, Result};

// ============================================================================
// Mocks
// ============================================================================

/// Embeds by keyword: one dimension per known word.
struct KeywordEmbedder;

#[async_trait]
impl mimir::providers::EmbeddingProvider for KeywordEmbedder {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let text = text.to_lowercase();
        Ok(["river", "temple", "budget"]
            .iter()
            .map(|w| if text.contains(w) { 1.0 } else { 0.0 })
            .collect())
    }
}

struct DownEmbedder;

#[async_trait]
impl mimir::providers::EmbeddingProvider for DownEmbedder {
    fn name(&self) -> &str {
        "down"
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(MimirError::Http("connection refused".to_string()))
    }
}

/// Store whose every operation fails.
struct BrokenStore;

#[async_trait]
impl VectorStore for BrokenStore {
    fn name(&self) -> &str {
        "broken"
    }

    async fn similarity_search(
        &self,
        _query: &[f32],
        _k: usize,
        _topic: Option<&str>,
    ) -> Result<Vec<Document>> {
        Err(MimirError::Store("unreachable".to_string()))
    }

    async fn table_scan(&self, _topic: Option<&str>, _limit: usize) -> Result<Vec<Document>> {
        Err(MimirError::Store("unreachable".to_string()))
    }
}

fn corpus() -> Vec<Document> {
    vec![
        Document::new("Discuss river linking.", "GS1 Geography").with_embedding(vec![1.0, 0.0, 0.0]),
        Document::new("Explain temple architecture.", "GS1 Art").with_embedding(vec![0.0, 1.0, 0.0]),
        Document::new("Analyse the union budget.", "GS3 Economy").with_embedding(vec![0.0, 0.0, 1.0]),
        Document::new("Comment on temple towns on rivers.", "GS1 Art")
            .with_embedding(vec![0.7, 0.7, 0.0]),
    ]
}

// ============================================================================
// Retriever
// ============================================================================

#[tokio::test]
async fn similarity_search_ranks_by_embedding() {
    let store = Arc::new(MemoryStore::with_documents(corpus()));
    let retriever = DocumentRetriever::new(Arc::new(KeywordEmbedder), store);

    let docs = retriever.retrieve("temple", 2, None).await;
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0].content, "Explain temple architecture.");
    assert_eq!(docs[1].content, "Comment on temple towns on rivers.");
}

#[tokio::test]
async fn topic_filter_applies_to_search() {
    let store = Arc::new(MemoryStore::with_documents(corpus()));
    let retriever = DocumentRetriever::new(Arc::new(KeywordEmbedder), store);

    let docs = retriever.retrieve("river", 5, Some("GS1 Art")).await;
    assert!(docs.iter().all(|d| d.topic == "GS1 Art"));
    assert_eq!(docs[0].content, "Comment on temple towns on rivers.");
}

#[tokio::test]
async fn embedder_failure_falls_back_to_table_scan() {
    let store = Arc::new(MemoryStore::with_documents(corpus()));
    let retriever = DocumentRetriever::new(Arc::new(DownEmbedder), store);

    let docs = retriever.retrieve("anything", 10, Some("GS1 Art")).await;
    assert_eq!(docs.len(), 2);
    assert!(docs.iter().all(|d| d.topic == "GS1 Art"));

    let bounded = retriever.retrieve("anything", 1, None).await;
    assert_eq!(bounded.len(), 1);
}

#[tokio::test]
async fn total_failure_yields_no_documents() {
    let retriever = DocumentRetriever::new(Arc::new(DownEmbedder), Arc::new(BrokenStore));
    assert!(retriever.retrieve("anything", 5, None).await.is_empty());
}

#[tokio::test]
async fn zero_k_short_circuits() {
    let store = Arc::new(MemoryStore::with_documents(corpus()));
    let retriever = DocumentRetriever::new(Arc::new(KeywordEmbedder), store);
    assert!(retriever.retrieve("river", 0, None).await.is_empty());
}

// ============================================================================
// Rerank + sample over retrieved candidates
// ============================================================================

#[test]
fn bm25_prefers_documents_sharing_query_terms() {
    let ranked = Bm25::default().rerank("union budget deficit", corpus());
    assert_eq!(ranked.len(), 4);
    assert_eq!(ranked[0].content, "Analyse the union budget.");
}

#[test]
fn bm25_without_overlap_keeps_input_order() {
    let docs = corpus();
    let ranked = Bm25::default().rerank("quantum entanglement", docs.clone());
    assert_eq!(ranked, docs);
}

#[test]
fn stratified_sample_is_reproducible_with_a_seed() {
    let docs: Vec<Document> = (0..20)
        .map(|i| Document::new(format!("doc {i}"), if i % 4 == 0 { "Art" } else { "History" }))
        .collect();

    let a = stratified_sample(docs.clone(), 5, &mut StdRng::seed_from_u64(7));
    let b = stratified_sample(docs, 5, &mut StdRng::seed_from_u64(7));
    assert_eq!(a, b);
    assert_eq!(a.len(), 5);
    assert!(a.iter().any(|d| d.topic == "Art"));
    assert!(a.iter().any(|d| d.topic == "History"));
}
