//! BM25 relevance scoring over a candidate pool.
//!
//! Statistics (document frequency, average length) come from the candidate
//! set itself rather than a global corpus, so scores are only comparable
//! within one call.

use std::collections::{HashMap, HashSet};

use crate::types::Document;

/// BM25 parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25 {
    /// Term-frequency saturation.
    pub k1: f64,
    /// Length normalization strength.
    pub b: f64,
}

impl Default for Bm25 {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

impl Bm25 {
    pub fn new() -> Self {
        Self::default()
    }

    /// Score every document against `query`, highest first.
    ///
    /// Equal scores keep their input order.
    pub fn score(&self, query: &str, documents: Vec<Document>) -> Vec<(Document, f64)> {
        let query_terms: HashSet<String> = tokenize(query).into_iter().collect();
        let doc_terms: Vec<Vec<String>> = documents.iter().map(|d| tokenize(&d.content)).collect();

        let n = doc_terms.len() as f64;
        let avg_len = if doc_terms.is_empty() {
            0.0
        } else {
            doc_terms.iter().map(Vec::len).sum::<usize>() as f64 / n
        };

        let mut doc_freq: HashMap<&str, usize> = HashMap::new();
        for terms in &doc_terms {
            let unique: HashSet<&str> = terms.iter().map(String::as_str).collect();
            for term in unique {
                if query_terms.contains(term) {
                    *doc_freq.entry(term).or_default() += 1;
                }
            }
        }

        let scores: Vec<f64> = doc_terms
            .iter()
            .map(|terms| {
                let len = terms.len() as f64;
                let mut tf: HashMap<&str, usize> = HashMap::new();
                for term in terms {
                    if query_terms.contains(term.as_str()) {
                        *tf.entry(term.as_str()).or_default() += 1;
                    }
                }
                tf.into_iter()
                    .map(|(term, freq)| {
                        let df = doc_freq.get(term).copied().unwrap_or(0) as f64;
                        let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
                        let freq = freq as f64;
                        let norm = if avg_len > 0.0 { len / avg_len } else { 0.0 };
                        idf * freq * (self.k1 + 1.0)
                            / (freq + self.k1 * (1.0 - self.b + self.b * norm))
                    })
                    .sum()
            })
            .collect();

        let mut scored: Vec<(Document, f64)> = documents.into_iter().zip(scores).collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored
    }

    /// Documents ordered by [`score`](Self::score), scores dropped.
    pub fn rerank(&self, query: &str, documents: Vec<Document>) -> Vec<Document> {
        self.score(query, documents)
            .into_iter()
            .map(|(doc, _)| doc)
            .collect()
    }
}

/// Lowercase, keep alphabetic runs, drop tokens of two characters or fewer.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphabetic())
        .filter(|t| t.chars().count() > 2)
        .map(str::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(content: &str) -> Document {
        Document::new(content, "GS3")
    }

    #[test]
    fn tokenize_strips_short_and_non_alpha() {
        assert_eq!(
            tokenize("RBI's repo-rate: 6.5% in Q3 of FY24"),
            vec!["rbi", "repo", "rate"]
        );
    }

    #[test]
    fn matching_documents_rank_first() {
        let docs = vec![
            doc("Discuss the role of cooperative federalism."),
            doc("Evaluate monetary policy and inflation targeting by the central bank."),
            doc("Examine inflation in food prices."),
        ];
        let ranked = Bm25::new().rerank("inflation monetary policy", docs);
        assert!(ranked[0].content.starts_with("Evaluate monetary"));
        assert!(ranked[1].content.starts_with("Examine inflation"));
        assert!(ranked[2].content.starts_with("Discuss"));
    }

    #[test]
    fn ties_keep_retrieval_order() {
        let docs = vec![doc("alpha first"), doc("beta second"), doc("gamma third")];
        let ranked = Bm25::new().rerank("unrelated query", docs);
        let contents: Vec<&str> = ranked.iter().map(|d| d.content.as_str()).collect();
        assert_eq!(contents, ["alpha first", "beta second", "gamma third"]);
    }

    #[test]
    fn shorter_document_wins_equal_term_frequency() {
        let docs = vec![
            doc("drought relief measures across many districts and several long clauses"),
            doc("drought relief"),
        ];
        let scored = Bm25::new().score("drought", docs);
        assert_eq!(scored[0].0.content, "drought relief");
        assert!(scored[0].1 > scored[1].1);
    }

    #[test]
    fn empty_pool_is_empty() {
        assert!(Bm25::new().score("anything", Vec::new()).is_empty());
    }
}
