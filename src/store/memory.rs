//! In-process store implementing both [`KeyValueStore`] and [`VectorStore`].

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;

use super::{Condition, Filter, KeyValueStore, Row, SortOrder, VectorStore};
use crate::types::Document;
use crate::{MimirError, Result};

/// In-memory tables and document set.
///
/// Rows keep insertion order, so equal sort keys come back in the order
/// they were written.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Vec<Row>>>,
    documents: RwLock<Vec<Document>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store preloaded with exemplar documents.
    pub fn with_documents(documents: Vec<Document>) -> Self {
        Self {
            tables: RwLock::default(),
            documents: RwLock::new(documents),
        }
    }

    /// Add an exemplar document.
    pub fn insert_document(&self, document: Document) -> Result<()> {
        self.documents
            .write()
            .map_err(|e| MimirError::Store(format!("Failed to acquire write lock: {e}")))?
            .push(document);
        Ok(())
    }

    /// Number of rows currently in `table`.
    pub fn row_count(&self, table: &str) -> usize {
        self.tables
            .read()
            .map(|tables| tables.get(table).map_or(0, Vec::len))
            .unwrap_or(0)
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn upsert(&self, table: &str, key_column: &str, row: Row) -> Result<()> {
        let key = row
            .get(key_column)
            .cloned()
            .ok_or_else(|| MimirError::InvalidInput(format!("row has no '{key_column}' column")))?;

        let mut tables = self
            .tables
            .write()
            .map_err(|e| MimirError::Store(format!("Failed to acquire write lock: {e}")))?;
        let rows = tables.entry(table.to_string()).or_default();
        match rows.iter_mut().find(|r| r.get(key_column) == Some(&key)) {
            Some(existing) => *existing = row,
            None => rows.push(row),
        }
        Ok(())
    }

    async fn select(&self, table: &str, filter: &Filter) -> Result<Vec<Row>> {
        let tables = self
            .tables
            .read()
            .map_err(|e| MimirError::Store(format!("Failed to acquire read lock: {e}")))?;
        let mut rows: Vec<Row> = tables
            .get(table)
            .map(|rows| rows.iter().filter(|r| matches(r, filter)).cloned().collect())
            .unwrap_or_default();

        if let Some((column, order)) = &filter.order {
            rows.sort_by(|a, b| {
                let ord = compare(a.get(column), b.get(column));
                match order {
                    SortOrder::Asc => ord,
                    SortOrder::Desc => ord.reverse(),
                }
            });
        }
        let mut rows: Vec<Row> = rows.into_iter().skip(filter.offset.unwrap_or(0)).collect();
        if let Some(limit) = filter.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn count(&self, table: &str, filter: &Filter) -> Result<usize> {
        let tables = self
            .tables
            .read()
            .map_err(|e| MimirError::Store(format!("Failed to acquire read lock: {e}")))?;
        Ok(tables
            .get(table)
            .map_or(0, |rows| rows.iter().filter(|r| matches(r, filter)).count()))
    }

    async fn delete(&self, table: &str, filter: &Filter) -> Result<()> {
        let mut tables = self
            .tables
            .write()
            .map_err(|e| MimirError::Store(format!("Failed to acquire write lock: {e}")))?;
        if let Some(rows) = tables.get_mut(table) {
            rows.retain(|r| !matches(r, filter));
        }
        Ok(())
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn similarity_search(
        &self,
        query: &[f32],
        k: usize,
        topic: Option<&str>,
    ) -> Result<Vec<Document>> {
        let documents = self
            .documents
            .read()
            .map_err(|e| MimirError::Store(format!("Failed to acquire read lock: {e}")))?;

        let mut scored: Vec<(f32, &Document)> = documents
            .iter()
            .filter(|d| topic.is_none_or(|t| d.topic == t))
            .filter(|d| d.embedding.len() == query.len() && !query.is_empty())
            .map(|d| (cosine_similarity(query, &d.embedding), d))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

        Ok(scored.into_iter().take(k).map(|(_, d)| d.clone()).collect())
    }

    async fn table_scan(&self, topic: Option<&str>, limit: usize) -> Result<Vec<Document>> {
        let documents = self
            .documents
            .read()
            .map_err(|e| MimirError::Store(format!("Failed to acquire read lock: {e}")))?;
        Ok(documents
            .iter()
            .filter(|d| topic.is_none_or(|t| d.topic == t))
            .take(limit)
            .cloned()
            .collect())
    }
}

fn matches(row: &Row, filter: &Filter) -> bool {
    filter.conditions.iter().all(|condition| match condition {
        Condition::Eq(column, value) => row.get(column) == Some(value),
        Condition::Gt(column, value) => compare(row.get(column), Some(value)) == Ordering::Greater,
        Condition::In(column, values) => row.get(column).is_some_and(|v| values.contains(v)),
    })
}

/// Order JSON scalars: numbers numerically, strings lexically, missing/null first.
fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Less,
        (_, None | Some(Value::Null)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn upsert_replaces_by_key() {
        let store = MemoryStore::new();
        store
            .upsert("t", "id", row(json!({"id": "a", "n": 1})))
            .await
            .unwrap();
        store
            .upsert("t", "id", row(json!({"id": "a", "n": 2})))
            .await
            .unwrap();

        let rows = store.select("t", &Filter::new()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["n"], json!(2));
    }

    #[tokio::test]
    async fn upsert_without_key_column_is_rejected() {
        let store = MemoryStore::new();
        let err = store
            .upsert("t", "id", row(json!({"n": 1})))
            .await
            .unwrap_err();
        assert!(matches!(err, MimirError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn select_filters_orders_and_limits() {
        let store = MemoryStore::new();
        for (id, subject, at) in [("1", "GS1", "b"), ("2", "GS2", "c"), ("3", "GS1", "a")] {
            store
                .upsert("t", "id", row(json!({"id": id, "subject": subject, "at": at})))
                .await
                .unwrap();
        }

        let filter = Filter::new()
            .eq("subject", "GS1")
            .order_by("at", SortOrder::Desc)
            .limit(1);
        let rows = store.select("t", &filter).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], json!("1"));

        let newer = store
            .select("t", &Filter::new().gt("at", "a"))
            .await
            .unwrap();
        assert_eq!(newer.len(), 2);
    }

    #[tokio::test]
    async fn offset_pages_and_count_ignores_limit() {
        let store = MemoryStore::new();
        for id in ["a", "b", "c", "d", "e"] {
            store
                .upsert("t", "id", row(json!({"id": id, "subject": "GS1"})))
                .await
                .unwrap();
        }

        let page = Filter::new()
            .order_by("id", SortOrder::Asc)
            .offset(3)
            .limit(10);
        let rows = store.select("t", &page).await.unwrap();
        let ids: Vec<&Value> = rows.iter().map(|r| &r["id"]).collect();
        assert_eq!(ids, vec![&json!("d"), &json!("e")]);

        let filter = Filter::new().eq("subject", "GS1").limit(2);
        assert_eq!(store.count("t", &filter).await.unwrap(), 5);
        assert_eq!(store.count("missing", &Filter::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_with_one_of() {
        let store = MemoryStore::new();
        for id in ["1", "2", "3"] {
            store
                .upsert("t", "id", row(json!({"id": id})))
                .await
                .unwrap();
        }
        store
            .delete("t", &Filter::new().one_of("id", ["1", "3"]))
            .await
            .unwrap();
        assert_eq!(store.row_count("t"), 1);
    }

    #[tokio::test]
    async fn similarity_search_ranks_by_cosine() {
        let store = MemoryStore::with_documents(vec![
            Document::new("far", "GS1").with_embedding(vec![0.0, 1.0]),
            Document::new("near", "GS1").with_embedding(vec![1.0, 0.1]),
            Document::new("other topic", "GS2").with_embedding(vec![1.0, 0.0]),
        ]);

        let docs = store
            .similarity_search(&[1.0, 0.0], 1, Some("GS1"))
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].content, "near");
    }

    #[tokio::test]
    async fn table_scan_is_bounded() {
        let store = MemoryStore::with_documents(
            (0..10).map(|i| Document::new(format!("doc {i}"), "GS1")).collect(),
        );
        let docs = store.table_scan(Some("GS1"), 3).await.unwrap();
        assert_eq!(docs.len(), 3);
        assert!(store.table_scan(Some("GS4"), 3).await.unwrap().is_empty());
    }
}
