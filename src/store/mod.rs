//! Durable storage interfaces and backends.
//!
//! Two capability traits back the engine's persistent state:
//!
//! - [`KeyValueStore`]: row-level upsert/select/delete over named tables.
//!   Backs the performance store and the generation cache. Last write wins;
//!   no cross-row transactions are assumed.
//! - [`VectorStore`]: similarity search over exemplar documents, plus a plain
//!   filtered scan used as a fallback when search is unavailable.
//!
//! Backends:
//!
//! - [`MemoryStore`]: in-process, implements both traits. Used for tests
//!   and offline runs.
//! - [`RestStore`]: PostgREST over HTTP (e.g. a Supabase project),
//!   implements both traits.

mod memory;
mod rest;

pub use memory::MemoryStore;
pub use rest::RestStore;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::Result;
use crate::types::Document;

/// One stored row: column name → JSON value.
pub type Row = Map<String, Value>;

/// A single column predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Column equals value.
    Eq(String, Value),
    /// Column is strictly greater than value.
    Gt(String, Value),
    /// Column equals one of the values.
    In(String, Vec<Value>),
}

/// Sort direction for [`Filter::order_by`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Row filter: conjunction of conditions, optional ordering, offset and limit.
///
/// ```rust
/// # use mimir::store::{Filter, SortOrder};
/// let filter = Filter::new()
///     .eq("subject", "GS1")
///     .gt("expires_at", "2026-01-01T00:00:00.000000Z")
///     .order_by("created_at", SortOrder::Desc)
///     .limit(10);
/// assert_eq!(filter.conditions.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub conditions: Vec<Condition>,
    pub order: Option<(String, SortOrder)>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

impl Filter {
    /// Match every row.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Eq(column.into(), value.into()));
        self
    }

    /// Add an equality condition only when `value` is present.
    pub fn eq_opt(self, column: impl Into<String>, value: Option<&str>) -> Self {
        match value {
            Some(v) => self.eq(column, v),
            None => self,
        }
    }

    pub fn gt(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Gt(column.into(), value.into()));
        self
    }

    pub fn one_of<I, V>(mut self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.conditions.push(Condition::In(
            column.into(),
            values.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, order: SortOrder) -> Self {
        self.order = Some((column.into(), order));
        self
    }

    /// Skip the first `offset` matching rows (after ordering).
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Durable row store with row-level upsert.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Backend name for logging/debugging.
    fn name(&self) -> &str;

    /// Insert `row`, replacing any existing row with the same `key_column` value.
    async fn upsert(&self, table: &str, key_column: &str, row: Row) -> Result<()>;

    /// Insert several rows in one call. Default implementation upserts sequentially.
    async fn upsert_many(&self, table: &str, key_column: &str, rows: Vec<Row>) -> Result<()> {
        for row in rows {
            self.upsert(table, key_column, row).await?;
        }
        Ok(())
    }

    /// Rows matching `filter`.
    ///
    /// Backends may return fewer rows than `filter.limit` asks for (PostgREST
    /// caps every response at its configured `max-rows`); page with
    /// [`Filter::offset`] when every row is needed.
    async fn select(&self, table: &str, filter: &Filter) -> Result<Vec<Row>>;

    /// Exact number of rows matching `filter`'s conditions. Ordering, offset
    /// and limit are ignored.
    async fn count(&self, table: &str, filter: &Filter) -> Result<usize>;

    /// Delete rows matching `filter`. Ordering and limit are ignored.
    async fn delete(&self, table: &str, filter: &Filter) -> Result<()>;
}

/// Similarity search over exemplar documents.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Backend name for logging/debugging.
    fn name(&self) -> &str;

    /// Top-`k` documents by similarity to `query`, optionally restricted to a topic.
    async fn similarity_search(
        &self,
        query: &[f32],
        k: usize,
        topic: Option<&str>,
    ) -> Result<Vec<Document>>;

    /// Plain scan, optionally restricted to a topic, bounded to `limit` rows.
    async fn table_scan(&self, topic: Option<&str>, limit: usize) -> Result<Vec<Document>>;
}
