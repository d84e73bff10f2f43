//! PostgREST backend (e.g. a Supabase project).
//!
//! Tables are addressed as `{base_url}/rest/v1/{table}`; similarity search
//! calls the `match_documents` RPC, the function LangChain's Supabase vector
//! store installs. See: <https://postgrest.org/en/stable/references/api.html>

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_RANGE;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::instrument;

use super::{Condition, Filter, KeyValueStore, Row, SortOrder, VectorStore};
use crate::types::Document;
use crate::{MimirError, Result};

/// Default table holding exemplar documents.
const DEFAULT_DOCUMENTS_TABLE: &str = "documents";

/// Default similarity-search RPC.
const DEFAULT_MATCH_FUNCTION: &str = "match_documents";

/// PostgREST client implementing [`KeyValueStore`] and [`VectorStore`].
#[derive(Clone)]
pub struct RestStore {
    http: Client,
    base_url: String,
    api_key: String,
    documents_table: String,
    match_function: String,
}

impl RestStore {
    /// Create a client for the project at `base_url` (without the `/rest/v1` suffix).
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| MimirError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_http_client(base_url, api_key, http))
    }

    /// Create a client sharing an existing connection pool.
    pub fn with_http_client(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        http: Client,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            documents_table: DEFAULT_DOCUMENTS_TABLE.to_string(),
            match_function: DEFAULT_MATCH_FUNCTION.to_string(),
        }
    }

    /// Override the exemplar documents table.
    pub fn documents_table(mut self, table: impl Into<String>) -> Self {
        self.documents_table = table.into();
        self
    }

    /// Override the similarity-search RPC name.
    pub fn match_function(mut self, function: impl Into<String>) -> Self {
        self.match_function = function.into();
        self
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}/rest/v1/{}", self.base_url, path))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        Err(match status {
            StatusCode::TOO_MANY_REQUESTS => MimirError::RateLimited { retry_after: None },
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => MimirError::AuthenticationFailed,
            _ => MimirError::Api {
                status: status.as_u16(),
                message: response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown error".into()),
            },
        })
    }
}

#[async_trait]
impl KeyValueStore for RestStore {
    fn name(&self) -> &str {
        "postgrest"
    }

    async fn upsert(&self, table: &str, key_column: &str, row: Row) -> Result<()> {
        self.upsert_many(table, key_column, vec![row]).await
    }

    #[instrument(name = "rest.upsert", skip(self, rows), fields(rows = rows.len()))]
    async fn upsert_many(&self, table: &str, key_column: &str, rows: Vec<Row>) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let request = self
            .request(Method::POST, table)
            .query(&[("on_conflict", key_column)])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&rows);
        self.send(request).await?;
        Ok(())
    }

    #[instrument(name = "rest.select", skip(self, filter))]
    async fn select(&self, table: &str, filter: &Filter) -> Result<Vec<Row>> {
        let mut params = vec![("select".to_string(), "*".to_string())];
        params.extend(query_params(filter));
        let response = self
            .send(self.request(Method::GET, table).query(&params))
            .await?;
        Ok(response.json().await?)
    }

    /// `HEAD` with `Prefer: count=exact`; the total is the part of
    /// `Content-Range` after the slash.
    #[instrument(name = "rest.count", skip(self, filter))]
    async fn count(&self, table: &str, filter: &Filter) -> Result<usize> {
        let response = self
            .send(
                self.request(Method::HEAD, table)
                    .query(&condition_params(&filter.conditions))
                    .header("Prefer", "count=exact"),
            )
            .await?;
        let range = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| MimirError::Store(format!("count on '{table}' returned no Content-Range")))?;
        parse_content_range_total(range)
            .ok_or_else(|| MimirError::Store(format!("unexpected Content-Range '{range}'")))
    }

    #[instrument(name = "rest.delete", skip(self, filter))]
    async fn delete(&self, table: &str, filter: &Filter) -> Result<()> {
        let params = condition_params(&filter.conditions);
        self.send(self.request(Method::DELETE, table).query(&params))
            .await?;
        Ok(())
    }
}

/// Row shape returned by the documents table and the match RPC.
#[derive(Debug, Deserialize)]
struct DocumentRow {
    content: String,
    #[serde(default)]
    metadata: Value,
}

impl From<DocumentRow> for Document {
    fn from(row: DocumentRow) -> Self {
        let topic = row
            .metadata
            .get("topic")
            .and_then(Value::as_str)
            .unwrap_or_default();
        Document::new(row.content, topic)
    }
}

#[async_trait]
impl VectorStore for RestStore {
    fn name(&self) -> &str {
        "postgrest"
    }

    #[instrument(name = "rest.similarity_search", skip(self, query), fields(dims = query.len()))]
    async fn similarity_search(
        &self,
        query: &[f32],
        k: usize,
        topic: Option<&str>,
    ) -> Result<Vec<Document>> {
        let filter = match topic {
            Some(t) => json!({ "topic": t }),
            None => json!({}),
        };
        let body = json!({
            "query_embedding": query,
            "match_count": k,
            "filter": filter,
        });
        let response = self
            .send(
                self.request(Method::POST, &format!("rpc/{}", self.match_function))
                    .json(&body),
            )
            .await?;
        let rows: Vec<DocumentRow> = response.json().await?;
        Ok(rows.into_iter().take(k).map(Document::from).collect())
    }

    #[instrument(name = "rest.table_scan", skip(self))]
    async fn table_scan(&self, topic: Option<&str>, limit: usize) -> Result<Vec<Document>> {
        let mut params = vec![
            ("select".to_string(), "content,metadata".to_string()),
            ("limit".to_string(), limit.to_string()),
        ];
        if let Some(t) = topic {
            params.push(("metadata->>topic".to_string(), format!("eq.{t}")));
        }
        let response = self
            .send(
                self.request(Method::GET, &self.documents_table)
                    .query(&params),
            )
            .await?;
        let rows: Vec<DocumentRow> = response.json().await?;
        Ok(rows.into_iter().map(Document::from).collect())
    }
}

/// Full PostgREST query string for a filter.
fn query_params(filter: &Filter) -> Vec<(String, String)> {
    let mut params = condition_params(&filter.conditions);
    if let Some((column, order)) = &filter.order {
        let direction = match order {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        };
        params.push(("order".to_string(), format!("{column}.{direction}")));
    }
    if let Some(offset) = filter.offset {
        params.push(("offset".to_string(), offset.to_string()));
    }
    if let Some(limit) = filter.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    params
}

/// Total from a `Content-Range` header such as `0-24/1500` or `*/0`.
fn parse_content_range_total(range: &str) -> Option<usize> {
    range.rsplit_once('/')?.1.trim().parse().ok()
}

fn condition_params(conditions: &[Condition]) -> Vec<(String, String)> {
    conditions
        .iter()
        .map(|condition| match condition {
            Condition::Eq(column, value) => (column.clone(), format!("eq.{}", literal(value))),
            Condition::Gt(column, value) => (column.clone(), format!("gt.{}", literal(value))),
            Condition::In(column, values) => {
                let list: Vec<String> = values
                    .iter()
                    .map(|v| match v {
                        Value::String(s) => format!("\"{}\"", s.replace('"', "\\\"")),
                        other => literal(other),
                    })
                    .collect();
                (column.clone(), format!("in.({})", list.join(",")))
            }
        })
        .collect()
}

fn literal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_params_cover_all_conditions() {
        let filter = Filter::new()
            .eq("subject", "GS1")
            .gt("n", 3)
            .one_of("id", ["a", "b"])
            .order_by("created_at", SortOrder::Desc)
            .offset(10)
            .limit(5);
        let params = query_params(&filter);
        assert_eq!(
            params,
            vec![
                ("subject".to_string(), "eq.GS1".to_string()),
                ("n".to_string(), "gt.3".to_string()),
                ("id".to_string(), "in.(\"a\",\"b\")".to_string()),
                ("order".to_string(), "created_at.desc".to_string()),
                ("offset".to_string(), "10".to_string()),
                ("limit".to_string(), "5".to_string()),
            ]
        );
    }

    #[test]
    fn content_range_total() {
        assert_eq!(parse_content_range_total("0-24/1500"), Some(1500));
        assert_eq!(parse_content_range_total("*/0"), Some(0));
        assert_eq!(parse_content_range_total("0-24/*"), None);
        assert_eq!(parse_content_range_total("garbage"), None);
    }

    #[test]
    fn document_row_reads_topic_from_metadata() {
        let row: DocumentRow = serde_json::from_value(json!({
            "content": "Discuss federalism.",
            "metadata": {"topic": "GS2 - Polity"}
        }))
        .unwrap();
        let doc = Document::from(row);
        assert_eq!(doc.topic, "GS2 - Polity");

        let untagged: DocumentRow =
            serde_json::from_value(json!({"content": "x"})).unwrap();
        assert_eq!(Document::from(untagged).topic, "");
    }
}
