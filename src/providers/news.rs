//! NewsAPI client for current-affairs context.
//!
//! See: <https://newsapi.org/docs/endpoints/everything>

use std::time::Duration;

use async_trait::async_trait;
use chrono::{Days, Utc};
use moka::future::Cache;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::traits::{NewsProvider, NewsSnippet};
use crate::telemetry;
use crate::{MimirError, Result};

/// Default base URL for NewsAPI.
pub const DEFAULT_BASE_URL: &str = "https://newsapi.org";

/// Articles requested per query.
const PAGE_SIZE: u32 = 5;

/// How long a query's results are reused.
const RESULT_TTL: Duration = Duration::from_secs(3600);

/// NewsAPI `everything` search with a one-hour in-memory result cache.
#[derive(Clone)]
pub struct NewsApiClient {
    api_key: String,
    http: Client,
    base_url: String,
    cache: Cache<(String, u32), Vec<NewsSnippet>>,
}

impl NewsApiClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Create a client with a custom base URL (for testing with wiremock).
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(|e| MimirError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_key: api_key.into(),
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cache: Cache::builder()
                .max_capacity(1_000)
                .time_to_live(RESULT_TTL)
                .build(),
        })
    }

    async fn fetch(&self, query: &str, months: u32) -> Result<Vec<NewsSnippet>> {
        let today = Utc::now().date_naive();
        let from = today
            .checked_sub_days(Days::new(30 * u64::from(months)))
            .unwrap_or(today);

        let response = self
            .http
            .get(format!("{}/v2/everything", self.base_url))
            .header("X-Api-Key", &self.api_key)
            .query(&[
                ("q", query.to_string()),
                ("from", from.to_string()),
                ("to", today.to_string()),
                ("sortBy", "relevancy".to_string()),
                ("language", "en".to_string()),
                ("pageSize", PAGE_SIZE.to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(match status.as_u16() {
                401 => MimirError::AuthenticationFailed,
                429 => MimirError::RateLimited { retry_after: None },
                code => MimirError::Api {
                    status: code,
                    message: response
                        .text()
                        .await
                        .unwrap_or_else(|_| "unknown error".into()),
                },
            });
        }

        let body: EverythingResponse = response.json().await?;
        Ok(body.articles.into_iter().map(NewsSnippet::from).collect())
    }
}

#[derive(Deserialize)]
struct EverythingResponse {
    #[serde(default)]
    articles: Vec<Article>,
}

#[derive(Deserialize)]
struct Article {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    source: Option<ArticleSource>,
}

#[derive(Deserialize)]
struct ArticleSource {
    #[serde(default)]
    name: Option<String>,
}

impl From<Article> for NewsSnippet {
    fn from(article: Article) -> Self {
        NewsSnippet {
            title: article.title.unwrap_or_default(),
            description: article.description.unwrap_or_default(),
            source: article
                .source
                .and_then(|s| s.name)
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl NewsProvider for NewsApiClient {
    fn name(&self) -> &str {
        "newsapi"
    }

    #[instrument(name = "news.search", skip(self))]
    async fn search(&self, query: &str, months: u32) -> Result<Vec<NewsSnippet>> {
        let key = (query.to_string(), months);
        if let Some(hit) = self.cache.get(&key).await {
            metrics::counter!(telemetry::NEWS_CACHE_HITS_TOTAL).increment(1);
            return Ok(hit);
        }
        metrics::counter!(telemetry::NEWS_CACHE_MISSES_TOTAL).increment(1);

        let snippets = self.fetch(query, months).await?;
        debug!(count = snippets.len(), "fetched news");
        self.cache.insert(key, snippets.clone()).await;
        Ok(snippets)
    }
}

/// Render snippets as a bulleted context block; empty when there are none.
pub fn format_snippets(snippets: &[NewsSnippet]) -> String {
    snippets
        .iter()
        .filter(|s| !s.title.is_empty())
        .map(|s| {
            let mut line = format!("- {}", s.title);
            if !s.description.is_empty() {
                line.push_str(": ");
                line.push_str(&s.description);
            }
            if !s.source.is_empty() {
                line.push_str(&format!(" ({})", s.source));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}
