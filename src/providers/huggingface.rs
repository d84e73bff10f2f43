//! HuggingFace Inference API embedder.
//!
//! Uses the serverless feature-extraction pipeline.
//! See: <https://huggingface.co/docs/api-inference/index>

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::traits::EmbeddingProvider;
use crate::{MimirError, Result};

/// Default base URL for the HuggingFace inference router.
pub const DEFAULT_BASE_URL: &str = "https://router.huggingface.co/hf-inference";

/// Default sentence embedding model (384 dimensions).
pub const DEFAULT_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Embedding client for one HuggingFace model.
#[derive(Clone)]
pub struct HuggingFaceEmbedder {
    api_key: String,
    model: String,
    http: Client,
    base_url: String,
}

impl HuggingFaceEmbedder {
    /// Create an embedder for [`DEFAULT_MODEL`].
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_key, DEFAULT_MODEL, DEFAULT_BASE_URL)
    }

    /// Create an embedder with a custom model and base URL (for testing with wiremock).
    pub fn with_base_url(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| MimirError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_key: api_key.into(),
            model: model.into(),
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Model this embedder calls.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}/pipeline/feature-extraction",
            self.base_url, self.model
        )
    }

    /// Check response status and map to the appropriate error.
    fn check_status(&self, response: &reqwest::Response) -> Result<()> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        match status.as_u16() {
            401 | 403 => Err(MimirError::AuthenticationFailed),
            404 => Err(MimirError::ModelNotFound(self.model.clone())),
            429 => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .map(Duration::from_secs);
                Err(MimirError::RateLimited { retry_after })
            }
            503 => Err(MimirError::Api {
                status: 503,
                message: "Model is loading, please retry".to_string(),
            }),
            code => Err(MimirError::Api {
                status: code,
                message: format!("HuggingFace API error: {status}"),
            }),
        }
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a, T: Serialize + ?Sized> {
    inputs: &'a T,
}

/// Sentence models return one vector; token-level models return one per token.
#[derive(Deserialize)]
#[serde(untagged)]
enum EmbedResponse {
    Pooled(Vec<f32>),
    Tokens(Vec<Vec<f32>>),
}

impl EmbedResponse {
    fn into_vector(self) -> Result<Vec<f32>> {
        match self {
            EmbedResponse::Pooled(v) if !v.is_empty() => Ok(v),
            EmbedResponse::Tokens(tokens) if !tokens.is_empty() => Ok(mean_pool(&tokens)),
            _ => Err(MimirError::EmptyResponse),
        }
    }
}

fn mean_pool(tokens: &[Vec<f32>]) -> Vec<f32> {
    let dims = tokens.iter().map(Vec::len).max().unwrap_or(0);
    let mut pooled = vec![0.0f32; dims];
    for token in tokens {
        for (acc, x) in pooled.iter_mut().zip(token) {
            *acc += x;
        }
    }
    let n = tokens.len() as f32;
    pooled.iter_mut().for_each(|x| *x /= n);
    pooled
}

#[async_trait]
impl EmbeddingProvider for HuggingFaceEmbedder {
    fn name(&self) -> &str {
        "huggingface"
    }

    #[instrument(name = "huggingface.embed", skip(self, text), fields(model = %self.model))]
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let response = self
            .http
            .post(self.url())
            .bearer_auth(&self.api_key)
            .json(&EmbedRequest { inputs: text })
            .send()
            .await?;

        self.check_status(&response)?;

        let body: EmbedResponse = response.json().await?;
        body.into_vector()
    }

    #[instrument(name = "huggingface.embed_batch", skip(self, texts), fields(model = %self.model, count = texts.len()))]
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let response = self
            .http
            .post(self.url())
            .bearer_auth(&self.api_key)
            .json(&EmbedRequest { inputs: texts })
            .send()
            .await?;

        self.check_status(&response)?;

        let body: Vec<EmbedResponse> = response.json().await?;
        body.into_iter().map(EmbedResponse::into_vector).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pooled_response_passes_through() {
        let body: EmbedResponse = serde_json::from_str("[0.1, 0.2, 0.3]").unwrap();
        assert_eq!(body.into_vector().unwrap(), vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn token_response_is_mean_pooled() {
        let body: EmbedResponse = serde_json::from_str("[[1.0, 0.0], [3.0, 2.0]]").unwrap();
        assert_eq!(body.into_vector().unwrap(), vec![2.0, 1.0]);
    }

    #[test]
    fn empty_response_is_an_error() {
        let body: EmbedResponse = serde_json::from_str("[]").unwrap();
        assert!(matches!(
            body.into_vector(),
            Err(MimirError::EmptyResponse)
        ));
    }
}
