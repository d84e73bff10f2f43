//! Mimir error types

use std::time::Duration;

/// Mimir error types
#[derive(Debug, thiserror::Error)]
pub enum MimirError {
    // Provider/network errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// A client could not be built for the model (missing credentials,
    /// unsupported provider). The router skips the model without counting
    /// an attempt.
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("store error: {0}")]
    Store(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    // Soft errors
    #[error("empty response from model")]
    EmptyResponse,

    // Wrapped llm crate error
    #[error("LLM error: {0}")]
    Llm(String),
}

impl MimirError {
    /// Whether retrying the same call may succeed.
    ///
    /// Transport failures, rate limits, server-side (5xx) API errors and
    /// empty responses are transient; everything else is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            MimirError::Http(_) | MimirError::RateLimited { .. } | MimirError::EmptyResponse => {
                true
            }
            MimirError::Api { status, .. } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }

    /// Provider-supplied retry hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            MimirError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl From<llm::error::LLMError> for MimirError {
    fn from(err: llm::error::LLMError) -> Self {
        // Map llm errors to our error types
        let msg = err.to_string();
        if msg.contains("rate limit") || msg.contains("429") {
            MimirError::RateLimited { retry_after: None }
        } else if msg.contains("authentication")
            || msg.contains("401")
            || msg.contains("invalid api key")
        {
            MimirError::AuthenticationFailed
        } else if msg.contains("not found") || msg.contains("404") {
            MimirError::ModelNotFound(msg)
        } else {
            MimirError::Llm(msg)
        }
    }
}

impl From<reqwest::Error> for MimirError {
    fn from(err: reqwest::Error) -> Self {
        MimirError::Http(err.to_string())
    }
}

/// Result type alias for Mimir operations
pub type Result<T> = std::result::Result<T, MimirError>;
