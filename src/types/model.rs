//! Model registry entry types.
//!
//! Types for describing the LLM backends a registry can route to.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An LLM provider with its own auth and model-id scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Groq inference API.
    Groq,
    /// Google Gemini API.
    Google,
    /// OpenRouter (routes to many upstream models).
    OpenRouter,
}

impl Provider {
    /// Stable lowercase name, used for logging, config and secrets lookup.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Groq => "groq",
            Provider::Google => "google",
            Provider::OpenRouter => "openrouter",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static registry entry: a routable model name and how to reach it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Registry name used by callers and in performance records (e.g. "gemma2-9b").
    pub name: String,
    /// Provider serving the model.
    pub provider: Provider,
    /// Provider-side model identifier (e.g. "gemma2-9b-it").
    pub provider_model_id: String,
}

impl ModelDescriptor {
    /// Create a new descriptor.
    pub fn new(
        name: impl Into<String>,
        provider: Provider,
        provider_model_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            provider,
            provider_model_id: provider_model_id.into(),
        }
    }
}

/// Aggregate latency for one model. No raw series is kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub model_name: String,
    pub mean_latency_seconds: f64,
    pub sample_count: u64,
}
