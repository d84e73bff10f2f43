//! LLM crate wrapper implementing [`LlmClient`].
//!
//! [`LlmChatClient`] builds an llm provider once, at construction, so that
//! construction failures surface from the client factory (and the router can
//! skip the model) rather than from `invoke`.

use async_trait::async_trait;
use llm::LLMProvider;
use llm::builder::{LLMBackend, LLMBuilder};
use llm::chat::ChatMessage;
use tracing::instrument;

use super::traits::LlmClient;
use crate::types::Provider;
use crate::{MimirError, Result};

/// Generation parameters applied to every call a client makes.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatParams {
    /// System prompt, if the provider should get one.
    pub system_prompt: Option<String>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Request timeout enforced by the provider client.
    pub timeout_secs: u64,
}

impl Default for ChatParams {
    fn default() -> Self {
        Self {
            system_prompt: None,
            temperature: 0.7,
            max_tokens: None,
            timeout_secs: 60,
        }
    }
}

/// A built llm provider bound to one model.
pub struct LlmChatClient {
    name: String,
    provider: Box<dyn LLMProvider>,
}

impl LlmChatClient {
    /// Build a client for `model_id` on `provider`.
    ///
    /// # Arguments
    ///
    /// * `name` - Registry name for logging (e.g. "gemma2-9b")
    /// * `provider` - Which backend serves the model
    /// * `model_id` - Provider-side model identifier
    /// * `api_key` - Credential for the backend
    pub fn new(
        name: impl Into<String>,
        provider: Provider,
        model_id: &str,
        api_key: &str,
        params: &ChatParams,
    ) -> Result<Self> {
        let mut builder = LLMBuilder::new()
            .backend(backend_for(provider))
            .api_key(api_key)
            .model(model_id)
            .temperature(params.temperature)
            .timeout_seconds(params.timeout_secs);

        if let Some(ref system) = params.system_prompt {
            builder = builder.system(system);
        }
        if let Some(max) = params.max_tokens {
            builder = builder.max_tokens(max);
        }

        let provider = builder
            .build()
            .map_err(|e| MimirError::ProviderUnavailable(e.to_string()))?;

        Ok(Self {
            name: name.into(),
            provider,
        })
    }
}

/// Map a registry provider onto the llm crate backend.
fn backend_for(provider: Provider) -> LLMBackend {
    match provider {
        Provider::Groq => LLMBackend::Groq,
        Provider::Google => LLMBackend::Google,
        Provider::OpenRouter => LLMBackend::OpenRouter,
    }
}

#[async_trait]
impl LlmClient for LlmChatClient {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "llm.invoke", skip(self, prompt), fields(model = %self.name, prompt_len = prompt.len()))]
    async fn invoke(&self, prompt: &str) -> Result<String> {
        let messages = [ChatMessage::user().content(prompt).build()];
        let response = self
            .provider
            .chat(&messages)
            .await
            .map_err(MimirError::from)?;

        let text = response.text().unwrap_or_default();
        let text = text.trim();
        if text.is_empty() {
            return Err(MimirError::EmptyResponse);
        }
        Ok(text.to_string())
    }
}
