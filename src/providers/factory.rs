//! Client construction for registered models.

use std::sync::Arc;

use super::llm_chat::{ChatParams, LlmChatClient};
use super::traits::LlmClient;
use crate::types::{ModelDescriptor, Provider};
use crate::{MimirError, Result};

/// System prompt given to OpenRouter-hosted models, some of which drift
/// into other languages or wrap answers in commentary.
pub const OPENROUTER_SYSTEM_PROMPT: &str = "You are an expert UPSC examiner. Answer only in English \
and return exactly the format the user asks for.";

/// Builds a callable client for a registered model.
///
/// An `Err` means the model cannot be used right now (missing credentials,
/// unsupported provider); the router skips it without counting an attempt.
pub trait ClientFactory: Send + Sync {
    fn build(&self, model: &ModelDescriptor) -> Result<Arc<dyn LlmClient>>;
}

/// API keys per provider. A missing key makes that provider unavailable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderKeys {
    pub groq: Option<String>,
    pub google: Option<String>,
    pub openrouter: Option<String>,
}

impl ProviderKeys {
    /// Key for `provider`, ignoring blank values.
    pub fn get(&self, provider: Provider) -> Option<&str> {
        let key = match provider {
            Provider::Groq => &self.groq,
            Provider::Google => &self.google,
            Provider::OpenRouter => &self.openrouter,
        };
        key.as_deref().filter(|k| !k.trim().is_empty())
    }
}

/// [`ClientFactory`] building [`LlmChatClient`]s from stored credentials.
#[derive(Debug, Clone)]
pub struct CredentialedClientFactory {
    keys: ProviderKeys,
    params: ChatParams,
    openrouter_system_prompt: String,
}

impl CredentialedClientFactory {
    pub fn new(keys: ProviderKeys) -> Self {
        Self {
            keys,
            params: ChatParams {
                max_tokens: Some(800),
                ..ChatParams::default()
            },
            openrouter_system_prompt: OPENROUTER_SYSTEM_PROMPT.to_string(),
        }
    }

    /// Generation parameters for every client.
    pub fn params(mut self, params: ChatParams) -> Self {
        self.params = params;
        self
    }

    pub fn openrouter_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.openrouter_system_prompt = prompt.into();
        self
    }

    /// Parameters for a given provider: OpenRouter gets the system prompt.
    fn params_for(&self, provider: Provider) -> ChatParams {
        let mut params = self.params.clone();
        if provider == Provider::OpenRouter && params.system_prompt.is_none() {
            params.system_prompt = Some(self.openrouter_system_prompt.clone());
        }
        params
    }
}

impl ClientFactory for CredentialedClientFactory {
    fn build(&self, model: &ModelDescriptor) -> Result<Arc<dyn LlmClient>> {
        let api_key = self.keys.get(model.provider).ok_or_else(|| {
            MimirError::ProviderUnavailable(format!("no API key configured for {}", model.provider))
        })?;

        let client = LlmChatClient::new(
            &model.name,
            model.provider,
            &model.provider_model_id,
            api_key,
            &self.params_for(model.provider),
        )?;
        Ok(Arc::new(client))
    }
}
