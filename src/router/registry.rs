//! Immutable model registry: routable name → provider and model id.

use std::collections::HashMap;

use crate::types::{ModelDescriptor, Provider};
use crate::{MimirError, Result};

/// Registered models plus the static priority order used for routing.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: HashMap<String, ModelDescriptor>,
    priority: Vec<String>,
}

impl ModelRegistry {
    /// Build a registry.
    ///
    /// Priority entries that are not registered are dropped; duplicate
    /// priority entries keep their first position.
    pub fn new(models: Vec<ModelDescriptor>, priority: Vec<String>) -> Result<Self> {
        let mut map = HashMap::with_capacity(models.len());
        for model in models {
            if model.name.trim().is_empty() {
                return Err(MimirError::Configuration(
                    "model name must not be empty".to_string(),
                ));
            }
            if map.insert(model.name.clone(), model).is_some() {
                return Err(MimirError::Configuration(
                    "duplicate model name in registry".to_string(),
                ));
            }
        }

        let mut ordered: Vec<String> = Vec::with_capacity(priority.len());
        for name in priority {
            if map.contains_key(&name) && !ordered.contains(&name) {
                ordered.push(name);
            }
        }

        Ok(Self {
            models: map,
            priority: ordered,
        })
    }

    /// The registry the engine ships with.
    pub fn builtin() -> Self {
        let models = vec![
            ModelDescriptor::new("llama3-70b", Provider::Groq, "llama3-70b-8192"),
            ModelDescriptor::new("llama3-8b", Provider::Groq, "llama3-8b-8192"),
            ModelDescriptor::new("gemma2-9b", Provider::Groq, "gemma2-9b-it"),
            ModelDescriptor::new("deepseek-r1", Provider::OpenRouter, "deepseek/deepseek-r1:free"),
            ModelDescriptor::new(
                "deepseek-v3",
                Provider::OpenRouter,
                "deepseek/deepseek-chat-v3-0324:free",
            ),
            ModelDescriptor::new("moonshot-k2", Provider::OpenRouter, "moonshotai/kimi-k2:free"),
            ModelDescriptor::new("gemini-1.5-flash", Provider::Google, "gemini-1.5-flash-latest"),
        ];
        let priority = ["gemma2-9b", "deepseek-v3", "llama3-70b", "moonshot-k2", "deepseek-r1"]
            .into_iter()
            .map(String::from)
            .collect();

        let mut map = HashMap::with_capacity(models.len());
        for model in models {
            map.insert(model.name.clone(), model);
        }
        Self {
            models: map,
            priority,
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelDescriptor> {
        self.models.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    /// Static priority order; every entry is registered.
    pub fn priority(&self) -> &[String] {
        &self.priority
    }

    /// Registered model names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.models.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
