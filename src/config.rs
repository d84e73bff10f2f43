//! Configuration loading.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. `--config <path>` (CLI flag)
//! 2. `~/.mimir/config.toml` (user)
//! 3. `/etc/mimir/config.toml` (system)
//!
//! When no file exists every section takes its defaults.
//!
//! Secrets are loaded separately with mandatory permission checks:
//! 1. `~/.mimir/secrets.toml` (user, must be 0600)
//! 2. `/etc/mimir/secrets.toml` (system, must be 0600)
//!
//! Each key falls back to an environment variable.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::TimeDelta;
use serde::Deserialize;
use tracing::warn;

use crate::cache::{DEFAULT_MAX_PER_TOPIC, DEFAULT_TTL_DAYS};
use crate::providers::{
    ChatParams, CredentialedClientFactory, HuggingFaceEmbedder, NewsApiClient, ProviderKeys,
    RetryConfig, huggingface, news,
};
use crate::router::{DEFAULT_MIN_SAMPLES, ModelRegistry};
use crate::service::{GenerationServiceBuilder, GenerationSettings};
use crate::store::{MemoryStore, RestStore};
use crate::types::ModelDescriptor;
use crate::{MimirError, Result};

/// Engine configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub news: NewsConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

/// PostgREST backend. Without a URL an in-memory store is used.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Project URL without the `/rest/v1` suffix.
    pub url: Option<String>,
    pub documents_table: String,
    pub match_function: String,
    pub performance_table: String,
    pub cache_table: String,
    pub index_table: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            documents_table: "documents".to_string(),
            match_function: "match_documents".to_string(),
            performance_table: crate::router::DEFAULT_PERFORMANCE_TABLE.to_string(),
            cache_table: crate::cache::DEFAULT_CACHE_TABLE.to_string(),
            index_table: crate::cache::DEFAULT_INDEX_TABLE.to_string(),
        }
    }
}

/// Embedding endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub model: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: huggingface::DEFAULT_BASE_URL.to_string(),
            model: huggingface::DEFAULT_MODEL.to_string(),
        }
    }
}

/// News search endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NewsConfig {
    pub base_url: String,
    /// Disable to ignore a configured news key.
    pub enabled: bool,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            base_url: news::DEFAULT_BASE_URL.to_string(),
            enabled: true,
        }
    }
}

/// Parameters shared by every LLM client.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub timeout_secs: u64,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Replaces the built-in OpenRouter system prompt.
    pub system_prompt: Option<String>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            temperature: 0.7,
            max_tokens: Some(800),
            system_prompt: None,
        }
    }
}

/// Optional registry override.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Replaces the built-in models when non-empty.
    pub registry: Vec<ModelDescriptor>,
    /// Replaces the built-in priority list when non-empty.
    pub priority: Vec<String>,
}

impl ModelsConfig {
    /// Registry from this section, falling back to the built-in one.
    pub fn build_registry(&self) -> Result<ModelRegistry> {
        let builtin = ModelRegistry::builtin();
        if self.registry.is_empty() && self.priority.is_empty() {
            return Ok(builtin);
        }
        let models = if self.registry.is_empty() {
            builtin
                .names()
                .into_iter()
                .filter_map(|name| builtin.get(name).cloned())
                .collect()
        } else {
            self.registry.clone()
        };
        let priority = if self.priority.is_empty() {
            builtin.priority().to_vec()
        } else {
            self.priority.clone()
        };
        ModelRegistry::new(models, priority)
    }
}

/// Generation cache limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_days: i64,
    pub max_per_topic: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_days: DEFAULT_TTL_DAYS,
            max_per_topic: DEFAULT_MAX_PER_TOPIC,
        }
    }
}

/// Request-flow settings plus the adaptive routing threshold.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub min_samples: u64,
    #[serde(flatten)]
    pub settings: GenerationSettings,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            min_samples: DEFAULT_MIN_SAMPLES,
            settings: GenerationSettings::default(),
        }
    }
}

/// API keys.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Secrets {
    #[serde(default)]
    pub groq: Option<ApiKeySecret>,
    #[serde(default)]
    pub google: Option<ApiKeySecret>,
    #[serde(default)]
    pub openrouter: Option<ApiKeySecret>,
    #[serde(default)]
    pub huggingface: Option<ApiKeySecret>,
    #[serde(default)]
    pub newsapi: Option<ApiKeySecret>,
    /// Service key for the PostgREST store.
    #[serde(default)]
    pub store: Option<ApiKeySecret>,
}

/// A single API key secret.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeySecret {
    pub api_key: String,
}

/// Secret name → environment variable name mapping.
const SECRET_ENV_VARS: &[(&str, &str)] = &[
    ("groq", "GROQ_API_KEY"),
    ("google", "GOOGLE_API_KEY"),
    ("openrouter", "OPENROUTER_API_KEY"),
    ("huggingface", "HUGGINGFACE_API_KEY"),
    ("newsapi", "NEWSAPI_KEY"),
    ("store", "SUPABASE_KEY"),
];

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// An explicit path must exist. Otherwise a missing file yields defaults.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::load_from_file(&path),
            None => Ok(Config::default()),
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            MimirError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            MimirError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })
    }

    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(MimirError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".mimir").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        let system_config = PathBuf::from("/etc/mimir/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }

    /// Wire a service builder from this configuration and `secrets`.
    ///
    /// The embedding key is required. Missing LLM keys only make those
    /// providers unavailable; a missing news key disables current affairs.
    pub fn service_builder(&self, secrets: &Secrets) -> Result<GenerationServiceBuilder> {
        let keys = ProviderKeys {
            groq: secrets.api_key("groq"),
            google: secrets.api_key("google"),
            openrouter: secrets.api_key("openrouter"),
        };
        let params = ChatParams {
            system_prompt: None,
            temperature: self.providers.temperature,
            max_tokens: self.providers.max_tokens,
            timeout_secs: self.providers.timeout_secs,
        };
        let mut factory = CredentialedClientFactory::new(keys).params(params);
        if let Some(prompt) = &self.providers.system_prompt {
            factory = factory.openrouter_system_prompt(prompt.clone());
        }

        let hf_key = secrets.api_key("huggingface").ok_or_else(|| {
            MimirError::Configuration(
                "No HuggingFace key: set [huggingface] in secrets.toml or HUGGINGFACE_API_KEY"
                    .to_string(),
            )
        })?;
        let embedder = HuggingFaceEmbedder::with_base_url(
            hf_key,
            self.embedding.model.clone(),
            self.embedding.base_url.clone(),
        )?;

        let mut builder = GenerationServiceBuilder::new()
            .registry(self.models.build_registry()?)
            .client_factory(Arc::new(factory))
            .embedder(Arc::new(embedder))
            .settings(self.generation.settings.clone())
            .retry(self.retry.clone())
            .cache_ttl(TimeDelta::days(self.cache.ttl_days))
            .cache_max_per_topic(self.cache.max_per_topic)
            .cache_tables(&self.store.cache_table, &self.store.index_table)
            .performance_table(&self.store.performance_table)
            .min_samples(self.generation.min_samples);

        builder = match (&self.store.url, secrets.api_key("store")) {
            (Some(url), Some(key)) => builder.store(Arc::new(
                RestStore::new(url.clone(), key)?
                    .documents_table(&self.store.documents_table)
                    .match_function(&self.store.match_function),
            )),
            (Some(_), None) => {
                return Err(MimirError::Configuration(
                    "[store] url is set but no store key: set [store] in secrets.toml or SUPABASE_KEY"
                        .to_string(),
                ));
            }
            (None, _) => {
                warn!("no [store] url configured, using an in-memory store");
                builder.store(Arc::new(MemoryStore::new()))
            }
        };

        if self.news.enabled
            && let Some(key) = secrets.api_key("newsapi")
        {
            builder = builder.news(Arc::new(NewsApiClient::with_base_url(
                key,
                self.news.base_url.clone(),
            )?));
        }

        Ok(builder)
    }
}

impl Secrets {
    /// Load secrets from the standard locations with permission checks.
    ///
    /// Returns empty secrets if no file exists (keys may come from env vars).
    pub fn load() -> Result<Self> {
        if let Some(home) = dirs::home_dir() {
            let user_secrets = home.join(".mimir").join("secrets.toml");
            if user_secrets.exists() {
                Self::check_permissions(&user_secrets)?;
                return Self::load_from_file(&user_secrets);
            }
        }

        let system_secrets = PathBuf::from("/etc/mimir/secrets.toml");
        if system_secrets.exists() {
            Self::check_permissions(&system_secrets)?;
            return Self::load_from_file(&system_secrets);
        }

        Ok(Secrets::default())
    }

    /// Load from an explicit path, checking permissions first.
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::check_permissions(path)?;
        Self::load_from_file(path)
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            MimirError::Configuration(format!("Failed to read secrets file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            MimirError::Configuration(format!("Failed to parse secrets file {path:?}: {e}"))
        })
    }

    /// Reject secrets files readable by group or others.
    #[cfg(unix)]
    fn check_permissions(path: &Path) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let metadata = fs::metadata(path).map_err(|e| {
            MimirError::Configuration(format!("Failed to stat secrets file {path:?}: {e}"))
        })?;

        let mode = metadata.permissions().mode();
        if mode & 0o077 != 0 {
            return Err(MimirError::Configuration(format!(
                "Secrets file {path:?} has insecure permissions {:o}. Must be 0600 or 0400.",
                mode & 0o777
            )));
        }

        Ok(())
    }

    #[cfg(not(unix))]
    fn check_permissions(_path: &Path) -> Result<()> {
        Ok(())
    }

    /// Key by name, falling back to the corresponding environment variable.
    pub fn api_key(&self, name: &str) -> Option<String> {
        let from_file = match name {
            "groq" => self.groq.as_ref(),
            "google" => self.google.as_ref(),
            "openrouter" => self.openrouter.as_ref(),
            "huggingface" => self.huggingface.as_ref(),
            "newsapi" => self.newsapi.as_ref(),
            "store" => self.store.as_ref(),
            _ => None,
        }
        .map(|s| s.api_key.clone())
        .filter(|k| !k.trim().is_empty());

        from_file.or_else(|| {
            SECRET_ENV_VARS
                .iter()
                .find(|(secret, _)| *secret == name)
                .and_then(|(_, env_var)| std::env::var(env_var).ok())
                .filter(|k| !k.trim().is_empty())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn defaults_without_any_section() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.cache.ttl_days, 7);
        assert_eq!(config.cache.max_per_topic, 50);
        assert_eq!(config.generation.min_samples, 3);
        assert_eq!(config.generation.settings, GenerationSettings::default());
        assert_eq!(config.providers.timeout_secs, 60);
        assert!(config.news.enabled);
        assert!(config.store.url.is_none());
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
            [store]
            url = "https://project.supabase.co"
            documents_table = "pyq"

            [providers]
            timeout_secs = 30
            temperature = 0.4

            [models]
            priority = ["llama3-8b"]

            [cache]
            ttl_days = 3

            [generation]
            min_samples = 5
            paper_size = 12

            [retry]
            max_attempts = 5
            initial_delay = 250
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.store.url.as_deref(), Some("https://project.supabase.co"));
        assert_eq!(config.store.documents_table, "pyq");
        assert_eq!(config.store.match_function, "match_documents");
        assert_eq!(config.providers.timeout_secs, 30);
        assert_eq!(config.cache.ttl_days, 3);
        assert_eq!(config.generation.min_samples, 5);
        assert_eq!(config.generation.settings.paper_size, 12);
        assert_eq!(config.generation.settings.candidate_pool, 20);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_delay, Duration::from_millis(250));

        let registry = config.models.build_registry().unwrap();
        assert_eq!(registry.priority(), ["llama3-8b".to_string()]);
        assert!(registry.contains("gemma2-9b"));
    }

    #[test]
    fn registry_override_replaces_builtin_models() {
        let toml = r#"
            [[models.registry]]
            name = "local-llama"
            provider = "groq"
            provider_model_id = "llama-3.1-8b-instant"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        let registry = config.models.build_registry().unwrap();
        assert_eq!(registry.names(), vec!["local-llama"]);
        assert!(registry.priority().is_empty());
    }

    #[test]
    fn parse_secrets() {
        let toml = r#"
            [groq]
            api_key = "gsk-test"

            [store]
            api_key = "service-role"
        "#;
        let secrets: Secrets = toml::from_str(toml).unwrap();
        assert_eq!(secrets.groq.as_ref().unwrap().api_key, "gsk-test");
        assert_eq!(secrets.api_key("store"), Some("service-role".to_string()));
        assert_eq!(secrets.api_key("nonexistent"), None);
    }

    #[test]
    fn config_not_found_returns_error() {
        let err = Config::load(Some(Path::new("/nonexistent/config.toml"))).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn load_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[cache]\nmax_per_topic = 20").unwrap();
        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.cache.max_per_topic, 20);
    }

    #[test]
    fn malformed_file_is_a_configuration_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[cache\nttl_days = ").unwrap();
        let err = Config::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, MimirError::Configuration(_)));
    }

    #[cfg(unix)]
    #[test]
    fn world_readable_secrets_are_rejected() {
        use std::os::unix::fs::PermissionsExt;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[groq]\napi_key = \"k\"").unwrap();
        fs::set_permissions(file.path(), fs::Permissions::from_mode(0o644)).unwrap();
        let err = Secrets::load_from(file.path()).unwrap_err();
        assert!(err.to_string().contains("insecure permissions"));

        fs::set_permissions(file.path(), fs::Permissions::from_mode(0o600)).unwrap();
        let secrets = Secrets::load_from(file.path()).unwrap();
        assert_eq!(secrets.groq.unwrap().api_key, "k");
    }

    #[test]
    fn store_url_without_key_is_rejected() {
        let config = Config {
            store: StoreConfig {
                url: Some("http://localhost:54321".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let secrets = Secrets {
            huggingface: Some(ApiKeySecret {
                api_key: "hf".to_string(),
            }),
            store: Some(ApiKeySecret {
                api_key: " ".to_string(),
            }),
            ..Default::default()
        };
        // Blank file key falls through to SUPABASE_KEY, which tests never set.
        if std::env::var("SUPABASE_KEY").is_err() {
            let err = config.service_builder(&secrets).err().unwrap();
            assert!(err.to_string().contains("no store key"));
        }
    }

    #[test]
    fn in_memory_store_when_no_url() {
        let secrets = Secrets {
            huggingface: Some(ApiKeySecret {
                api_key: "hf".to_string(),
            }),
            ..Default::default()
        };
        let service = Config::default()
            .service_builder(&secrets)
            .unwrap()
            .build()
            .unwrap();
        assert!(service.router().registry().contains("gemma2-9b"));
    }
}
