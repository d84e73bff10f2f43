//! Builder for [`GenerationService`].

use std::sync::Arc;

use chrono::TimeDelta;
use tokio::sync::RwLock;

use super::{GenerationService, GenerationSettings};
use crate::cache::GenerationCache;
use crate::providers::{
    ClientFactory, EmbeddingProvider, NewsProvider, RetryConfig, RetryingEmbeddingProvider,
    RetryingNewsProvider,
};
use crate::retrieval::{Bm25, DocumentRetriever};
use crate::router::{DEFAULT_MIN_SAMPLES, ModelRegistry, ModelRouter, PerformanceStore};
use crate::store::{KeyValueStore, VectorStore};
use crate::{MimirError, Result};

/// Assembles a [`GenerationService`] from its collaborators.
///
/// A client factory, key-value store, vector store and embedder are required.
/// Everything else has a default: the built-in model registry, no news
/// provider, default settings, and no retry wrapping.
///
/// ```rust,ignore
/// let store = Arc::new(MemoryStore::new());
/// let service = GenerationService::builder()
///     .client_factory(Arc::new(CredentialedClientFactory::new(keys)))
///     .store(store)
///     .embedder(Arc::new(HuggingFaceEmbedder::new(hf_key)?))
///     .build()?;
/// ```
pub struct GenerationServiceBuilder {
    registry: Option<ModelRegistry>,
    client_factory: Option<Arc<dyn ClientFactory>>,
    kv_store: Option<Arc<dyn KeyValueStore>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    news: Option<Arc<dyn NewsProvider>>,
    settings: GenerationSettings,
    retry: Option<RetryConfig>,
    cache_ttl: Option<TimeDelta>,
    cache_max_per_topic: Option<usize>,
    cache_tables: Option<(String, String)>,
    performance_table: Option<String>,
    min_samples: u64,
}

impl GenerationServiceBuilder {
    pub fn new() -> Self {
        Self {
            registry: None,
            client_factory: None,
            kv_store: None,
            vector_store: None,
            embedder: None,
            news: None,
            settings: GenerationSettings::default(),
            retry: None,
            cache_ttl: None,
            cache_max_per_topic: None,
            cache_tables: None,
            performance_table: None,
            min_samples: DEFAULT_MIN_SAMPLES,
        }
    }

    /// Models to route between (default: [`ModelRegistry::builtin`]).
    pub fn registry(mut self, registry: ModelRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn client_factory(mut self, factory: Arc<dyn ClientFactory>) -> Self {
        self.client_factory = Some(factory);
        self
    }

    /// Use one backend for both durable rows and document search.
    pub fn store<S>(self, store: Arc<S>) -> Self
    where
        S: KeyValueStore + VectorStore + 'static,
    {
        self.kv_store(store.clone()).vector_store(store)
    }

    pub fn kv_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.kv_store = Some(store);
        self
    }

    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    pub fn embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Enable current-affairs context.
    pub fn news(mut self, news: Arc<dyn NewsProvider>) -> Self {
        self.news = Some(news);
        self
    }

    pub fn settings(mut self, settings: GenerationSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Retry transient embedding and news errors.
    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = Some(config);
        self
    }

    pub fn cache_ttl(mut self, ttl: TimeDelta) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    pub fn cache_max_per_topic(mut self, max: usize) -> Self {
        self.cache_max_per_topic = Some(max);
        self
    }

    /// Table names for cache entries and the per-topic question index.
    pub fn cache_tables(mut self, entries: impl Into<String>, index: impl Into<String>) -> Self {
        self.cache_tables = Some((entries.into(), index.into()));
        self
    }

    pub fn performance_table(mut self, table: impl Into<String>) -> Self {
        self.performance_table = Some(table.into());
        self
    }

    /// Samples every model needs before latency ordering applies.
    pub fn min_samples(mut self, n: u64) -> Self {
        self.min_samples = n;
        self
    }

    pub fn build(self) -> Result<GenerationService> {
        let factory = self
            .client_factory
            .ok_or_else(|| missing("client factory"))?;
        let kv_store = self.kv_store.ok_or_else(|| missing("key-value store"))?;
        let vector_store = self.vector_store.ok_or_else(|| missing("vector store"))?;
        let mut embedder = self.embedder.ok_or_else(|| missing("embedding provider"))?;
        let mut news = self.news;

        if let Some(config) = self.retry {
            embedder = Arc::new(RetryingEmbeddingProvider::new(embedder, config.clone()));
            news = news.map(|inner| {
                Arc::new(RetryingNewsProvider::new(inner, config)) as Arc<dyn NewsProvider>
            });
        }

        let registry = Arc::new(self.registry.unwrap_or_else(ModelRegistry::builtin));
        let performance = Arc::new(match self.performance_table {
            Some(table) => PerformanceStore::with_table(kv_store.clone(), table),
            None => PerformanceStore::new(kv_store.clone()),
        });
        let router = ModelRouter::new(registry, factory, performance).min_samples(self.min_samples);

        let mut cache = GenerationCache::new(kv_store);
        if let Some(ttl) = self.cache_ttl {
            cache = cache.ttl(ttl);
        }
        if let Some(max) = self.cache_max_per_topic {
            cache = cache.max_per_topic(max);
        }
        if let Some((entries, index)) = self.cache_tables {
            cache = cache.tables(entries, index);
        }

        Ok(GenerationService {
            router,
            retriever: DocumentRetriever::new(embedder, vector_store),
            cache,
            news,
            bm25: Bm25::default(),
            settings: self.settings,
            topics: RwLock::new(None),
        })
    }
}

impl Default for GenerationServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn missing(what: &str) -> MimirError {
    MimirError::Configuration(format!("GenerationService requires a {what}"))
}
