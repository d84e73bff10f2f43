//! Generation orchestrator.
//!
//! [`GenerationService`] composes the router, retriever, reranker, sampler,
//! cache and parser into the request flows:
//!
//! ```text
//! select models ─► gather examples ─► build prompt ─► attempt ─► parse ─► cache
//!                  (retrieve, rerank        │
//!                   or sample, plus         └─ all_failed ─► placeholder + meta
//!                   cached questions)
//! ```
//!
//! Every generation method returns a [`GenerationResponse`]; failures are
//! reported through `meta.status`, never as an `Err`.

mod builder;
pub mod prompt;

pub use builder::GenerationServiceBuilder;

use std::collections::BTreeMap;
use std::sync::Arc;

use futures_util::future::join_all;
use rand::seq::SliceRandom;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use crate::Result;
use crate::cache::{CacheStats, GenerationCache};
use crate::parse::parse_questions;
use crate::providers::NewsProvider;
use crate::providers::news::format_snippets;
use crate::retrieval::{Bm25, DocumentRetriever, stratified_sample};
use crate::router::ModelRouter;
use crate::types::{
    AttemptResult, Document, GeneratedQuestion, GenerationMeta, GenerationResponse,
    GenerationStatus, KeywordRequest, PaperRequest, SUBJECTS, TopicRequest,
};

/// Subject assumed for keyword requests that match no known topic.
const DEFAULT_SUBJECT: &str = "GS1";

/// Example and sizing knobs for the request flows.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    /// Documents retrieved before reranking or sampling.
    pub candidate_pool: usize,
    /// Retrieved examples kept for a static request.
    pub static_examples: usize,
    /// Retrieved examples kept for a current-affairs request.
    pub current_affairs_examples: usize,
    /// Cached examples for a static request.
    pub cached_examples: usize,
    /// Cached examples for a current-affairs request.
    pub current_affairs_cached_examples: usize,
    /// Topics drawn for a whole paper.
    pub paper_topics: usize,
    /// Retrieved examples per paper topic.
    pub paper_examples_per_topic: usize,
    /// Cached examples for a whole paper, from any topic of the subject.
    pub paper_cached_examples: usize,
    /// Questions in a whole paper.
    pub paper_size: usize,
    /// Fewest parsed questions for a paper to be cached.
    pub paper_min_cacheable: usize,
    /// Paper topics that get a news digest in current-affairs mode.
    pub paper_news_topics: usize,
    /// Characters kept per paper news digest.
    pub news_digest_chars: usize,
    /// Documents scanned to build the topic catalog.
    pub catalog_scan_limit: usize,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            candidate_pool: 20,
            static_examples: 5,
            current_affairs_examples: 3,
            cached_examples: 3,
            current_affairs_cached_examples: 2,
            paper_topics: 6,
            paper_examples_per_topic: 2,
            paper_cached_examples: 5,
            paper_size: 10,
            paper_min_cacheable: 5,
            paper_news_topics: 3,
            news_digest_chars: 200,
            catalog_scan_limit: 10_000,
        }
    }
}

/// Topics per subject, sorted and de-duplicated.
type TopicCatalog = BTreeMap<String, Vec<String>>;

/// Examples gathered for one prompt.
struct Examples {
    texts: Vec<String>,
    cached: usize,
}

/// Request-level orchestration over the engine's components.
pub struct GenerationService {
    router: ModelRouter,
    retriever: DocumentRetriever,
    cache: GenerationCache,
    news: Option<Arc<dyn NewsProvider>>,
    bm25: Bm25,
    settings: GenerationSettings,
    topics: RwLock<Option<Arc<TopicCatalog>>>,
}

impl GenerationService {
    pub fn builder() -> GenerationServiceBuilder {
        GenerationServiceBuilder::new()
    }

    pub fn router(&self) -> &ModelRouter {
        &self.router
    }

    pub fn cache(&self) -> &GenerationCache {
        &self.cache
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    /// Load persisted model performance and the topic catalog.
    ///
    /// Failures are logged; the service works without either.
    pub async fn initialize(&self) {
        match self.router.performance().load().await {
            Ok(models) => info!(models, "loaded model performance"),
            Err(e) => warn!(error = %e, "could not load model performance"),
        }
        self.refresh_topics().await;
    }

    /// Rebuild the topic catalog from the document store's topic tags.
    ///
    /// A topic belongs to a subject when its tag starts with the subject code.
    pub async fn refresh_topics(&self) -> Arc<TopicCatalog> {
        let mut catalog: TopicCatalog = SUBJECTS
            .iter()
            .map(|s| (s.to_string(), Vec::new()))
            .collect();

        match self
            .retriever
            .store()
            .table_scan(None, self.settings.catalog_scan_limit)
            .await
        {
            Ok(docs) => {
                for doc in docs {
                    let topic = doc.topic.trim();
                    if let Some(subject) = SUBJECTS.iter().find(|s| topic.starts_with(**s))
                        && let Some(topics) = catalog.get_mut(*subject)
                    {
                        topics.push(topic.to_string());
                    }
                }
                for topics in catalog.values_mut() {
                    topics.sort();
                    topics.dedup();
                }
            }
            Err(e) => warn!(error = %e, "could not load topic catalog"),
        }

        let catalog = Arc::new(catalog);
        *self.topics.write().await = Some(catalog.clone());
        catalog
    }

    /// Known topics for `subject`, loading the catalog on first use.
    pub async fn topics_for_subject(&self, subject: &str) -> Vec<String> {
        self.catalog()
            .await
            .get(subject)
            .cloned()
            .unwrap_or_default()
    }

    async fn catalog(&self) -> Arc<TopicCatalog> {
        if let Some(catalog) = self.topics.read().await.as_ref() {
            return catalog.clone();
        }
        self.refresh_topics().await
    }

    // ========================================================================
    // Single topic
    // ========================================================================

    /// Generate `num` questions for one topic.
    #[instrument(skip(self, request), fields(subject = %request.subject, topic = %request.topic, current_affairs = request.use_current_affairs))]
    pub async fn generate_for_topic(&self, request: &TopicRequest) -> GenerationResponse {
        let models = self.router.select(request.model.as_deref());
        let subject = request.subject.as_str();
        let topic = request.topic.as_str();

        let news = if request.use_current_affairs {
            self.news_digest(topic, request.months).await
        } else {
            None
        };

        let query = format!("{subject} {topic}");
        let candidates = self
            .retriever
            .retrieve(&query, self.settings.candidate_pool, Some(topic))
            .await;

        let (documents, cached_max) = if request.use_current_affairs {
            let rerank_query = match &news {
                Some(digest) => format!("{topic} {digest}"),
                None => topic.to_string(),
            };
            let mut ranked = self.bm25.rerank(&rerank_query, candidates);
            ranked.truncate(self.settings.current_affairs_examples);
            (ranked, self.settings.current_affairs_cached_examples)
        } else {
            let sampled = stratified_sample(
                candidates,
                self.settings.static_examples,
                &mut rand::thread_rng(),
            );
            (sampled, self.settings.cached_examples)
        };

        let examples = self
            .with_cached(documents, self.sample_cached(subject, topic, cached_max).await);

        let prompt =
            prompt::topic_prompt(subject, topic, request.num, &examples.texts, news.as_deref());
        let attempt = self.router.attempt(&models, &prompt).await;

        let key = GenerationCache::key(
            subject,
            topic,
            request.num,
            request.use_current_affairs,
            cache_months(request.use_current_affairs, request.months),
        );
        let (response, cacheable) = self.finish(attempt, request.num, &examples);
        if cacheable {
            self.store(&key, &response.questions, subject, topic).await;
        }
        response
    }

    // ========================================================================
    // Whole paper
    // ========================================================================

    /// Generate a full paper across randomly chosen topics of a subject.
    #[instrument(skip(self, request), fields(subject = %request.subject, current_affairs = request.use_current_affairs))]
    pub async fn generate_whole_paper(&self, request: &PaperRequest) -> GenerationResponse {
        let subject = request.subject.as_str();
        let models = self.router.select(request.model.as_deref());

        let all_topics = self.topics_for_subject(subject).await;
        if all_topics.is_empty() {
            warn!(subject, "no topics known for subject");
            return placeholder(
                format!("[WARNING] No topics found for {subject}."),
                GenerationStatus::NoTopics,
            );
        }

        let selected: Vec<String> = all_topics
            .choose_multiple(&mut rand::thread_rng(), self.settings.paper_topics)
            .cloned()
            .collect();

        let per_topic = join_all(selected.iter().map(|topic| async move {
            let docs = self
                .retriever
                .retrieve(topic, self.settings.paper_examples_per_topic, Some(topic.as_str()))
                .await;
            (topic, docs)
        }))
        .await;

        let mut texts = Vec::new();
        for (topic, docs) in per_topic {
            if docs.is_empty() {
                continue;
            }
            texts.push(format!("{}:", display_topic(subject, topic)));
            for (i, doc) in docs.iter().enumerate() {
                texts.push(format!("{}. {}", i + 1, doc.content.trim()));
            }
        }
        let cached = match self
            .cache
            .sample_subject_examples(subject, self.settings.paper_cached_examples)
            .await
        {
            Ok(cached) => cached,
            Err(e) => {
                warn!(subject, error = %e, "could not read cached examples");
                Vec::new()
            }
        };
        let examples = Examples {
            cached: cached.len(),
            texts: texts.into_iter().chain(numbered(cached)).collect(),
        };

        let mut digests = Vec::new();
        if request.use_current_affairs {
            for topic in selected.iter().take(self.settings.paper_news_topics) {
                if let Some(news) = self.news_digest(topic, request.months).await {
                    digests.push(format!(
                        "Recent news for {topic}:\n{}",
                        prompt::truncate_chars(&news, self.settings.news_digest_chars)
                    ));
                }
            }
        }

        let prompt = prompt::paper_prompt(
            subject,
            &selected,
            self.settings.paper_size,
            &examples.texts,
            &digests,
        );
        let attempt = self.router.attempt(&models, &prompt).await;

        let (mut response, cacheable) = self.finish(attempt, self.settings.paper_size, &examples);
        if cacheable && response.questions.len() >= self.settings.paper_min_cacheable {
            self.store_paper(subject, &selected, &response.questions).await;
        }
        response.meta.topics_covered = Some(selected.len());
        response
    }

    /// Spread paper questions over the selected topics and cache each share.
    async fn store_paper(&self, subject: &str, topics: &[String], questions: &[GeneratedQuestion]) {
        let now = chrono::Utc::now();
        for (topic, share) in topics.iter().zip(distribute(questions, topics.len())) {
            if share.is_empty() {
                continue;
            }
            let key = GenerationCache::paper_key(subject, topic, now);
            self.store(&key, share, subject, topic).await;
        }
    }

    // ========================================================================
    // Keywords
    // ========================================================================

    /// Generate questions combining a set of keywords.
    #[instrument(skip(self, request), fields(keywords = request.keywords.len(), current_affairs = request.use_current_affairs))]
    pub async fn generate_from_keywords(&self, request: &KeywordRequest) -> GenerationResponse {
        let keywords: Vec<String> = request
            .keywords
            .iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        let Some(representative) = request.representative_keyword() else {
            return placeholder(
                "No keywords provided.".to_string(),
                GenerationStatus::NoKeywords,
            );
        };
        let representative = representative.to_string();
        let models = self.router.select(request.model.as_deref());

        let subject = match request.subject.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => self.subject_for_keyword(&representative).await,
        };

        let query = keywords.join(" ");
        let news = if request.use_current_affairs {
            self.news_digest(&query, request.months).await
        } else {
            None
        };

        let candidates = self
            .retriever
            .retrieve(&query, self.settings.candidate_pool, None)
            .await;
        let (documents, cached_max) = if request.use_current_affairs {
            let rerank_query = match &news {
                Some(digest) => format!("{query} {digest}"),
                None => query.clone(),
            };
            let mut ranked = self.bm25.rerank(&rerank_query, candidates);
            ranked.truncate(self.settings.current_affairs_examples);
            (ranked, self.settings.current_affairs_cached_examples)
        } else {
            let sampled = stratified_sample(
                candidates,
                self.settings.static_examples,
                &mut rand::thread_rng(),
            );
            (sampled, self.settings.cached_examples)
        };

        let examples = self.with_cached(
            documents,
            self.sample_cached(&subject, &representative, cached_max).await,
        );

        let prompt = prompt::keyword_prompt(
            &keywords,
            &subject,
            request.num,
            &examples.texts,
            news.as_deref(),
        );
        let attempt = self.router.attempt(&models, &prompt).await;

        let key = GenerationCache::key(
            &subject,
            &representative,
            request.num,
            request.use_current_affairs,
            cache_months(request.use_current_affairs, request.months),
        );
        let (response, cacheable) = self.finish(attempt, request.num, &examples);
        if cacheable {
            self.store(&key, &response.questions, &subject, &representative)
                .await;
        }
        response
    }

    /// Subject whose catalog has a topic mentioning `keyword`.
    async fn subject_for_keyword(&self, keyword: &str) -> String {
        let needle = keyword.to_lowercase();
        let catalog = self.catalog().await;
        catalog
            .iter()
            .find(|(_, topics)| topics.iter().any(|t| t.to_lowercase().contains(&needle)))
            .map(|(subject, _)| subject.clone())
            .unwrap_or_else(|| DEFAULT_SUBJECT.to_string())
    }

    // ========================================================================
    // Cache administration
    // ========================================================================

    pub async fn get_cache_stats(&self) -> Result<CacheStats> {
        self.cache.stats().await
    }

    /// Clear cached results; `None` filters match anything.
    pub async fn clear_cache(&self, subject: Option<&str>, topic: Option<&str>) -> Result<()> {
        self.cache.clear(subject, topic).await
    }

    // ========================================================================
    // Shared steps
    // ========================================================================

    async fn news_digest(&self, query: &str, months: u32) -> Option<String> {
        let provider = self.news.as_ref()?;
        match provider.search(query, months).await {
            Ok(snippets) => {
                let digest = format_snippets(&snippets);
                (!digest.is_empty()).then_some(digest)
            }
            Err(e) => {
                warn!(provider = provider.name(), error = %e, "news lookup failed");
                None
            }
        }
    }

    async fn sample_cached(&self, subject: &str, topic: &str, max: usize) -> Vec<String> {
        match self.cache.sample_examples(subject, topic, max).await {
            Ok(examples) => examples,
            Err(e) => {
                warn!(subject, topic, error = %e, "could not read cached examples");
                Vec::new()
            }
        }
    }

    fn with_cached(&self, documents: Vec<Document>, cached: Vec<String>) -> Examples {
        Examples {
            cached: cached.len(),
            texts: documents
                .into_iter()
                .map(|d| d.content.trim().to_string())
                .chain(numbered(cached))
                .collect(),
        }
    }

    /// Parse a successful attempt, or turn a failed one into a placeholder.
    ///
    /// The flag is true when real questions were parsed and may be cached.
    fn finish(
        &self,
        attempt: AttemptResult,
        num: usize,
        examples: &Examples,
    ) -> (GenerationResponse, bool) {
        let mut meta = GenerationMeta::from_attempt(&attempt);
        meta.examples_used = examples.texts.len();
        meta.cached_examples = examples.cached;

        if !attempt.is_success() {
            let response = GenerationResponse {
                questions: vec![GeneratedQuestion::new(attempt.output)],
                meta,
            };
            return (response, false);
        }

        let parsed = parse_questions(&attempt.output, Some(num));
        meta.parse_stage = Some(parsed.stage.as_str().to_string());
        let cacheable = parsed.is_parsed() && !parsed.questions.is_empty();
        let response = GenerationResponse {
            questions: parsed.questions,
            meta,
        };
        (response, cacheable)
    }

    /// Best-effort cache write.
    async fn store(&self, key: &str, questions: &[GeneratedQuestion], subject: &str, topic: &str) {
        if let Err(e) = self.cache.put(key, questions, subject, topic).await {
            warn!(subject, topic, error = %e, "failed to cache generated questions");
        }
    }
}

/// Static requests ignore the recency window, so it is left out of their key.
fn cache_months(use_current_affairs: bool, months: u32) -> u32 {
    if use_current_affairs { months } else { 0 }
}

fn numbered(examples: Vec<String>) -> impl Iterator<Item = String> {
    examples
        .into_iter()
        .enumerate()
        .map(|(i, e)| format!("{}. {e}", i + 1))
}

/// Topic label without the subject prefix ("GS1 - Art" → "Art").
fn display_topic<'a>(subject: &str, topic: &'a str) -> &'a str {
    topic
        .strip_prefix(subject)
        .map(|rest| rest.trim_start_matches([' ', '-', ':']).trim())
        .filter(|rest| !rest.is_empty())
        .unwrap_or(topic)
}

/// Split `questions` into `parts` contiguous shares; the last takes the remainder.
fn distribute(questions: &[GeneratedQuestion], parts: usize) -> Vec<&[GeneratedQuestion]> {
    if parts == 0 {
        return Vec::new();
    }
    let per = questions.len() / parts;
    (0..parts)
        .map(|i| {
            let start = (i * per).min(questions.len());
            let end = if i + 1 == parts {
                questions.len()
            } else {
                (start + per).min(questions.len())
            };
            &questions[start..end]
        })
        .collect()
}

fn placeholder(message: String, status: GenerationStatus) -> GenerationResponse {
    GenerationResponse {
        questions: vec![GeneratedQuestion::new(message)],
        meta: GenerationMeta::without_attempt(status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_topic_strips_subject_prefix() {
        assert_eq!(display_topic("GS1", "GS1 - Modern History"), "Modern History");
        assert_eq!(display_topic("GS1", "GS1: Art"), "Art");
        assert_eq!(display_topic("GS2", "Polity"), "Polity");
        assert_eq!(display_topic("GS1", "GS1"), "GS1");
    }

    #[test]
    fn distribute_gives_remainder_to_last() {
        let qs: Vec<GeneratedQuestion> =
            (0..10).map(|i| GeneratedQuestion::new(i.to_string())).collect();
        let shares = distribute(&qs, 3);
        let sizes: Vec<usize> = shares.iter().map(|s| s.len()).collect();
        assert_eq!(sizes, [3, 3, 4]);
    }

    #[test]
    fn distribute_more_topics_than_questions() {
        let qs: Vec<GeneratedQuestion> =
            (0..2).map(|i| GeneratedQuestion::new(i.to_string())).collect();
        let sizes: Vec<usize> = distribute(&qs, 3).iter().map(|s| s.len()).collect();
        assert_eq!(sizes, [0, 0, 2]);
    }

    #[test]
    fn static_requests_share_a_key_across_windows() {
        assert_eq!(cache_months(false, 6), cache_months(false, 12));
        assert_eq!(cache_months(true, 12), 12);
    }
}
