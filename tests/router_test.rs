//! Integration tests for model selection and the attempt loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use mimir::providers::{ClientFactory, LlmClient};
use mimir::router::{ModelRegistry, ModelRouter, PerformanceStore};
use mimir::store::MemoryStore;
use mimir::{GenerationStatus, MimirError, ModelDescriptor, Provider, Result};

// ============================================================================
// Mocks
// ============================================================================

#[derive(Clone)]
enum Behaviour {
    Answer(&'static str),
    Fail(&'static str),
    /// The factory refuses to build a client.
    Unavailable,
}

struct MockClient {
    name: String,
    behaviour: Behaviour,
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl LlmClient for MockClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, _prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behaviour {
            Behaviour::Answer(text) => Ok(text.to_string()),
            Behaviour::Fail(msg) => Err(MimirError::Api {
                status: 500,
                message: msg.to_string(),
            }),
            Behaviour::Unavailable => unreachable!("unavailable clients are never built"),
        }
    }
}

struct MockFactory {
    behaviours: HashMap<String, Behaviour>,
    calls: Arc<AtomicU32>,
}

impl MockFactory {
    fn new(behaviours: &[(&str, Behaviour)]) -> Self {
        Self {
            behaviours: behaviours
                .iter()
                .map(|(name, b)| (name.to_string(), b.clone()))
                .collect(),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }
}

impl ClientFactory for MockFactory {
    fn build(&self, model: &ModelDescriptor) -> Result<Arc<dyn LlmClient>> {
        match self.behaviours.get(&model.name) {
            None | Some(Behaviour::Unavailable) => Err(MimirError::ProviderUnavailable(format!(
                "no key for {}",
                model.provider
            ))),
            Some(behaviour) => Ok(Arc::new(MockClient {
                name: model.name.clone(),
                behaviour: behaviour.clone(),
                calls: self.calls.clone(),
            })),
        }
    }
}

fn registry(names: &[&str]) -> ModelRegistry {
    let models = names
        .iter()
        .map(|n| ModelDescriptor::new(*n, Provider::Groq, format!("{n}-id")))
        .collect();
    ModelRegistry::new(models, names.iter().map(|n| n.to_string()).collect()).unwrap()
}

fn router(names: &[&str], factory: MockFactory) -> (ModelRouter, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let performance = Arc::new(PerformanceStore::new(store.clone()));
    let router = ModelRouter::new(Arc::new(registry(names)), Arc::new(factory), performance);
    (router, store)
}

fn strings(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

// ============================================================================
// Attempt loop
// ============================================================================

#[tokio::test]
async fn first_success_wins() {
    let factory = MockFactory::new(&[
        ("a", Behaviour::Fail("boom")),
        ("b", Behaviour::Answer("[\"Q?\"]")),
        ("c", Behaviour::Answer("unused")),
    ]);
    let calls = factory.calls.clone();
    let (router, _) = router(&["a", "b", "c"], factory);

    let result = router.attempt(&strings(&["a", "b", "c"]), "prompt").await;

    assert_eq!(result.status, GenerationStatus::Success);
    assert_eq!(result.model_used.as_deref(), Some("b"));
    assert_eq!(result.output, "[\"Q?\"]");
    assert_eq!(result.sample_count, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2, "c must not be called");
}

#[tokio::test]
async fn all_failed_reports_last_error() {
    let factory = MockFactory::new(&[
        ("a", Behaviour::Fail("first failure")),
        ("b", Behaviour::Fail("second failure")),
    ]);
    let (router, _) = router(&["a", "b"], factory);

    let result = router.attempt(&strings(&["a", "b"]), "prompt").await;

    assert_eq!(result.status, GenerationStatus::AllFailed);
    assert!(result.model_used.is_none());
    assert!(
        result
            .output
            .starts_with("Error: All model attempts failed. Last error: b:")
    );
    assert!(result.output.contains("second failure"));

    // Failed attempts still count as latency samples.
    assert_eq!(router.performance().record("a").sample_count, 1);
    assert_eq!(router.performance().record("b").sample_count, 1);
}

#[tokio::test]
async fn unavailable_models_are_skipped_without_a_sample() {
    let factory = MockFactory::new(&[
        ("a", Behaviour::Unavailable),
        ("b", Behaviour::Answer("ok")),
    ]);
    let (router, _) = router(&["a", "b"], factory);

    let result = router.attempt(&strings(&["a", "b"]), "prompt").await;

    assert_eq!(result.model_used.as_deref(), Some("b"));
    assert_eq!(router.performance().record("a").sample_count, 0);
}

#[tokio::test]
async fn nothing_reachable_is_all_failed() {
    let (router, _) = router(&["a"], MockFactory::new(&[("a", Behaviour::Unavailable)]));

    let result = router.attempt(&strings(&["a"]), "prompt").await;

    assert_eq!(result.status, GenerationStatus::AllFailed);
    assert!(result.output.contains("no model could be reached"));
}

#[tokio::test]
async fn empty_candidate_list_is_all_failed() {
    let (router, _) = router(&["a"], MockFactory::new(&[]));
    let result = router.attempt(&[], "prompt").await;
    assert_eq!(result.status, GenerationStatus::AllFailed);
}

// ============================================================================
// Selection
// ============================================================================

#[tokio::test]
async fn requested_model_is_forced_first() {
    let (router, _) = router(&["a", "b", "c"], MockFactory::new(&[]));
    assert_eq!(router.select(Some("c")), strings(&["c", "a", "b"]));
    assert_eq!(router.select(Some("  b ")), strings(&["b", "a", "c"]));
}

#[tokio::test]
async fn unregistered_request_falls_back_to_priority() {
    let (router, _) = router(&["a", "b"], MockFactory::new(&[]));
    assert_eq!(router.select(Some("gpt-unknown")), strings(&["a", "b"]));
    assert_eq!(router.select(None), strings(&["a", "b"]));
    assert_eq!(router.select(Some("")), strings(&["a", "b"]));
}

#[tokio::test]
async fn ordering_switches_to_latency_once_every_model_has_samples() {
    let (router, _) = router(&["slow", "fast"], MockFactory::new(&[]));
    let perf = router.performance();

    for _ in 0..3 {
        perf.record_sample("slow", 4.0, true).await;
    }
    perf.record_sample("fast", 1.0, true).await;
    // "fast" has too few samples: static priority still applies.
    assert_eq!(router.select(None), strings(&["slow", "fast"]));

    perf.record_sample("fast", 1.0, true).await;
    perf.record_sample("fast", 1.0, true).await;
    assert_eq!(router.select(None), strings(&["fast", "slow"]));
}

#[tokio::test]
async fn forced_model_stays_first_under_latency_ordering() {
    let (router, _) = router(&["a", "b", "c"], MockFactory::new(&[]));
    let perf = router.performance();
    for (model, secs) in [("a", 3.0), ("b", 2.0), ("c", 1.0)] {
        perf.record_sample(model, secs, true).await;
    }
    let router = router.min_samples(1);

    assert_eq!(router.select(None), strings(&["c", "b", "a"]));
    assert_eq!(router.select(Some("a")), strings(&["a", "c", "b"]));
}

#[tokio::test]
async fn ties_keep_priority_order() {
    let (router, _) = router(&["a", "b", "c"], MockFactory::new(&[]));
    let router = router.min_samples(1);
    for model in ["a", "b", "c"] {
        router.performance().record_sample(model, 2.0, true).await;
    }
    assert_eq!(router.select(None), strings(&["a", "b", "c"]));
}

// ============================================================================
// Persistence
// ============================================================================

#[tokio::test]
async fn performance_survives_reload() {
    let store = Arc::new(MemoryStore::new());
    let perf = PerformanceStore::new(store.clone());
    perf.record_sample("a", 1.0, true).await;
    perf.record_sample("a", 3.0, false).await;

    let reloaded = PerformanceStore::new(store);
    assert_eq!(reloaded.load().await.unwrap(), 1);

    let record = reloaded.record("a");
    assert_eq!(record.sample_count, 2);
    assert!((record.mean_latency_seconds - 2.0).abs() < 1e-9);

    let next = reloaded.record_sample("a", 5.0, true).await;
    assert_eq!(next.sample_count, 3);
    assert!((next.mean_latency_seconds - 3.0).abs() < 1e-9);
}
