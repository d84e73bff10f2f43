//! Model selection and the attempt loop.
//!
//! The router orders candidate models and walks them one at a time until one
//! answers:
//!
//! ```text
//! select(requested)                attempt(models, prompt)
//!   requested model first            for each model:
//!   rest in static priority            factory.build ── Err ──► skip (not an attempt)
//!   sorted by mean latency             invoke ── Err ──► record latency, next model
//!   once every candidate has           invoke ── Ok ───► record latency, return
//!   enough samples                   exhausted ──► status = all_failed
//! ```
//!
//! Calls are sequential. No timeout is enforced here; each client carries its own.

mod performance;
mod registry;

pub use performance::{DEFAULT_TABLE as DEFAULT_PERFORMANCE_TABLE, PerformanceStore};
pub use registry::ModelRegistry;

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, instrument, warn};

use crate::MimirError;
use crate::providers::ClientFactory;
use crate::telemetry;
use crate::types::{AttemptResult, GenerationStatus};

/// Samples every candidate needs before latency reordering kicks in.
pub const DEFAULT_MIN_SAMPLES: u64 = 3;

/// Outcome of trying one candidate.
#[derive(Debug)]
enum Attempt {
    /// No client could be built; the model was never called.
    Unavailable(MimirError),
    Failed { error: MimirError, elapsed_secs: f64 },
    Succeeded { output: String, elapsed_secs: f64 },
}

/// Orders models and drives the fallback loop.
pub struct ModelRouter {
    registry: Arc<ModelRegistry>,
    factory: Arc<dyn ClientFactory>,
    performance: Arc<PerformanceStore>,
    min_samples: u64,
}

impl ModelRouter {
    pub fn new(
        registry: Arc<ModelRegistry>,
        factory: Arc<dyn ClientFactory>,
        performance: Arc<PerformanceStore>,
    ) -> Self {
        Self {
            registry,
            factory,
            performance,
            min_samples: DEFAULT_MIN_SAMPLES,
        }
    }

    /// Override the sample threshold for adaptive ordering.
    pub fn min_samples(mut self, n: u64) -> Self {
        self.min_samples = n;
        self
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn performance(&self) -> &PerformanceStore {
        &self.performance
    }

    /// Candidate models in the order they should be tried.
    ///
    /// A registered `requested` model is forced first. An unregistered one is
    /// ignored and selection falls back to auto mode.
    pub fn select(&self, requested: Option<&str>) -> Vec<String> {
        let requested = requested.map(str::trim).filter(|m| !m.is_empty());
        match requested {
            Some(model) if self.registry.contains(model) => {
                let rest: Vec<String> = self
                    .registry
                    .priority()
                    .iter()
                    .filter(|m| m.as_str() != model)
                    .cloned()
                    .collect();
                let mut ordered = Vec::with_capacity(rest.len() + 1);
                ordered.push(model.to_string());
                ordered.extend(self.order_by_latency(rest));
                ordered
            }
            other => {
                if let Some(model) = other {
                    warn!(model, "requested model is not registered, using auto selection");
                }
                self.order_by_latency(self.registry.priority().to_vec())
            }
        }
    }

    /// Stable sort by mean latency, only when every candidate has enough samples.
    fn order_by_latency(&self, candidates: Vec<String>) -> Vec<String> {
        let mut keyed: Vec<(String, f64, u64)> = candidates
            .into_iter()
            .map(|m| {
                let record = self.performance.record(&m);
                (m, record.mean_latency_seconds, record.sample_count)
            })
            .collect();

        if keyed.iter().all(|(_, _, samples)| *samples >= self.min_samples) {
            keyed.sort_by(|a, b| a.1.total_cmp(&b.1));
        }
        keyed.into_iter().map(|(m, _, _)| m).collect()
    }

    /// Try `models` in order until one succeeds. Never fails.
    #[instrument(skip(self, prompt), fields(candidates = models.len()))]
    pub async fn attempt(&self, models: &[String], prompt: &str) -> AttemptResult {
        let mut last_error: Option<String> = None;

        for model in models {
            match self.try_model(model, prompt).await {
                Attempt::Unavailable(e) => {
                    info!(model = %model, reason = %e, "skipping unavailable model");
                }
                Attempt::Failed {
                    error,
                    elapsed_secs,
                } => {
                    self.performance
                        .record_sample(model, elapsed_secs, false)
                        .await;
                    warn!(model = %model, elapsed_secs, error = %error, "model attempt failed");
                    last_error = Some(format!("{model}: {error}"));
                }
                Attempt::Succeeded {
                    output,
                    elapsed_secs,
                } => {
                    let record = self.performance.record_sample(model, elapsed_secs, true).await;
                    info!(model = %model, elapsed_secs, "model attempt succeeded");
                    return AttemptResult {
                        output,
                        model_used: Some(model.clone()),
                        duration_secs: round2(elapsed_secs),
                        mean_latency_secs: round2(record.mean_latency_seconds),
                        sample_count: record.sample_count,
                        status: GenerationStatus::Success,
                    };
                }
            }
        }

        warn!(last_error = last_error.as_deref(), "all model attempts failed");
        AttemptResult::all_failed(last_error.as_deref())
    }

    async fn try_model(&self, model: &str, prompt: &str) -> Attempt {
        let client = match self.registry.get(model) {
            Some(descriptor) => match self.factory.build(descriptor) {
                Ok(client) => client,
                Err(e) => return Attempt::Unavailable(e),
            },
            None => {
                return Attempt::Unavailable(MimirError::ModelNotFound(model.to_string()));
            }
        };

        let start = Instant::now();
        let result = client.invoke(prompt).await;
        let elapsed = start.elapsed();
        let elapsed_secs = elapsed.as_secs_f64();

        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(telemetry::MODEL_ATTEMPTS_TOTAL,
            "model" => model.to_owned(),
            "status" => status,
        )
        .increment(1);
        metrics::histogram!(telemetry::MODEL_ATTEMPT_DURATION_SECONDS,
            "model" => model.to_owned(),
        )
        .record(elapsed_secs);

        match result {
            Ok(output) => Attempt::Succeeded {
                output,
                elapsed_secs,
            },
            Err(error) => Attempt::Failed {
                error,
                elapsed_secs,
            },
        }
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round2_rounds_half_away() {
        assert_eq!(round2(1.234), 1.23);
        assert_eq!(round2(1.235_1), 1.24);
        assert_eq!(round2(0.0), 0.0);
    }
}
