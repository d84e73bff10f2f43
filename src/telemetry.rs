//! Telemetry metric name constants.
//!
//! Centralised metric names for mimir operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `mimir_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `model`: registry model name (e.g. "gemma2-9b")
//! - `status`: outcome: "ok" or "error"
//! - `stage`: pipeline stage that produced a result or fell back

/// Total model invocations made by the router (skipped models excluded).
///
/// Labels: `model`, `status` ("ok" | "error").
pub const MODEL_ATTEMPTS_TOTAL: &str = "mimir_model_attempts_total";

/// Wall-clock duration of a model invocation in seconds.
///
/// Labels: `model`.
pub const MODEL_ATTEMPT_DURATION_SECONDS: &str = "mimir_model_attempt_duration_seconds";

/// Total retrieval fallbacks.
///
/// Labels: `stage` ("table_scan" | "empty").
pub const RETRIEVAL_FALLBACKS_TOTAL: &str = "mimir_retrieval_fallbacks_total";

/// Total parser runs, by the stage that produced the final list.
///
/// Labels: `stage`.
pub const PARSE_STAGE_TOTAL: &str = "mimir_parse_stage_total";

/// Total generation cache writes.
///
/// Labels: `status` ("ok" | "error").
pub const CACHE_WRITES_TOTAL: &str = "mimir_cache_writes_total";

/// Total retry attempts (not counting the initial request).
///
/// Labels: `provider`, `operation`.
pub const RETRIES_TOTAL: &str = "mimir_retries_total";

/// Total news lookups served from the in-process cache.
pub const NEWS_CACHE_HITS_TOTAL: &str = "mimir_news_cache_hits_total";

/// Total news lookups that went to the news provider.
pub const NEWS_CACHE_MISSES_TOTAL: &str = "mimir_news_cache_misses_total";
