//! Per-model latency aggregates with write-through persistence.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::store::{Filter, KeyValueStore, Row};
use crate::types::{PerformanceRecord, timestamp};
use crate::{MimirError, Result};

/// Default table holding performance records.
pub const DEFAULT_TABLE: &str = "model_performance";

const KEY_COLUMN: &str = "model_name";

/// Running latency sum and sample count for one model.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Aggregate {
    total_secs: f64,
    count: u64,
}

impl Aggregate {
    fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_secs / self.count as f64
        }
    }
}

/// Latency history per model.
///
/// Only the mean and count are persisted. On [`load`](Self::load) the sum is
/// rebuilt as `mean × count`, which averages exactly as if every historical
/// sample had equalled the stored mean.
pub struct PerformanceStore {
    store: Arc<dyn KeyValueStore>,
    table: String,
    aggregates: RwLock<HashMap<String, Aggregate>>,
}

impl PerformanceStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_table(store, DEFAULT_TABLE)
    }

    pub fn with_table(store: Arc<dyn KeyValueStore>, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
            aggregates: RwLock::new(HashMap::new()),
        }
    }

    /// Rebuild in-memory aggregates from the durable store.
    ///
    /// Returns the number of models loaded. Rows that fail to parse are skipped.
    pub async fn load(&self) -> Result<usize> {
        let rows = self.store.select(&self.table, &Filter::new()).await?;
        let mut loaded = HashMap::with_capacity(rows.len());
        for row in rows {
            match serde_json::from_value::<PerformanceRecord>(Value::Object(row)) {
                Ok(record) => {
                    loaded.insert(
                        record.model_name,
                        Aggregate {
                            total_secs: record.mean_latency_seconds * record.sample_count as f64,
                            count: record.sample_count,
                        },
                    );
                }
                Err(e) => warn!(error = %e, "skipping malformed performance row"),
            }
        }

        let count = loaded.len();
        let mut aggregates = self
            .aggregates
            .write()
            .map_err(|e| MimirError::Store(format!("Failed to acquire write lock: {e}")))?;
        for (model, aggregate) in loaded {
            aggregates.insert(model, aggregate);
        }
        debug!(models = count, "loaded performance records");
        Ok(count)
    }

    /// Fold one observation into the model's aggregate and persist it.
    ///
    /// Persistence failures are logged; the in-memory aggregate is still updated.
    pub async fn record_sample(
        &self,
        model: &str,
        elapsed_secs: f64,
        success: bool,
    ) -> PerformanceRecord {
        let record = self.fold(model, elapsed_secs.max(0.0));
        debug!(
            model,
            elapsed_secs,
            success,
            mean = record.mean_latency_seconds,
            samples = record.sample_count,
            "recorded latency sample"
        );

        if let Err(e) = self.persist(&record).await {
            warn!(model, error = %e, "failed to persist performance record");
        }
        record
    }

    /// Current aggregate for `model`; zero samples when never attempted.
    pub fn record(&self, model: &str) -> PerformanceRecord {
        let aggregate = self
            .aggregates
            .read()
            .ok()
            .and_then(|a| a.get(model).copied())
            .unwrap_or_default();
        PerformanceRecord {
            model_name: model.to_string(),
            mean_latency_seconds: aggregate.mean(),
            sample_count: aggregate.count,
        }
    }

    fn fold(&self, model: &str, elapsed_secs: f64) -> PerformanceRecord {
        let aggregate = match self.aggregates.write() {
            Ok(mut aggregates) => {
                let entry = aggregates.entry(model.to_string()).or_default();
                entry.total_secs += elapsed_secs;
                entry.count += 1;
                *entry
            }
            // A poisoned map only loses ordering information.
            Err(_) => Aggregate {
                total_secs: elapsed_secs,
                count: 1,
            },
        };
        PerformanceRecord {
            model_name: model.to_string(),
            mean_latency_seconds: aggregate.mean(),
            sample_count: aggregate.count,
        }
    }

    async fn persist(&self, record: &PerformanceRecord) -> Result<()> {
        let mut row = Row::new();
        row.insert(KEY_COLUMN.into(), json!(record.model_name));
        row.insert(
            "mean_latency_seconds".into(),
            json!(record.mean_latency_seconds),
        );
        row.insert("sample_count".into(), json!(record.sample_count));
        row.insert("updated_at".into(), json!(timestamp::format(&Utc::now())));
        self.store.upsert(&self.table, KEY_COLUMN, row).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn samples_fold_into_running_mean() {
        let store = PerformanceStore::new(Arc::new(MemoryStore::new()));
        store.record_sample("m", 1.0, true).await;
        store.record_sample("m", 2.0, false).await;
        let record = store.record_sample("m", 3.0, true).await;
        assert_eq!(record.sample_count, 3);
        assert!((record.mean_latency_seconds - 2.0).abs() < 1e-9);
        assert_eq!(store.record("m"), record);
        assert_eq!(store.record("unseen").sample_count, 0);
    }

    #[tokio::test]
    async fn load_replicates_persisted_mean() {
        let backend = Arc::new(MemoryStore::new());
        let first = PerformanceStore::new(backend.clone());
        first.record_sample("m", 2.0, true).await;
        first.record_sample("m", 4.0, true).await;

        let second = PerformanceStore::new(backend);
        assert_eq!(second.load().await.unwrap(), 1);
        let record = second.record_sample("m", 6.0, true).await;
        assert_eq!(record.sample_count, 3);
        assert!((record.mean_latency_seconds - 4.0).abs() < 1e-9);
    }
}
