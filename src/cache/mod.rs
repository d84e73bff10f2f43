//! Generation cache.
//!
//! Two tables in the durable key-value store:
//!
//! - `generation_cache`: one [`CacheEntry`] per request key, holding the
//!   questions a successful generation produced.
//! - `topic_index`: one [`TopicIndexEntry`] per question, grouped by
//!   (subject, topic) and capped at [`DEFAULT_MAX_PER_TOPIC`] rows per group,
//!   oldest evicted first. Later requests sample these as prompt examples.
//!
//! Both row types expire [`DEFAULT_TTL_DAYS`] after creation. Expiry is lazy:
//! reads filter on `expires_at > now` and nothing is swept except by
//! [`GenerationCache::clear`].

mod entry;

pub use entry::{CacheEntry, CacheStats, SubjectStats, TopicIndexEntry};

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use rand::seq::SliceRandom;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use crate::store::{Filter, KeyValueStore, Row, SortOrder};
use crate::telemetry;
use crate::types::{GeneratedQuestion, SUBJECTS, timestamp};
use crate::{MimirError, Result};

/// Default entry lifetime.
pub const DEFAULT_TTL_DAYS: i64 = 7;

/// Default bound on indexed questions per (subject, topic).
pub const DEFAULT_MAX_PER_TOPIC: usize = 50;

/// Default table for cache entries.
pub const DEFAULT_CACHE_TABLE: &str = "generation_cache";

/// Default table for the per-topic question index.
pub const DEFAULT_INDEX_TABLE: &str = "topic_index";

/// Rows per page when walking the whole index. Kept at or below PostgREST's
/// common `max-rows` setting.
const PAGE_SIZE: usize = 1_000;

/// Earliest representable stored timestamp; `gt` this matches every row.
const EPOCH: &str = "1970-01-01T00:00:00.000000Z";

/// Topic-indexed cache of generated questions.
pub struct GenerationCache {
    store: Arc<dyn KeyValueStore>,
    ttl: TimeDelta,
    max_per_topic: usize,
    entries_table: String,
    index_table: String,
}

impl GenerationCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            ttl: TimeDelta::days(DEFAULT_TTL_DAYS),
            max_per_topic: DEFAULT_MAX_PER_TOPIC,
            entries_table: DEFAULT_CACHE_TABLE.to_string(),
            index_table: DEFAULT_INDEX_TABLE.to_string(),
        }
    }

    /// Entry lifetime.
    pub fn ttl(mut self, ttl: TimeDelta) -> Self {
        self.ttl = ttl;
        self
    }

    /// Bound on indexed questions per (subject, topic).
    pub fn max_per_topic(mut self, max: usize) -> Self {
        self.max_per_topic = max;
        self
    }

    /// Override table names.
    pub fn tables(mut self, entries: impl Into<String>, index: impl Into<String>) -> Self {
        self.entries_table = entries.into();
        self.index_table = index.into();
        self
    }

    /// Deterministic key for a request.
    ///
    /// SHA-256 over the parameters rendered as `name=value` pairs sorted by
    /// name, so equal requests always share a key.
    pub fn key(
        subject: &str,
        topic: &str,
        num: usize,
        use_current_affairs: bool,
        months: u32,
    ) -> String {
        let mut fields = [
            ("subject", subject.to_string()),
            ("topic", topic.to_string()),
            ("num", num.to_string()),
            ("use_current_affairs", use_current_affairs.to_string()),
            ("months", months.to_string()),
        ];
        fields.sort_by(|a, b| a.0.cmp(b.0));
        let canonical = fields
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("\u{1f}");
        hex::encode(Sha256::digest(canonical.as_bytes()))
    }

    /// Key for one topic's share of a whole-paper result.
    pub fn paper_key(subject: &str, topic: &str, at: DateTime<Utc>) -> String {
        format!("paper_{subject}_{topic}_{}", at.timestamp())
    }

    /// Store a generation result and index its questions.
    ///
    /// Questions already indexed under (subject, topic) are not indexed again.
    /// Returns the number of newly indexed questions.
    #[instrument(skip(self, questions), fields(count = questions.len()))]
    pub async fn put(
        &self,
        key: &str,
        questions: &[GeneratedQuestion],
        subject: &str,
        topic: &str,
    ) -> Result<usize> {
        let result = self.write(key, questions, subject, topic).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(telemetry::CACHE_WRITES_TOTAL, "status" => status).increment(1);
        result
    }

    async fn write(
        &self,
        key: &str,
        questions: &[GeneratedQuestion],
        subject: &str,
        topic: &str,
    ) -> Result<usize> {
        let now = Utc::now();
        let entry = CacheEntry {
            cache_key: key.to_string(),
            subject: subject.to_string(),
            topic: topic.to_string(),
            questions: questions.to_vec(),
            created_at: now,
            expires_at: now + self.ttl,
        };
        self.store
            .upsert(&self.entries_table, "cache_key", to_row(&entry)?)
            .await?;

        let existing = self.index_rows(subject, topic, true).await?;
        let mut seen: HashSet<String> = existing.iter().map(|e| e.question.clone()).collect();

        let mut rows = Vec::new();
        for q in questions {
            let text = q.question.trim();
            if text.is_empty() || !seen.insert(text.to_string()) {
                continue;
            }
            // Distinct timestamps keep insertion order under created_at sorting.
            let created_at = now + TimeDelta::microseconds(rows.len() as i64);
            let indexed = TopicIndexEntry {
                id: uuid::Uuid::new_v4().to_string(),
                subject: subject.to_string(),
                topic: topic.to_string(),
                question: text.to_string(),
                thinking: q.thinking.trim().to_string(),
                created_at,
                expires_at: created_at + self.ttl,
            };
            rows.push(to_row(&indexed)?);
        }
        let added = rows.len();
        self.store.upsert_many(&self.index_table, "id", rows).await?;

        self.trim(subject, topic).await?;
        info!(subject, topic, added, "cached generated questions");
        Ok(added)
    }

    /// Evict the oldest index rows beyond the per-topic bound.
    async fn trim(&self, subject: &str, topic: &str) -> Result<()> {
        let rows = self.index_rows(subject, topic, false).await?;
        if rows.len() <= self.max_per_topic {
            return Ok(());
        }
        let evicted: Vec<String> = rows
            .into_iter()
            .skip(self.max_per_topic)
            .map(|e| e.id)
            .collect();
        debug!(subject, topic, evicted = evicted.len(), "trimming topic index");
        let filter = Filter::new().one_of("id", evicted);
        self.store.delete(&self.index_table, &filter).await
    }

    /// Index rows for (subject, topic), newest first.
    async fn index_rows(
        &self,
        subject: &str,
        topic: &str,
        live_only: bool,
    ) -> Result<Vec<TopicIndexEntry>> {
        let mut filter = Filter::new().eq("subject", subject).eq("topic", topic);
        if live_only {
            filter = filter.gt("expires_at", timestamp::format(&Utc::now()));
        }
        let filter = filter.order_by("created_at", SortOrder::Desc);
        from_rows(self.store.select(&self.index_table, &filter).await?)
    }

    /// Live index rows for (subject, topic), newest first.
    pub async fn topic_index(&self, subject: &str, topic: &str) -> Result<Vec<TopicIndexEntry>> {
        self.index_rows(subject, topic, true).await
    }

    /// Live entry stored under `key`.
    pub async fn entry(&self, key: &str) -> Result<Option<CacheEntry>> {
        let filter = Filter::new()
            .eq("cache_key", key)
            .gt("expires_at", timestamp::format(&Utc::now()))
            .limit(1);
        Ok(from_rows(self.store.select(&self.entries_table, &filter).await?)?
            .into_iter()
            .next())
    }

    /// Up to `max` random question texts from the (subject, topic) index.
    ///
    /// Reads the `2 × max` most recent live rows and samples among them.
    pub async fn sample_examples(
        &self,
        subject: &str,
        topic: &str,
        max: usize,
    ) -> Result<Vec<String>> {
        if max == 0 {
            return Ok(Vec::new());
        }
        let filter = Filter::new()
            .eq("subject", subject)
            .eq("topic", topic)
            .gt("expires_at", timestamp::format(&Utc::now()))
            .order_by("created_at", SortOrder::Desc)
            .limit(2 * max);
        let rows = from_rows::<TopicIndexEntry>(self.store.select(&self.index_table, &filter).await?)?;
        Ok(sample_questions(rows, max))
    }

    /// Up to `max` random question texts from any topic of `subject`.
    ///
    /// Same `2 × max` most-recent window as [`Self::sample_examples`].
    pub async fn sample_subject_examples(&self, subject: &str, max: usize) -> Result<Vec<String>> {
        if max == 0 {
            return Ok(Vec::new());
        }
        let filter = Filter::new()
            .eq("subject", subject)
            .gt("expires_at", timestamp::format(&Utc::now()))
            .order_by("created_at", SortOrder::Desc)
            .limit(2 * max);
        let rows = from_rows::<TopicIndexEntry>(self.store.select(&self.index_table, &filter).await?)?;
        Ok(sample_questions(rows, max))
    }

    /// Counts of live cached questions per subject.
    ///
    /// The four standard subjects are always present, with zero counts when
    /// nothing is cached for them. Totals come from the store's exact count;
    /// per-subject figures from a paged walk of the live index.
    pub async fn stats(&self) -> Result<CacheStats> {
        let live = Filter::new().gt("expires_at", timestamp::format(&Utc::now()));
        let total_questions = self.store.count(&self.index_table, &live).await?;
        let total_entries = self.store.count(&self.entries_table, &live).await?;

        let mut per_subject: BTreeMap<String, (usize, HashSet<String>)> = SUBJECTS
            .iter()
            .map(|s| (s.to_string(), (0, HashSet::new())))
            .collect();
        let mut offset = 0;
        loop {
            let page = live
                .clone()
                .order_by("id", SortOrder::Asc)
                .offset(offset)
                .limit(PAGE_SIZE);
            let rows =
                from_rows::<TopicIndexEntry>(self.store.select(&self.index_table, &page).await?)?;
            if rows.is_empty() {
                break;
            }
            offset += rows.len();
            for row in rows {
                let (count, topics) = per_subject.entry(row.subject).or_default();
                *count += 1;
                topics.insert(row.topic);
            }
        }

        Ok(CacheStats {
            subjects: per_subject
                .into_iter()
                .map(|(subject, (total_questions, topics))| {
                    (
                        subject,
                        SubjectStats {
                            total_questions,
                            topics_with_cache: topics.len(),
                        },
                    )
                })
                .collect(),
            total_questions,
            total_entries,
        })
    }

    /// Delete entries and index rows matching `subject` and `topic`.
    ///
    /// `None` matches anything, so `clear(None, None)` empties both tables.
    #[instrument(skip(self))]
    pub async fn clear(&self, subject: Option<&str>, topic: Option<&str>) -> Result<()> {
        let filter = Filter::new()
            .eq_opt("subject", subject)
            .eq_opt("topic", topic)
            .gt("created_at", EPOCH);
        self.store.delete(&self.entries_table, &filter).await?;
        self.store.delete(&self.index_table, &filter).await?;
        info!(subject, topic, "cleared generation cache");
        Ok(())
    }
}

/// Random sample of up to `max` question texts.
fn sample_questions(rows: Vec<TopicIndexEntry>, max: usize) -> Vec<String> {
    let mut rng = rand::thread_rng();
    rows.choose_multiple(&mut rng, max)
        .map(|e| e.question.clone())
        .collect()
}

fn to_row<T: serde::Serialize>(value: &T) -> Result<Row> {
    match serde_json::to_value(value)? {
        Value::Object(row) => Ok(row),
        other => Err(MimirError::InvalidInput(format!(
            "expected an object row, got {other}"
        ))),
    }
}

fn from_rows<T: serde::de::DeserializeOwned>(rows: Vec<Row>) -> Result<Vec<T>> {
    rows.into_iter()
        .map(|row| serde_json::from_value(Value::Object(row)).map_err(MimirError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_deterministic_and_parameter_sensitive() {
        let a = GenerationCache::key("GS1", "Polity", 3, false, 6);
        let b = GenerationCache::key("GS1", "Polity", 3, false, 6);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, GenerationCache::key("GS1", "Polity", 3, true, 6));
        assert_ne!(a, GenerationCache::key("GS1", "Polity", 4, false, 6));
        assert_ne!(a, GenerationCache::key("GS2", "Polity", 3, false, 6));
    }

    #[test]
    fn key_fields_do_not_bleed_into_each_other() {
        assert_ne!(
            GenerationCache::key("GS1", "a", 1, false, 6),
            GenerationCache::key("GS1a", "", 1, false, 6)
        );
    }

    #[test]
    fn sample_never_exceeds_max() {
        let now = Utc::now();
        let rows: Vec<TopicIndexEntry> = (0..6)
            .map(|i| TopicIndexEntry {
                id: i.to_string(),
                subject: "GS1".into(),
                topic: "Art".into(),
                question: format!("q{i}"),
                thinking: String::new(),
                created_at: now,
                expires_at: now,
            })
            .collect();
        let picked = sample_questions(rows, 3);
        assert_eq!(picked.len(), 3);
        let unique: HashSet<&String> = picked.iter().collect();
        assert_eq!(unique.len(), 3);
    }
}
