//! Stored row shapes for the generation cache.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{GeneratedQuestion, timestamp};

/// One generation result, keyed by its request parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub cache_key: String,
    pub subject: String,
    pub topic: String,
    pub questions: Vec<GeneratedQuestion>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub expires_at: DateTime<Utc>,
}

/// One question indexed under its (subject, topic) for example sampling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicIndexEntry {
    pub id: String,
    pub subject: String,
    pub topic: String,
    pub question: String,
    #[serde(default)]
    pub thinking: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub expires_at: DateTime<Utc>,
}

/// Cached-question counts for one subject.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SubjectStats {
    pub total_questions: usize,
    pub topics_with_cache: usize,
}

/// Live (non-expired) cache contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub subjects: BTreeMap<String, SubjectStats>,
    /// Indexed questions across all subjects.
    pub total_questions: usize,
    /// Stored generation results.
    pub total_entries: usize,
}
