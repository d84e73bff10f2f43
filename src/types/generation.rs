//! Generation request and response types.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::GeneratedQuestion;

/// Outcome of a generation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    /// A model produced output.
    Success,
    /// Every candidate model was skipped or failed.
    AllFailed,
    /// Whole-paper generation found no topics for the subject.
    NoTopics,
    /// Keyword generation was called without a usable keyword.
    NoKeywords,
}

impl GenerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationStatus::Success => "success",
            GenerationStatus::AllFailed => "all_failed",
            GenerationStatus::NoTopics => "no_topics",
            GenerationStatus::NoKeywords => "no_keywords",
        }
    }
}

impl fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of driving the router's attempt loop over an ordered model list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptResult {
    /// Raw model text on success, a human-readable failure message otherwise.
    pub output: String,
    /// Model that produced `output`; `None` when all candidates failed.
    pub model_used: Option<String>,
    /// Wall-clock duration of the successful invocation, rounded to 10ms.
    pub duration_secs: f64,
    /// Mean latency of `model_used` after this sample, rounded to 10ms.
    pub mean_latency_secs: f64,
    /// Number of samples behind `mean_latency_secs`.
    pub sample_count: u64,
    pub status: GenerationStatus,
}

impl AttemptResult {
    /// Terminal result for an exhausted candidate list.
    pub fn all_failed(last_error: Option<&str>) -> Self {
        Self {
            output: format!(
                "Error: All model attempts failed. Last error: {}",
                last_error.unwrap_or("no model could be reached")
            ),
            model_used: None,
            duration_secs: 0.0,
            mean_latency_secs: 0.0,
            sample_count: 0,
            status: GenerationStatus::AllFailed,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == GenerationStatus::Success
    }
}

/// Metadata returned alongside generated questions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationMeta {
    pub model_used: Option<String>,
    pub duration_secs: f64,
    pub mean_latency_secs: f64,
    pub sample_count: u64,
    pub status: GenerationStatus,
    /// Total examples embedded in the prompt (retrieved + cached).
    pub examples_used: usize,
    /// How many of `examples_used` came from the generation cache.
    pub cached_examples: usize,
    /// Topics covered by a whole-paper request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topics_covered: Option<usize>,
    /// Parser stage that produced `questions`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_stage: Option<String>,
}

impl GenerationMeta {
    /// Metadata for a request that never reached a model.
    pub fn without_attempt(status: GenerationStatus) -> Self {
        Self {
            model_used: None,
            duration_secs: 0.0,
            mean_latency_secs: 0.0,
            sample_count: 0,
            status,
            examples_used: 0,
            cached_examples: 0,
            topics_covered: None,
            parse_stage: None,
        }
    }

    pub(crate) fn from_attempt(attempt: &AttemptResult) -> Self {
        Self {
            model_used: attempt.model_used.clone(),
            duration_secs: attempt.duration_secs,
            mean_latency_secs: attempt.mean_latency_secs,
            sample_count: attempt.sample_count,
            status: attempt.status,
            examples_used: 0,
            cached_examples: 0,
            topics_covered: None,
            parse_stage: None,
        }
    }
}

/// Questions plus metadata, as returned by every generation flow.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationResponse {
    pub questions: Vec<GeneratedQuestion>,
    pub meta: GenerationMeta,
}

/// Single-topic generation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicRequest {
    pub subject: String,
    pub topic: String,
    /// Questions to request; zero leaves the count to the model.
    pub num: usize,
    #[serde(default)]
    pub use_current_affairs: bool,
    #[serde(default = "default_months")]
    pub months: u32,
    #[serde(default)]
    pub model: Option<String>,
}

impl TopicRequest {
    pub fn new(subject: impl Into<String>, topic: impl Into<String>, num: usize) -> Self {
        Self {
            subject: subject.into(),
            topic: topic.into(),
            num,
            use_current_affairs: false,
            months: default_months(),
            model: None,
        }
    }

    /// Augment the prompt with news from the last `months` months.
    pub fn current_affairs(mut self, months: u32) -> Self {
        self.use_current_affairs = true;
        self.months = months;
        self
    }

    /// Force a model to the front of the candidate list.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Whole-paper generation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperRequest {
    pub subject: String,
    #[serde(default)]
    pub use_current_affairs: bool,
    #[serde(default = "default_months")]
    pub months: u32,
    #[serde(default)]
    pub model: Option<String>,
}

impl PaperRequest {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            use_current_affairs: false,
            months: default_months(),
            model: None,
        }
    }

    pub fn current_affairs(mut self, months: u32) -> Self {
        self.use_current_affairs = true;
        self.months = months;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Keyword-driven generation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordRequest {
    pub keywords: Vec<String>,
    pub num: usize,
    #[serde(default)]
    pub use_current_affairs: bool,
    #[serde(default = "default_months")]
    pub months: u32,
    #[serde(default)]
    pub model: Option<String>,
    /// Subject to cache under. When absent, the first subject whose topic
    /// catalog has a topic containing the first non-blank keyword, else `GS1`.
    #[serde(default)]
    pub subject: Option<String>,
}

impl KeywordRequest {
    pub fn new<I, S>(keywords: I, num: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keywords: keywords.into_iter().map(Into::into).collect(),
            num,
            use_current_affairs: false,
            months: default_months(),
            model: None,
            subject: None,
        }
    }

    pub fn current_affairs(mut self, months: u32) -> Self {
        self.use_current_affairs = true;
        self.months = months;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// First non-blank keyword, trimmed. Used as the cache topic.
    pub fn representative_keyword(&self) -> Option<&str> {
        self.keywords
            .iter()
            .map(|k| k.trim())
            .find(|k| !k.is_empty())
    }
}

fn default_months() -> u32 {
    6
}
