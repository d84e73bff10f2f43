//! Generated question types.

use serde::{Deserialize, Serialize};

/// One model-produced item: optional short rationale plus the question itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GeneratedQuestion {
    #[serde(default)]
    pub thinking: String,
    pub question: String,
}

impl GeneratedQuestion {
    /// A question with no rationale.
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            thinking: String::new(),
            question: question.into(),
        }
    }

    /// A question with a rationale.
    pub fn with_thinking(thinking: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            thinking: thinking.into(),
            question: question.into(),
        }
    }
}
