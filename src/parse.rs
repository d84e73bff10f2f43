//! Turning raw model text into structured questions.
//!
//! [`parse_questions`] is pure and never fails. Strategies are tried in order
//! and the first one that yields at least one question wins:
//!
//! 1. strip `<think>…</think>` spans
//! 2. the whole text as a JSON array
//! 3. the first `[` … last `]` span as a JSON array
//! 4. blank-line paragraphs that read like exam questions
//! 5. any blank-line paragraph longer than 10 characters
//!
//! If all of them come up empty a single placeholder question is returned.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::telemetry;
use crate::types::GeneratedQuestion;

/// Question text returned when nothing could be parsed.
pub const PLACEHOLDER_QUESTION: &str = "The model response could not be parsed into questions.";

static THINK_TAGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid regex"));

static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\r?\n[ \t]*\r?\n").expect("valid regex"));

static NOISE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(note|instruction|thinking|reasoning|let's|alright)").expect("valid regex")
});

static DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(Discuss|Explain|Analy[sz]e|Evaluate|Critically|Examine|Comment|Elucidate|Illustrate|Describe|Assess|Justify|Outline|Compare|Contrast|What|Why|How|To what extent)\b",
    )
    .expect("valid regex")
});

static ENUMERATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:Q(?:uestion)?\s*)?\d+\s*[.):\-]\s*").expect("valid regex")
});

/// Which strategy produced the questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStage {
    Json,
    EmbeddedJson,
    RegexQuestions,
    ParagraphSplit,
    Placeholder,
}

impl ParseStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseStage::Json => "json",
            ParseStage::EmbeddedJson => "embedded_json",
            ParseStage::RegexQuestions => "regex_questions",
            ParseStage::ParagraphSplit => "paragraph_split",
            ParseStage::Placeholder => "placeholder",
        }
    }
}

impl fmt::Display for ParseStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parser output.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedQuestions {
    pub questions: Vec<GeneratedQuestion>,
    pub stage: ParseStage,
}

impl ParsedQuestions {
    /// True when real questions were recovered.
    pub fn is_parsed(&self) -> bool {
        self.stage != ParseStage::Placeholder
    }
}

/// Parse `raw` into at most `limit` questions (all of them when `None` or zero).
pub fn parse_questions(raw: &str, limit: Option<usize>) -> ParsedQuestions {
    let cleaned = THINK_TAGS.replace_all(raw, "");
    let cleaned = cleaned.trim();

    let (questions, stage) = if let Some(qs) = from_json(cleaned) {
        (qs, ParseStage::Json)
    } else if let Some(qs) = embedded_span(cleaned).and_then(from_json) {
        (qs, ParseStage::EmbeddedJson)
    } else if let Some(qs) = non_empty(question_paragraphs(cleaned)) {
        (qs, ParseStage::RegexQuestions)
    } else if let Some(qs) = non_empty(any_paragraphs(cleaned)) {
        (qs, ParseStage::ParagraphSplit)
    } else {
        (
            vec![GeneratedQuestion::new(PLACEHOLDER_QUESTION)],
            ParseStage::Placeholder,
        )
    };

    let mut questions = questions;
    if let Some(limit) = limit.filter(|&n| n > 0) {
        questions.truncate(limit);
    }

    debug!(stage = %stage, count = questions.len(), "parsed model output");
    metrics::counter!(telemetry::PARSE_STAGE_TOTAL, "stage" => stage.as_str()).increment(1);

    ParsedQuestions { questions, stage }
}

fn non_empty(questions: Vec<GeneratedQuestion>) -> Option<Vec<GeneratedQuestion>> {
    (!questions.is_empty()).then_some(questions)
}

/// JSON array of `{thinking?, question}` objects or plain strings.
fn from_json(text: &str) -> Option<Vec<GeneratedQuestion>> {
    let Value::Array(items) = serde_json::from_str::<Value>(text).ok()? else {
        return None;
    };

    let questions: Vec<GeneratedQuestion> = items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(GeneratedQuestion::new(s.trim())),
            Value::Object(map) => {
                let question = map.get("question")?.as_str()?.trim().to_string();
                let thinking = map
                    .get("thinking")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .trim()
                    .to_string();
                Some(GeneratedQuestion::with_thinking(thinking, question))
            }
            _ => None,
        })
        .filter(|q| !q.question.is_empty())
        .collect();

    non_empty(questions)
}

/// Text from the first `[` through the last `]`.
fn embedded_span(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    (end > start).then(|| &text[start..=end])
}

fn paragraphs(text: &str) -> impl Iterator<Item = &str> {
    PARAGRAPH_BREAK
        .split(text)
        .map(str::trim)
        .filter(|p| !p.is_empty())
}

/// Paragraphs ending in `?` or opening with a directive verb, renumbered.
fn question_paragraphs(text: &str) -> Vec<GeneratedQuestion> {
    paragraphs(text)
        .filter(|p| !NOISE.is_match(p))
        .map(|p| ENUMERATION.replace(p, "").trim().to_string())
        .filter(|p| p.ends_with('?') || DIRECTIVE.is_match(p))
        .enumerate()
        .map(|(i, p)| GeneratedQuestion::new(format!("{}. {p}", i + 1)))
        .collect()
}

/// Every paragraph longer than 10 characters, numbered.
fn any_paragraphs(text: &str) -> Vec<GeneratedQuestion> {
    paragraphs(text)
        .filter(|p| p.chars().count() > 10)
        .enumerate()
        .map(|(i, p)| GeneratedQuestion::new(format!("{}. {p}", i + 1)))
        .collect()
}
