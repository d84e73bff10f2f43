//! Prompt construction.

use std::fmt::Write;

/// Shared output contract appended to every prompt. A zero `count` leaves
/// the number of items to the model.
fn output_rules(out: &mut String, count: usize) {
    out.push_str(
        "\nIMPORTANT:\n\
         - Output ONLY in English\n\
         - Output MUST be a valid JSON array of objects\n\
         - Each object must have \"thinking\" (max 2-3 sentences of rationale) and \"question\" (one exam-appropriate question)\n\
         - No commentary or text outside the JSON\n",
    );
    if count > 0 {
        let _ = writeln!(out, "- Exactly {count} items");
    }
    out.push_str(
        "- Generate NEW questions, do not copy the examples\n\
         \nNow return ONLY the JSON array:",
    );
}

/// "3 original" or, for a zero count, just "original".
fn how_many(num: usize) -> String {
    if num > 0 {
        format!("{num} original")
    } else {
        "original".to_string()
    }
}

fn examples_block(out: &mut String, examples: &[String]) {
    out.push_str("\nExamples from the question bank and previous generations:\n");
    if examples.is_empty() {
        out.push_str("No examples available.\n");
    } else {
        for example in examples {
            out.push_str(example.trim_end());
            out.push('\n');
        }
    }
}

fn news_block(out: &mut String, heading: &str, news: Option<&str>) {
    if let Some(news) = news.filter(|n| !n.trim().is_empty()) {
        let _ = writeln!(out, "\n{heading}:\n{}", news.trim_end());
    }
}

/// Single-topic prompt; `news` switches on current-affairs framing.
pub fn topic_prompt(
    subject: &str,
    topic: &str,
    num: usize,
    examples: &[String],
    news: Option<&str>,
) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "You are a UPSC Mains question paper designer for {subject}.\n\
         Generate {} UPSC-style Mains questions for the topic \"{topic}\".",
        how_many(num)
    );
    if news.is_some() {
        out.push_str("Ground the questions in the recent developments listed below.\n");
    }
    news_block(&mut out, "Recent news", news);
    examples_block(&mut out, examples);
    output_rules(&mut out, num);
    out
}

/// Whole-paper prompt covering several topics.
pub fn paper_prompt(
    subject: &str,
    topics: &[String],
    size: usize,
    examples: &[String],
    news: &[String],
) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "You are a UPSC Mains paper designer for {subject}.\n\
         Generate a full UPSC paper ({size} questions) covering these topics: {}.",
        topics.join("; ")
    );
    if !news.is_empty() {
        out.push_str("Base several questions on the current affairs below.\n");
        for digest in news {
            let _ = writeln!(out, "\n{digest}");
        }
    }
    examples_block(&mut out, examples);
    output_rules(&mut out, size);
    out
}

/// Keyword-driven prompt.
pub fn keyword_prompt(
    keywords: &[String],
    subject: &str,
    num: usize,
    examples: &[String],
    news: Option<&str>,
) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "You are a UPSC Mains question paper designer for {subject}.\n\
         Generate {} UPSC-style Mains questions that bring together these keywords: {}.",
        how_many(num),
        keywords.join(", ")
    );
    news_block(&mut out, "Recent news", news);
    examples_block(&mut out, examples);
    output_rules(&mut out, num);
    out
}

/// First `max` characters of `text`, with an ellipsis when cut.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_prompt_embeds_examples_and_count() {
        let prompt = topic_prompt("GS2", "Polity", 3, &["1. Discuss X.".into()], None);
        assert!(prompt.contains("for the topic \"Polity\""));
        assert!(prompt.contains("1. Discuss X."));
        assert!(prompt.contains("Exactly 3 items"));
        assert!(!prompt.contains("Recent news"));
    }

    #[test]
    fn zero_count_leaves_the_number_open() {
        let prompt = topic_prompt("GS2", "Polity", 0, &[], None);
        assert!(prompt.contains("Generate original UPSC-style"));
        assert!(!prompt.contains("Exactly"));
        assert!(!prompt.contains(" 0 "));
    }

    #[test]
    fn empty_examples_are_stated() {
        let prompt = keyword_prompt(&["monsoon".into()], "GS1", 2, &[], Some("- Rainfall deficit"));
        assert!(prompt.contains("No examples available."));
        assert!(prompt.contains("- Rainfall deficit"));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("नमस्ते दुनिया", 3), "नमस...");
        assert_eq!(truncate_chars("short", 10), "short");
    }
}
