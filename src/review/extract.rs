// Artifact extraction
//
// Turns the reviewer's free-text approval into the exact text to publish.
// Pure and idempotent: extract(extract(x)) == extract(x).

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::config::constants::ELLIPSIS;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("empty content extracted")]
    Empty,

    #[error("length limit {0} leaves no room for content")]
    InvalidLimit(usize),
}

static READY_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)ready to post:?").expect("ready marker regex"));

static COMMENTARY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?mi)^[ \t]*(?:rationale|reasoning|notes)[ \t]*:").expect("commentary regex")
});

// "APPROVE: text", "APPROVED - text", "Decision: APPROVE\ntext", bare "APPROVED."
static LEADING_VERDICT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\A(?:decision[ \t]*:[ \t]*)?approved?(?:[ \t]*[:\-\u{2013}\u{2014}]|[ \t]*[.!]?[ \t]*(?:\r?\n|\z))",
    )
    .expect("leading verdict regex")
});

fn is_strippable(c: char) -> bool {
    c.is_whitespace()
        || matches!(
            c,
            '"' | '\'' | '`' | ':' | '\u{201C}' | '\u{201D}' | '\u{2018}' | '\u{2019}'
        )
}

/// Candidate text: everything after the last "ready to post" marker, or the
/// whole reply when there is none.
fn after_marker(raw: &str) -> &str {
    match READY_MARKER.find_iter(raw).last() {
        Some(m) => &raw[m.end()..],
        None => raw,
    }
}

fn clean_once(text: &str) -> &str {
    let text = match COMMENTARY.find(text) {
        Some(m) => &text[..m.start()],
        None => text,
    };
    let text = text.trim_matches(is_strippable);
    match LEADING_VERDICT.find(text) {
        Some(m) => &text[m.end()..],
        None => text,
    }
}

/// Extract a publishable artifact of at most `limit` chars from reviewer text.
///
/// Over-long text keeps its first `limit - 3` chars followed by "...".
pub fn extract_artifact(raw: &str, limit: usize) -> Result<String, ExtractionError> {
    if limit <= ELLIPSIS.len() {
        return Err(ExtractionError::InvalidLimit(limit));
    }

    let mut text = after_marker(raw);
    loop {
        let next = clean_once(text);
        if next == text {
            break;
        }
        text = next;
    }

    if text.is_empty() {
        return Err(ExtractionError::Empty);
    }

    if text.chars().count() <= limit {
        return Ok(text.to_string());
    }

    let mut truncated: String = text.chars().take(limit - ELLIPSIS.len()).collect();
    truncated.push_str(ELLIPSIS);
    Ok(truncated)
}
