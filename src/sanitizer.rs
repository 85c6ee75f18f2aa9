//! sanitizer.rs: Extract exactly one SQL statement from a raw LLM completion.
//!
//! The completion is untrusted text: it may carry prose, markdown fences,
//! a "SQL:" label or several statements. Each step below is a pure function
//! over the output of the previous one:
//!
//! 1. [`strip_code_fence`] keeps only the content of the first fenced block
//! 2. [`strip_label`] drops a leading "SQL:" / "Query:" / "Ответ:" label
//! 3. [`seek_statement`] starts the text at the first statement keyword
//! 4. [`truncate_at_terminator`] cuts after the first `;`
//!
//! No semantic validation happens here. Column names and result shape are
//! checked by the database when the statement runs.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::ExtractionFailure;
use crate::schema::DEFAULT_QUERY;

const FENCE: &str = "```";

/// A single statement extracted from a completion.
///
/// Starts with a statement keyword and contains at most one `;`, which is
/// its last character when present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedSql(String);

impl SanitizedSql {
    /// The fixed fallback statement.
    pub fn default_query() -> Self {
        SanitizedSql(DEFAULT_QUERY.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Leading keyword, upper-cased.
    pub fn keyword(&self) -> String {
        self.0
            .chars()
            .take_while(|c| c.is_alphabetic())
            .collect::<String>()
            .to_uppercase()
    }

    /// True for statements starting with SELECT or WITH.
    pub fn is_read_only(&self) -> bool {
        matches!(self.keyword().as_str(), "SELECT" | "WITH")
    }
}

impl fmt::Display for SanitizedSql {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SanitizedSql {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn label_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(?:sql|query|answer|запрос|ответ)\s*:\s*").expect("label regex")
    })
}

fn keyword_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:select|insert|update|delete|with)\b").expect("keyword regex")
    })
}

/// Map a completion to one statement, or report why nothing was found.
pub fn sanitize(raw: &str) -> Result<SanitizedSql, ExtractionFailure> {
    let text = strip_code_fence(raw);
    let text = strip_label(text);
    if text.trim().is_empty() {
        return Err(ExtractionFailure::Empty);
    }

    let text = seek_statement(text).ok_or(ExtractionFailure::NoStatementKeyword)?;
    let text = truncate_at_terminator(text).trim();
    if text.is_empty() {
        return Err(ExtractionFailure::Empty);
    }

    Ok(SanitizedSql(text.to_string()))
}

/// Like [`sanitize`] but substitutes [`DEFAULT_QUERY`] on failure.
pub fn sanitize_or_default(raw: &str) -> SanitizedSql {
    sanitize(raw).unwrap_or_else(|_| SanitizedSql::default_query())
}

/// Content of the first ``` block, without its language tag line.
/// Text without a complete block is returned unchanged.
pub fn strip_code_fence(text: &str) -> &str {
    let Some(open) = text.find(FENCE) else {
        return text;
    };
    let rest = &text[open + FENCE.len()..];
    let Some(close) = rest.find(FENCE) else {
        return text;
    };
    let inner = &rest[..close];

    match inner.split_once('\n') {
        Some((tag, body)) if is_language_tag(tag) => body.trim(),
        _ => inner.trim(),
    }
}

// "sql", "postgresql", "", but never a bare statement keyword like "SELECT".
fn is_language_tag(line: &str) -> bool {
    let tag = line.trim();
    tag.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '+'))
        && !keyword_re().is_match(tag)
}

/// Drop one leading "SQL:"-style label.
pub fn strip_label(text: &str) -> &str {
    match label_re().find(text) {
        Some(m) => &text[m.end()..],
        None => text,
    }
}

/// Slice starting at the first statement keyword, if any.
pub fn seek_statement(text: &str) -> Option<&str> {
    keyword_re().find(text).map(|m| &text[m.start()..])
}

/// Keep everything up to and including the first `;`.
pub fn truncate_at_terminator(text: &str) -> &str {
    match text.find(';') {
        Some(idx) => &text[..=idx],
        None => text,
    }
}
