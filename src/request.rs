//! Request and result types exchanged with the form collaborator.

use crate::error::BlogError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Word count as submitted: form fields arrive as text, JSON clients may send a number.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum WordCountInput {
    Number(serde_json::Number),
    Text(String),
}

impl WordCountInput {
    /// Strict positive-integer parse. Signs, fractions, exponents and blanks are rejected.
    pub fn parse(&self) -> Result<u32, BlogError> {
        let raw = match self {
            WordCountInput::Number(n) => n.to_string(),
            WordCountInput::Text(s) => s.trim().to_string(),
        };
        if raw.is_empty() {
            return Err(BlogError::invalid("word count is required"));
        }
        if !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(BlogError::invalid(format!(
                "word count must be a positive whole number, got {raw:?}"
            )));
        }
        let n: u32 = raw
            .parse()
            .map_err(|_| BlogError::invalid(format!("word count {raw} is too large")))?;
        if n == 0 {
            return Err(BlogError::invalid("word count must be greater than zero"));
        }
        Ok(n)
    }
}

impl From<u32> for WordCountInput {
    fn from(n: u32) -> Self {
        WordCountInput::Number(n.into())
    }
}

impl From<&str> for WordCountInput {
    fn from(s: &str) -> Self {
        WordCountInput::Text(s.to_string())
    }
}

/// The three form fields before validation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawBlogRequest {
    pub topic: String,
    pub word_count: WordCountInput,
    pub audience: String,
}

impl RawBlogRequest {
    pub fn new(
        topic: impl Into<String>,
        word_count: impl Into<WordCountInput>,
        audience: impl Into<String>,
    ) -> Self {
        Self {
            topic: topic.into(),
            word_count: word_count.into(),
            audience: audience.into(),
        }
    }
}

/// A validated submission. Only constructible through [`AudienceSet`] checks in
/// [`crate::validate`], so holding one means every invariant already holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    topic: String,
    word_count: u32,
    audience: String,
}

impl GenerationRequest {
    pub(crate) fn new_unchecked(topic: String, word_count: u32, audience: String) -> Self {
        Self {
            topic,
            word_count,
            audience,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn word_count(&self) -> u32 {
        self.word_count
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }
}

/// Configured audience labels. Lookups ignore case and surrounding whitespace
/// and return the configured spelling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudienceSet {
    labels: Vec<String>,
}

pub const DEFAULT_AUDIENCES: [&str; 4] = [
    "Researchers",
    "Data Scientist",
    "Common People",
    "Business Professionals",
];

impl AudienceSet {
    pub fn new<I, S>(labels: I) -> Result<Self, BlogError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<String> = Vec::new();
        for label in labels {
            let label = label.as_ref().trim();
            if label.is_empty() {
                continue;
            }
            if out.iter().any(|l| l.eq_ignore_ascii_case(label)) {
                return Err(BlogError::Configuration(format!(
                    "duplicate audience label {label:?}"
                )));
            }
            out.push(label.to_string());
        }
        if out.is_empty() {
            return Err(BlogError::Configuration(
                "at least one audience label is required".into(),
            ));
        }
        Ok(Self { labels: out })
    }

    pub fn resolve(&self, candidate: &str) -> Option<&str> {
        let candidate = candidate.trim();
        self.labels
            .iter()
            .find(|l| l.eq_ignore_ascii_case(candidate))
            .map(String::as_str)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

impl Default for AudienceSet {
    fn default() -> Self {
        Self {
            labels: DEFAULT_AUDIENCES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl fmt::Display for AudienceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.labels.join(", "))
    }
}

/// Outcome of one submission. Exactly one of `text` and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    elapsed_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl GenerationResult {
    pub fn success(text: String, elapsed_seconds: Option<f64>) -> Self {
        Self {
            text: Some(text),
            elapsed_seconds,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        let mut error = error.into();
        if error.is_empty() {
            error = "generation failed".to_string();
        }
        Self {
            text: None,
            elapsed_seconds: None,
            error: Some(error),
        }
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn elapsed_seconds(&self) -> Option<f64> {
        self.elapsed_seconds
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_success(&self) -> bool {
        self.text.is_some()
    }
}
