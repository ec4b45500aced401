//! Prompt templates with exactly three substitution points.
//!
//! A template is parsed once into literal and slot segments. Rendering only
//! concatenates, so braces inside user-supplied values are copied through
//! verbatim and can never expand into further substitutions.

use crate::error::BlogError;
use crate::request::GenerationRequest;
use clap::ValueEnum;
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Topic,
    WordCount,
    Audience,
}

impl Slot {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "topic" => Some(Slot::Topic),
            "word_count" => Some(Slot::WordCount),
            "audience" => Some(Slot::Audience),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Slot(Slot),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
}

impl PromptTemplate {
    /// Parse `{topic}`, `{word_count}` and `{audience}` placeholders; `{{`/`}}` are literal braces.
    pub fn parse(source: &str) -> Result<Self, BlogError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.chars().peekable();

        while let Some(ch) = chars.next() {
            match ch {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        name.push(c);
                    }
                    if !closed {
                        return Err(BlogError::Configuration(format!(
                            "unterminated placeholder {{{name} in prompt template"
                        )));
                    }
                    let slot = Slot::from_name(name.trim()).ok_or_else(|| {
                        BlogError::Configuration(format!(
                            "unknown placeholder {{{name}}} in prompt template"
                        ))
                    })?;
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Slot(slot));
                }
                '}' => {
                    return Err(BlogError::Configuration(
                        "unmatched '}' in prompt template".into(),
                    ))
                }
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        for (slot, name) in [
            (Slot::Topic, "topic"),
            (Slot::WordCount, "word_count"),
            (Slot::Audience, "audience"),
        ] {
            if !segments.contains(&Segment::Slot(slot)) {
                return Err(BlogError::Configuration(format!(
                    "prompt template is missing the {{{name}}} placeholder"
                )));
            }
        }

        Ok(Self { segments })
    }

    pub fn render(&self, req: &GenerationRequest) -> String {
        let mut out = String::new();
        for seg in &self.segments {
            match seg {
                Segment::Literal(s) => out.push_str(s),
                Segment::Slot(Slot::Topic) => out.push_str(req.topic()),
                Segment::Slot(Slot::Audience) => out.push_str(req.audience()),
                Segment::Slot(Slot::WordCount) => {
                    let _ = write!(out, "{}", req.word_count());
                }
            }
        }
        out
    }
}

/// Built-in template wordings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TemplatePreset {
    Classic,
    JobProfile,
    Concise,
    Guided,
}

impl TemplatePreset {
    pub fn source(self) -> &'static str {
        match self {
            TemplatePreset::Classic => {
                "Write a blog for {audience} about {topic} within {word_count} words."
            }
            TemplatePreset::JobProfile => {
                "Write a blog for {audience} job profile for a topic {topic} within {word_count} words."
            }
            TemplatePreset::Concise => {
                "Write a concise {word_count}-word blog for {audience} about {topic}."
            }
            TemplatePreset::Guided => concat!(
                "Write a {word_count}-word blog post for {audience} about {topic}.\n",
                "\n",
                "Guidelines:\n",
                "- Write in a clear, engaging style\n",
                "- Include relevant examples and explanations\n",
                "- Structure the content with clear paragraphs\n",
                "- Maintain appropriate technical depth for the audience\n",
                "- End with a meaningful conclusion\n",
                "\n",
                "Blog Content:\n",
            ),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TemplatePreset::Classic => "classic",
            TemplatePreset::JobProfile => "job-profile",
            TemplatePreset::Concise => "concise",
            TemplatePreset::Guided => "guided",
        }
    }

    pub fn template(self) -> Result<PromptTemplate, BlogError> {
        PromptTemplate::parse(self.source())
    }
}
