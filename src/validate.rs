use crate::error::BlogError;
use crate::request::{AudienceSet, GenerationRequest, RawBlogRequest};
use jsonschema::{Draft, JSONSchema};
use serde_json::Value;

pub const REQUEST_SCHEMA_SRC: &str = include_str!("../schema/blog_request.schema.json");

pub const DEFAULT_MAX_TOPIC_CHARS: usize = 500;
pub const DEFAULT_MAX_WORD_COUNT: u32 = 5000;

pub struct Validator {
    compiled: JSONSchema,
    audiences: AudienceSet,
    max_topic_chars: usize,
    max_word_count: u32,
}

impl Validator {
    /// Validator for the embedded request schema.
    pub fn new(audiences: AudienceSet) -> Result<Self, BlogError> {
        let schema: Value = serde_json::from_str(REQUEST_SCHEMA_SRC)
            .map_err(|e| BlogError::Configuration(format!("request schema: {e}")))?;
        Self::with_schema(&schema, audiences)
    }

    pub fn with_schema(schema: &Value, audiences: AudienceSet) -> Result<Self, BlogError> {
        let compiled = JSONSchema::options()
            .with_draft(Draft::Draft202012)
            .compile(schema)
            .map_err(|e| BlogError::Configuration(format!("request schema: {e}")))?;
        Ok(Self {
            compiled,
            audiences,
            max_topic_chars: DEFAULT_MAX_TOPIC_CHARS,
            max_word_count: DEFAULT_MAX_WORD_COUNT,
        })
    }

    pub fn with_limits(mut self, max_topic_chars: usize, max_word_count: u32) -> Self {
        self.max_topic_chars = max_topic_chars;
        self.max_word_count = max_word_count;
        self
    }

    pub fn audiences(&self) -> &AudienceSet {
        &self.audiences
    }

    /// Shape check on an untyped body, then the field-level rules.
    pub fn validate_json(&self, v: &Value) -> Result<GenerationRequest, BlogError> {
        if let Err(errors) = self.compiled.validate(v) {
            let msg = errors
                .map(|e| {
                    let path = e.instance_path.to_string();
                    if path.is_empty() {
                        e.to_string()
                    } else {
                        format!("{path}: {e}")
                    }
                })
                .next()
                .unwrap_or_else(|| "request does not match schema".to_string());
            return Err(BlogError::InvalidInput(msg));
        }
        let raw: RawBlogRequest = serde_json::from_value(v.clone())
            .map_err(|e| BlogError::InvalidInput(e.to_string()))?;
        self.validate(&raw)
    }

    pub fn validate(&self, raw: &RawBlogRequest) -> Result<GenerationRequest, BlogError> {
        let topic = raw.topic.trim();
        if topic.is_empty() {
            return Err(BlogError::invalid("topic must not be empty"));
        }
        let topic_chars = topic.chars().count();
        if topic_chars > self.max_topic_chars {
            return Err(BlogError::invalid(format!(
                "topic is {topic_chars} characters, limit is {}",
                self.max_topic_chars
            )));
        }

        let word_count = raw.word_count.parse()?;
        if word_count > self.max_word_count {
            return Err(BlogError::invalid(format!(
                "word count {word_count} exceeds limit of {}",
                self.max_word_count
            )));
        }

        let audience = self.audiences.resolve(&raw.audience).ok_or_else(|| {
            BlogError::invalid(format!(
                "unknown audience {:?}; expected one of: {}",
                raw.audience.trim(),
                self.audiences
            ))
        })?;

        Ok(GenerationRequest::new_unchecked(
            topic.to_string(),
            word_count,
            audience.to_string(),
        ))
    }
}
