//! Validate a submission, build its prompt, run the backend, wrap the outcome.

use crate::error::BlogError;
use crate::model::{GenerationConfig, LlmBackend};
use crate::prompt::PromptTemplate;
use crate::request::{GenerationRequest, GenerationResult, RawBlogRequest};
use crate::stats::{Outcome, Stats, StatsSnapshot};
use crate::validate::Validator;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;

pub struct BlogHandler {
    backend: Arc<dyn LlmBackend>,
    validator: Validator,
    template: PromptTemplate,
    config: GenerationConfig,
    permits: Semaphore,
    max_concurrent: usize,
    stats: Stats,
}

impl BlogHandler {
    /// One generation in flight at a time; see [`BlogHandler::with_max_concurrent`].
    pub fn new(
        backend: Arc<dyn LlmBackend>,
        validator: Validator,
        template: PromptTemplate,
        config: GenerationConfig,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            backend,
            validator,
            template,
            config,
            permits: Semaphore::new(1),
            max_concurrent: 1,
            stats: Stats::new()?,
        })
    }

    /// Allow up to `n` concurrent backend calls (minimum 1).
    pub fn with_max_concurrent(mut self, n: usize) -> Self {
        let n = n.max(1);
        self.permits = Semaphore::new(n);
        self.max_concurrent = n;
        self
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn backend_loaded(&self) -> bool {
        self.backend.is_loaded()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn build_prompt(&self, req: &GenerationRequest) -> String {
        self.template.render(req)
    }

    /// Typed entry point. Invalid input is returned as `Err` and never reaches
    /// the backend; backend failures come back inside the result.
    pub async fn handle(&self, raw: &RawBlogRequest) -> Result<GenerationResult, BlogError> {
        let req = self.validator.validate(raw).map_err(|e| self.reject(e))?;
        Ok(self.generate(&req).await)
    }

    /// Same as [`BlogHandler::handle`] for an untyped JSON body.
    pub async fn handle_json(&self, body: &Value) -> Result<GenerationResult, BlogError> {
        let req = self.validator.validate_json(body).map_err(|e| self.reject(e))?;
        Ok(self.generate(&req).await)
    }

    /// Count and log a submission refused before generation.
    pub fn reject(&self, e: BlogError) -> BlogError {
        tracing::info!(error = %e, "rejected submission");
        self.stats.record(Outcome::InvalidInput, None);
        e
    }

    /// Run the backend for an already validated request. Never fails: backend
    /// errors of any kind are folded into [`GenerationResult::failure`].
    pub async fn generate(&self, req: &GenerationRequest) -> GenerationResult {
        let prompt = self.build_prompt(req);
        tracing::info!(
            audience = req.audience(),
            word_count = req.word_count(),
            prompt_chars = prompt.len(),
            "generating"
        );

        let _permit = match self.permits.acquire().await {
            Ok(p) => p,
            Err(_) => {
                self.stats.record(Outcome::BackendFailure, None);
                return GenerationResult::failure("generation queue is closed");
            }
        };

        let start = Instant::now();
        let outcome = self.backend.generate(&prompt, &self.config).await;
        let elapsed = start.elapsed();

        match outcome {
            Ok(text) => {
                tracing::info!(ms = elapsed.as_millis() as u64, chars = text.len(), "generated");
                self.stats.record(Outcome::Success, Some(elapsed));
                GenerationResult::success(text, Some(elapsed.as_secs_f64()))
            }
            Err(e) => {
                let msg = BlogError::BackendFailure(format!("{e:#}")).to_string();
                tracing::warn!(ms = elapsed.as_millis() as u64, error = %msg, "generation failed");
                self.stats.record(Outcome::BackendFailure, Some(elapsed));
                GenerationResult::failure(msg)
            }
        }
    }
}
