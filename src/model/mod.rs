use anyhow::{bail, Result};
use clap::ValueEnum;
use serde::Serialize;


/// Backend tuning values. Built once at startup and shared read-only.
///
/// Ranges are checked by the backend at generation time ([`GenerationConfig::check_ranges`]),
/// so a bad value becomes a reported generation failure rather than a startup crash.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GenerationConfig {
    /// New tokens to generate, `1..=n_ctx`.
    pub max_tokens: u32,
    /// `>= 0`; zero selects greedy decoding.
    pub temperature: f32,
    /// `(0, 1]`; 1 disables nucleus filtering.
    pub top_p: f32,
    /// 0 disables top-k filtering.
    pub top_k: u32,
    /// `[0, 1)`; 0 disables min-p filtering.
    pub min_p: f32,
    /// `> 0`; 1 disables the penalty.
    pub repeat_penalty: f32,
    /// Context window in tokens, `>= 64`.
    pub n_ctx: u32,
    /// Compute threads; 0 means one per host CPU.
    pub threads: u32,
    /// Layers offloaded to the GPU. Only read when the model is loaded.
    pub n_gpu_layers: u32,
    /// Prompt batch size, `>= 1`.
    pub n_batch: u32,
    /// Emit tokens to the trace log as they are produced.
    pub stream: bool,
    pub seed: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        ConfigProfile::Balanced.config()
    }
}

impl GenerationConfig {
    /// Resolve `threads = 0` against the host.
    pub fn resolved_threads(&self) -> u32 {
        if self.threads == 0 {
            num_cpus::get() as u32
        } else {
            self.threads
        }
    }

    pub fn check_ranges(&self) -> Result<()> {
        if self.n_ctx < 64 {
            bail!("n_ctx must be at least 64, got {}", self.n_ctx);
        }
        if self.max_tokens == 0 || self.max_tokens > self.n_ctx {
            bail!("max_tokens must be in 1..={}, got {}", self.n_ctx, self.max_tokens);
        }
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            bail!("temperature must be >= 0, got {}", self.temperature);
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            bail!("top_p must be in (0, 1], got {}", self.top_p);
        }
        if !(self.min_p >= 0.0 && self.min_p < 1.0) {
            bail!("min_p must be in [0, 1), got {}", self.min_p);
        }
        if !self.repeat_penalty.is_finite() || self.repeat_penalty <= 0.0 {
            bail!("repeat_penalty must be > 0, got {}", self.repeat_penalty);
        }
        if self.n_batch == 0 {
            bail!("n_batch must be at least 1");
        }
        Ok(())
    }
}

/// Named tuning sets. `balanced` is the server default; the others mirror
/// the deterministic, low-latency and high-quality setups the tool shipped with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ConfigProfile {
    Balanced,
    Deterministic,
    Speed,
    Quality,
}

impl ConfigProfile {
    pub fn config(self) -> GenerationConfig {
        match self {
            ConfigProfile::Balanced => GenerationConfig {
                max_tokens: 1024,
                temperature: 0.4,
                top_p: 0.9,
                top_k: 40,
                min_p: 0.05,
                repeat_penalty: 1.1,
                n_ctx: 4096,
                threads: 0,
                n_gpu_layers: 28,
                n_batch: 256,
                stream: false,
                seed: 1234,
            },
            ConfigProfile::Deterministic => GenerationConfig {
                max_tokens: 256,
                temperature: 0.01,
                top_p: 0.9,
                top_k: 0,
                min_p: 0.0,
                repeat_penalty: 1.2,
                n_ctx: 2048,
                threads: 8,
                n_gpu_layers: 50,
                n_batch: 512,
                stream: false,
                seed: 0,
            },
            ConfigProfile::Speed => GenerationConfig {
                max_tokens: 128,
                temperature: 0.1,
                top_p: 0.9,
                top_k: 40,
                min_p: 0.0,
                repeat_penalty: 1.0,
                n_ctx: 512,
                threads: 6,
                n_gpu_layers: 24,
                n_batch: 8,
                stream: true,
                seed: 1234,
            },
            ConfigProfile::Quality => GenerationConfig {
                max_tokens: 256,
                temperature: 0.7,
                top_p: 0.95,
                top_k: 50,
                min_p: 0.0,
                repeat_penalty: 1.1,
                n_ctx: 1024,
                threads: 0,
                n_gpu_layers: 20,
                n_batch: 1,
                stream: true,
                seed: 1234,
            },
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ConfigProfile::Balanced => "balanced",
            ConfigProfile::Deterministic => "deterministic",
            ConfigProfile::Speed => "speed",
            ConfigProfile::Quality => "quality",
        }
    }
}


/// A loaded text-generation engine. Implementations must tolerate concurrent
/// calls; the handler decides how many are actually let through at once.
#[async_trait::async_trait]
pub trait LlmBackend: Send + Sync + 'static {
    async fn generate(&self, prompt: &str, cfg: &GenerationConfig) -> Result<String>;

    /// False while a lazily constructed backend has not been loaded yet.
    fn is_loaded(&self) -> bool {
        true
    }
}

#[async_trait::async_trait]
impl<B: LlmBackend + ?Sized> LlmBackend for std::sync::Arc<B> {
    async fn generate(&self, prompt: &str, cfg: &GenerationConfig) -> Result<String> {
        (**self).generate(prompt, cfg).await
    }

    fn is_loaded(&self) -> bool {
        (**self).is_loaded()
    }
}


pub mod lazy;
pub mod llama;
