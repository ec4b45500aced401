use crate::model::{ConfigProfile, GenerationConfig};
use crate::prompt::TemplatePreset;
use crate::request::DEFAULT_AUDIENCES;
use crate::validate::{DEFAULT_MAX_TOPIC_CHARS, DEFAULT_MAX_WORD_COUNT};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "blogbot", about = "Blog post generator backed by a local llama.cpp model")]
pub struct Config {
    #[arg(long, env, default_value = "0.0.0.0:8080")]
    pub bind_addr: String,
    #[arg(long = "MODEL_PATH", env = "MODEL_PATH", default_value = "models/llama-2-7b.Q8_0.gguf")]
    pub model_path: String,
    /// Load the model on the first request instead of at startup.
    #[arg(long, env, default_value_t = false)]
    pub lazy_load: bool,
    #[arg(long, env, default_value_t = 1)]
    pub max_concurrent_generations: usize,

    #[arg(long, env = "PROMPT_TEMPLATE", value_enum, default_value_t = TemplatePreset::Classic)]
    pub template: TemplatePreset,
    /// Custom template; takes precedence over `--template`.
    #[arg(long, env = "PROMPT_TEMPLATE_FILE")]
    pub template_file: Option<PathBuf>,
    #[arg(
        long,
        env = "BLOG_AUDIENCES",
        value_delimiter = ',',
        default_values_t = DEFAULT_AUDIENCES.map(String::from)
    )]
    pub audiences: Vec<String>,
    #[arg(long, env, default_value_t = DEFAULT_MAX_TOPIC_CHARS)]
    pub max_topic_chars: usize,
    #[arg(long, env, default_value_t = DEFAULT_MAX_WORD_COUNT)]
    pub max_word_count: u32,
    #[arg(long, env, default_value = "exports")]
    pub export_dir: PathBuf,

    #[arg(long, env = "GENERATION_PROFILE", value_enum, default_value_t = ConfigProfile::Balanced)]
    pub profile: ConfigProfile,
    #[arg(long, env)]
    pub max_tokens: Option<u32>,
    #[arg(long, env = "TEMPERATURE")]
    pub temp: Option<f32>,
    #[arg(long, env)]
    pub top_p: Option<f32>,
    #[arg(long, env)]
    pub top_k: Option<u32>,
    #[arg(long, env)]
    pub min_p: Option<f32>,
    #[arg(long, env)]
    pub repeat_penalty: Option<f32>,
    #[arg(long, env)]
    pub n_ctx: Option<u32>,
    /// 0 = one per CPU.
    #[arg(long, env)]
    pub threads: Option<u32>,
    #[arg(long, env)]
    pub n_gpu_layers: Option<u32>,
    #[arg(long, env)]
    pub n_batch: Option<u32>,
    #[arg(long, env)]
    pub stream: Option<bool>,
    #[arg(long, env)]
    pub seed: Option<u32>,
}

impl Config {
    /// Profile values with any explicit overrides applied; `threads = 0` resolved.
    pub fn generation_config(&self) -> GenerationConfig {
        let mut g = self.profile.config();
        if let Some(v) = self.max_tokens {
            g.max_tokens = v;
        }
        if let Some(v) = self.temp {
            g.temperature = v;
        }
        if let Some(v) = self.top_p {
            g.top_p = v;
        }
        if let Some(v) = self.top_k {
            g.top_k = v;
        }
        if let Some(v) = self.min_p {
            g.min_p = v;
        }
        if let Some(v) = self.repeat_penalty {
            g.repeat_penalty = v;
        }
        if let Some(v) = self.n_ctx {
            g.n_ctx = v;
        }
        if let Some(v) = self.threads {
            g.threads = v;
        }
        if let Some(v) = self.n_gpu_layers {
            g.n_gpu_layers = v;
        }
        if let Some(v) = self.n_batch {
            g.n_batch = v;
        }
        if let Some(v) = self.stream {
            g.stream = v;
        }
        if let Some(v) = self.seed {
            g.seed = v;
        }
        g.threads = g.resolved_threads();
        g
    }
}
