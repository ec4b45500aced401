use super::{GenerationConfig, LlmBackend};
use anyhow::{anyhow, Result};
use encoding_rs::{CoderResult, Decoder};
use std::ops::Range;
use std::path::PathBuf;

/// Split `n_tokens` prompt tokens into consecutive ranges of at most `n_batch`.
/// llama.cpp aborts the process when a single decode exceeds the context's batch size.
pub fn prefill_chunks(n_tokens: usize, n_batch: usize) -> Vec<Range<usize>> {
    let step = n_batch.max(1);
    (0..n_tokens)
        .step_by(step)
        .map(|start| start..(start + step).min(n_tokens))
        .collect()
}

/// Decode one token's bytes, carrying incomplete UTF-8 sequences over to the
/// next call. Pass `last = true` once after the final token to flush.
pub fn decode_piece(decoder: &mut Decoder, bytes: &[u8], last: bool) -> Result<String> {
    let cap = decoder
        .max_utf8_buffer_length(bytes.len())
        .ok_or_else(|| anyhow!("token of {} bytes overflows the decode buffer", bytes.len()))?;
    let mut out = String::with_capacity(cap);
    let (result, read, _) = decoder.decode_to_string(bytes, &mut out, last);
    match result {
        CoderResult::InputEmpty if read == bytes.len() => Ok(out),
        CoderResult::InputEmpty => Err(anyhow!("decoded {read} of {} token bytes", bytes.len())),
        CoderResult::OutputFull => Err(anyhow!(
            "decode buffer full after {read} of {} token bytes",
            bytes.len()
        )),
    }
}

// Built without llama.cpp: every call is a reported generation failure.
#[cfg(not(feature = "llama"))]
#[derive(Clone)]
pub struct LlamaBackend {
    model_path: PathBuf,
}

#[cfg(not(feature = "llama"))]
impl LlamaBackend {
    pub fn new(model_path: PathBuf, cfg: &GenerationConfig) -> Result<Self> {
        tracing::warn!(
            model = %model_path.display(),
            n_gpu_layers = cfg.n_gpu_layers,
            "built without the `llama` feature; generation requests will fail"
        );
        Ok(Self { model_path })
    }
}

#[cfg(not(feature = "llama"))]
#[async_trait::async_trait]
impl LlmBackend for LlamaBackend {
    async fn generate(&self, _prompt: &str, _cfg: &GenerationConfig) -> Result<String> {
        Err(anyhow!(
            "built without the `llama` feature; cannot run model {}",
            self.model_path.display()
        ))
    }
}

// Real llama.cpp backend using `llama-cpp-2` (enabled with feature `llama`).
#[cfg(feature = "llama")]
mod real_backend {
    use super::*;
    use anyhow::Context;
    use llama_cpp_2::context::params::LlamaContextParams;
    use llama_cpp_2::llama_backend::LlamaBackend as LLBackend;
    use llama_cpp_2::llama_batch::LlamaBatch;
    use llama_cpp_2::model::params::LlamaModelParams;
    use llama_cpp_2::model::{AddBos, LlamaModel, Special};
    use llama_cpp_2::sampling::LlamaSampler;
    use llama_cpp_2::{ggml_time_us, send_logs_to_tracing, LogOptions};
    use std::num::NonZeroU32;
    use std::sync::Arc;
    use std::time::Duration;

    pub struct Inner {
        backend: LLBackend,
        model: LlamaModel,
    }

    #[derive(Clone)]
    pub struct LlamaBackend {
        inner: Arc<Inner>,
    }

    impl LlamaBackend {
        pub fn new(model_path: PathBuf, cfg: &GenerationConfig) -> Result<Self> {
            // route llama.cpp logs to tracing so they appear in server logs when RUST_LOG is set
            send_logs_to_tracing(LogOptions::default());

            let backend = LLBackend::init().context("init llama backend")?;

            let mut model_params = LlamaModelParams::default();
            if cfg.n_gpu_layers > 0 {
                model_params = model_params.with_n_gpu_layers(cfg.n_gpu_layers);
            }

            let model = LlamaModel::load_from_file(&backend, &model_path, &model_params)
                .with_context(|| format!("load GGUF model {}", model_path.display()))?;
            tracing::info!(
                model = %model_path.display(),
                n_gpu_layers = cfg.n_gpu_layers,
                "model loaded"
            );

            Ok(Self {
                inner: Arc::new(Inner { backend, model }),
            })
        }
    }

    impl Inner {
        fn sampler(&self, p: &GenerationConfig) -> LlamaSampler {
            let mut samplers: Vec<LlamaSampler> =
                vec![LlamaSampler::penalties(64, p.repeat_penalty, 0.0, 0.0)];
            if p.temperature <= 0.0 {
                samplers.push(LlamaSampler::greedy());
                return LlamaSampler::chain_simple(samplers);
            }
            if p.top_k > 0 {
                samplers.push(LlamaSampler::top_k(p.top_k as i32));
            }
            samplers.push(LlamaSampler::top_p(p.top_p, 1));
            if p.min_p > 0.0 {
                samplers.push(LlamaSampler::min_p(p.min_p, 1));
            }
            samplers.push(LlamaSampler::temp(p.temperature));
            samplers.push(LlamaSampler::dist(p.seed));
            LlamaSampler::chain_simple(samplers)
        }

        fn run(&self, prompt_text: &str, p: &GenerationConfig) -> Result<String> {
            p.check_ranges()?;
            let n_ctx =
                NonZeroU32::new(p.n_ctx).ok_or_else(|| anyhow!("n_ctx must be non-zero"))?;
            let threads = p.resolved_threads() as i32;

            // Fresh context per request: the model is shared, the KV cache is not.
            let ctx_params = LlamaContextParams::default()
                .with_n_ctx(Some(n_ctx))
                .with_n_batch(p.n_batch)
                .with_n_threads(threads)
                .with_n_threads_batch(threads);

            let mut ctx = self
                .model
                .new_context(&self.backend, ctx_params)
                .context("create llama context")?;

            let tokens_list = self
                .model
                .str_to_token(prompt_text, AddBos::Always)
                .context("tokenize prompt")?;
            if tokens_list.is_empty() {
                return Err(anyhow!("prompt produced no tokens"));
            }

            // Safety margin: ensure we don't exceed context window
            let n_ctx = ctx.n_ctx() as i32;
            let max_new =
                (p.max_tokens as i32).min((n_ctx - 8).saturating_sub(tokens_list.len() as i32));
            if max_new <= 0 {
                return Err(anyhow!("prompt too long for context"));
            }

            // Prefill in slices no larger than n_batch; logits only for the final token.
            let n_batch = ctx.n_batch() as usize;
            let mut batch = LlamaBatch::new(n_batch, 1);
            let last_index = tokens_list.len() - 1;
            for range in prefill_chunks(tokens_list.len(), n_batch) {
                batch.clear();
                for (i, &token) in range.clone().zip(&tokens_list[range]) {
                    batch.add(token, i as i32, &[0], i == last_index)?;
                }
                ctx.decode(&mut batch).context("decode prompt")?;
            }

            let mut sampler = self.sampler(p);

            let mut n_cur = tokens_list.len() as i32;
            let mut n_decode = 0;
            let t_main_start = ggml_time_us();

            let mut out = String::new();
            let mut decoder = encoding_rs::UTF_8.new_decoder();

            while n_decode < max_new {
                let token = sampler.sample(&ctx, batch.n_tokens() - 1);
                sampler.accept(token);

                if self.model.is_eog_token(token) {
                    break;
                }

                let output_bytes = self.model.token_to_bytes(token, Special::Tokenize)?;
                let piece = decode_piece(&mut decoder, &output_bytes, false)?;
                if p.stream {
                    tracing::trace!(target: "blogbot::stream", token = %piece);
                }
                out.push_str(&piece);

                batch.clear();
                batch.add(token, n_cur, &[0], true)?;
                n_cur += 1;
                ctx.decode(&mut batch).context("decode step")?;
                n_decode += 1;
            }
            out.push_str(&decode_piece(&mut decoder, &[], true)?);

            let duration = Duration::from_micros((ggml_time_us() - t_main_start) as u64);
            tracing::debug!(
                tokens = n_decode,
                ms = duration.as_millis() as u64,
                "generation finished"
            );

            Ok(out.trim().to_string())
        }
    }

    #[async_trait::async_trait]
    impl LlmBackend for LlamaBackend {
        async fn generate(&self, prompt: &str, p: &GenerationConfig) -> Result<String> {
            let inner = self.inner.clone();
            let prompt = prompt.to_string();
            let p = p.clone();
            tokio::task::spawn_blocking(move || inner.run(&prompt, &p))
                .await
                .map_err(|e| anyhow!("inference task failed: {e}"))?
        }
    }

    pub use LlamaBackend as RealLlamaBackend;
}

#[cfg(feature = "llama")]
pub use real_backend::RealLlamaBackend as LlamaBackend;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefill_never_exceeds_batch() {
        assert_eq!(prefill_chunks(20, 8), vec![0..8, 8..16, 16..20]);
        assert_eq!(prefill_chunks(3, 1), vec![0..1, 1..2, 2..3]);
        assert_eq!(prefill_chunks(5, 256), vec![0..5]);
        assert_eq!(prefill_chunks(0, 8), Vec::<Range<usize>>::new());
        // n_batch 0 is rejected by check_ranges; still never loops forever
        assert_eq!(prefill_chunks(2, 0), vec![0..1, 1..2]);
    }

    #[test]
    fn long_token_is_decoded_whole() {
        let mut decoder = encoding_rs::UTF_8.new_decoder();
        let token = "-".repeat(32);
        let piece = decode_piece(&mut decoder, token.as_bytes(), false).unwrap();
        assert_eq!(piece, token);
    }

    #[test]
    fn split_multibyte_char_spans_tokens() {
        let mut decoder = encoding_rs::UTF_8.new_decoder();
        let bytes = "é🙂".as_bytes();
        let mut out = String::new();
        out.push_str(&decode_piece(&mut decoder, &bytes[..1], false).unwrap());
        out.push_str(&decode_piece(&mut decoder, &bytes[1..4], false).unwrap());
        out.push_str(&decode_piece(&mut decoder, &bytes[4..], false).unwrap());
        out.push_str(&decode_piece(&mut decoder, &[], true).unwrap());
        assert_eq!(out, "é🙂");
    }

    #[test]
    fn flush_reports_dangling_bytes() {
        let mut decoder = encoding_rs::UTF_8.new_decoder();
        let bytes = "🙂".as_bytes();
        let head = decode_piece(&mut decoder, &bytes[..2], false).unwrap();
        assert!(head.is_empty());
        let tail = decode_piece(&mut decoder, &[], true).unwrap();
        assert_eq!(tail, "\u{FFFD}");
    }

    #[cfg(not(feature = "llama"))]
    #[tokio::test]
    async fn featureless_build_fails_instead_of_inventing_text() {
        let backend =
            LlamaBackend::new(PathBuf::from("models/x.gguf"), &GenerationConfig::default())
                .unwrap();
        let err = backend
            .generate("Write a blog", &GenerationConfig::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("built without the `llama` feature"));
    }
}
