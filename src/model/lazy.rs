//! Construct-on-first-use wrapper around an expensive backend.

use super::{GenerationConfig, LlmBackend};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::OnceCell;

type Loader<B> = Arc<dyn Fn() -> Result<B> + Send + Sync>;

/// Loads the inner backend on the blocking pool the first time it is needed.
/// Concurrent first callers wait on the same load; a failed load leaves the
/// cell empty so the next request tries again.
pub struct LazyBackend<B> {
    cell: OnceCell<B>,
    loader: Loader<B>,
}

impl<B: LlmBackend> LazyBackend<B> {
    pub fn new<F>(loader: F) -> Self
    where
        F: Fn() -> Result<B> + Send + Sync + 'static,
    {
        Self {
            cell: OnceCell::new(),
            loader: Arc::new(loader),
        }
    }

    pub async fn get(&self) -> Result<&B> {
        self.cell
            .get_or_try_init(|| async {
                let loader = self.loader.clone();
                tracing::info!("loading backend on first use");
                tokio::task::spawn_blocking(move || loader())
                    .await
                    .context("backend loader task")?
            })
            .await
    }
}

/// Build the backend now, or wrap `loader` so the first request builds it.
/// Either way `loader` produces at most one live backend.
pub fn build_backend<B, F>(lazy: bool, loader: F) -> Result<Arc<dyn LlmBackend>>
where
    B: LlmBackend,
    F: Fn() -> Result<B> + Send + Sync + 'static,
{
    if lazy {
        Ok(Arc::new(LazyBackend::new(loader)))
    } else {
        Ok(Arc::new(loader()?))
    }
}

#[async_trait::async_trait]
impl<B: LlmBackend> LlmBackend for LazyBackend<B> {
    async fn generate(&self, prompt: &str, cfg: &GenerationConfig) -> Result<String> {
        let backend = self.get().await.context("load model")?;
        backend.generate(prompt, cfg).await
    }

    fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Echo;

    #[async_trait::async_trait]
    impl LlmBackend for Echo {
        async fn generate(&self, prompt: &str, _cfg: &GenerationConfig) -> Result<String> {
            Ok(prompt.to_string())
        }
    }

    #[tokio::test]
    async fn loads_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = loads.clone();
        let lazy = LazyBackend::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Echo)
        });
        assert!(!lazy.is_loaded());
        let cfg = GenerationConfig::default();
        assert_eq!(lazy.generate("a", &cfg).await.unwrap(), "a");
        assert_eq!(lazy.generate("b", &cfg).await.unwrap(), "b");
        assert!(lazy.is_loaded());
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_load_is_an_error_and_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let lazy: LazyBackend<Echo> = LazyBackend::new(move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                anyhow::bail!("model file missing");
            }
            Ok(Echo)
        });
        let cfg = GenerationConfig::default();
        let err = lazy.generate("x", &cfg).await.unwrap_err();
        assert!(format!("{err:#}").contains("model file missing"));
        assert!(!lazy.is_loaded());
        assert_eq!(lazy.generate("x", &cfg).await.unwrap(), "x");
    }

    #[test]
    fn eager_build_runs_loader_immediately() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = loads.clone();
        let backend = build_backend(false, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Echo)
        })
        .unwrap();
        assert!(backend.is_loaded());
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        let err = build_backend::<Echo, _>(false, || Err(anyhow::anyhow!("no such model"))).err();
        assert!(err.unwrap().to_string().contains("no such model"));
    }
}
