use blogbot::api::{self, AppState};
use blogbot::config::Config;
use blogbot::model::lazy;
use blogbot::model::llama::LlamaBackend;
use blogbot::stats;
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let cfg = <Config as clap::Parser>::parse();

    // logs
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let gen_cfg = cfg.generation_config();
    tracing::info!(profile = cfg.profile.name(), config = ?gen_cfg, "generation config");

    // llama backend, built exactly once
    let model_path = PathBuf::from(&cfg.model_path);
    let load_cfg = gen_cfg.clone();
    let backend = lazy::build_backend(cfg.lazy_load, move || {
        LlamaBackend::new(model_path.clone(), &load_cfg)
    })?;

    let mut state = AppState::from_config(&cfg, backend)?;
    state.prometheus = Some(stats::prometheus_handle()?);
    tracing::info!(
        template = %state.template_name,
        audiences = ?cfg.audiences,
        max_concurrent = cfg.max_concurrent_generations,
        "handler ready"
    );

    let app = api::routes(state);
    let addr: SocketAddr = cfg.bind_addr.parse()?;

    tracing::info!(%addr, "listening");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
