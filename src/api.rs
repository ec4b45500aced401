use crate::{
    config::Config,
    error::BlogError,
    export::{self, DEFAULT_EXPORT_NAME},
    handler::BlogHandler,
    model::LlmBackend,
    prompt::PromptTemplate,
    request::AudienceSet,
    util,
    validate::Validator,
};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use http::header;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<BlogHandler>,
    pub export_dir: PathBuf,
    pub template_name: String,
    pub prometheus: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(handler: Arc<BlogHandler>) -> Self {
        Self {
            handler,
            export_dir: PathBuf::from("exports"),
            template_name: "classic".to_string(),
            prometheus: None,
        }
    }

    /// Wire a handler from process configuration around an already built backend.
    pub fn from_config(cfg: &Config, backend: Arc<dyn LlmBackend>) -> anyhow::Result<Self> {
        let (template, template_name) = match &cfg.template_file {
            Some(path) => (
                PromptTemplate::parse(&util::read_template(path)?)?,
                path.display().to_string(),
            ),
            None => (cfg.template.template()?, cfg.template.name().to_string()),
        };
        let audiences = AudienceSet::new(&cfg.audiences)?;
        let validator =
            Validator::new(audiences)?.with_limits(cfg.max_topic_chars, cfg.max_word_count);
        let handler = BlogHandler::new(backend, validator, template, cfg.generation_config())?
            .with_max_concurrent(cfg.max_concurrent_generations);

        Ok(Self {
            handler: Arc::new(handler),
            export_dir: cfg.export_dir.clone(),
            template_name,
            prometheus: None,
        })
    }
}

#[derive(Deserialize)]
pub struct ExportReq {
    pub file_name: String,
    pub text: String,
}

#[derive(Deserialize)]
pub struct DownloadReq {
    pub text: String,
    #[serde(default)]
    pub file_name: Option<String>,
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/blog", post(generate_blog))
        .route("/v1/blog/export", post(export_blog))
        .route("/v1/blog/download", post(download_blog))
        .route("/v1/audiences", get(audiences))
        .route("/v1/stats", get(stats))
        .route("/health", get(health))
        .route("/metrics", get(prometheus))
        .with_state(state)
}

async fn generate_blog(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => return state.handler.reject(rejection.into()).into_response(),
    };
    match state.handler.handle_json(&body).await {
        Ok(result) if result.is_success() => Json(result).into_response(),
        Ok(result) => {
            let body = json!({
                "error": result.error().unwrap_or("generation failed"),
                "kind": "backend_failure",
            });
            (StatusCode::BAD_GATEWAY, Json(body)).into_response()
        }
        Err(e) => e.into_response(),
    }
}

async fn export_blog(
    State(state): State<AppState>,
    req: Result<Json<ExportReq>, JsonRejection>,
) -> Result<Json<Value>, BlogError> {
    let Json(req) = req?;
    let path = export::export_text(&state.export_dir, &req.file_name, &req.text).await?;
    Ok(Json(json!({
        "path": path.display().to_string(),
        "bytes": req.text.len(),
    })))
}

async fn download_blog(
    req: Result<Json<DownloadReq>, JsonRejection>,
) -> Result<Response, BlogError> {
    let Json(req) = req?;
    let name =
        export::sanitize_file_name(req.file_name.as_deref().unwrap_or(DEFAULT_EXPORT_NAME))?;
    let headers = [
        (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{name}\""),
        ),
    ];
    Ok((headers, Bytes::from(req.text)).into_response())
}

async fn audiences(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "audiences": state.handler.validator().audiences().labels(),
        "template": state.template_name,
    }))
}

async fn stats(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "requests": state.handler.stats(),
        "max_concurrent_generations": state.handler.max_concurrent(),
        "config": state.handler.config(),
    }))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "backend_loaded": state.handler.backend_loaded(),
    }))
}

async fn prometheus(State(state): State<AppState>) -> Response {
    match &state.prometheus {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}
