use axum::{body::Body, http, response::Response, Router};
use blogbot::api::{routes, AppState};
use blogbot::config::Config;
use blogbot::model::{lazy, GenerationConfig, LlmBackend};
use blogbot::prompt::TemplatePreset;
use blogbot::stats;
use blogbot::validate::Validator;
use blogbot::{AudienceSet, BlogHandler};
use clap::Parser;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::util::ServiceExt;

#[derive(Default)]
struct FakeBackend {
    calls: AtomicUsize,
}

#[async_trait::async_trait]
impl LlmBackend for FakeBackend {
    async fn generate(&self, prompt: &str, _p: &GenerationConfig) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Simulate a backend error for a specific topic to exercise error handling
        if prompt.contains("meltdown") {
            anyhow::bail!("CUDA out of memory");
        }
        Ok(format!("ECHO: {prompt}"))
    }
}

fn test_router() -> (Router, Arc<FakeBackend>) {
    let backend = Arc::new(FakeBackend::default());
    let validator = Validator::new(AudienceSet::default()).unwrap();
    let handler = BlogHandler::new(
        backend.clone(),
        validator,
        TemplatePreset::Classic.template().unwrap(),
        GenerationConfig::default(),
    )
    .unwrap();
    (routes(AppState::new(Arc::new(handler))), backend)
}

fn post_json(uri: &str, body: Value) -> http::Request<Body> {
    http::Request::builder()
        .method(http::Method::POST)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

fn post_raw(uri: &str, content_type: Option<&str>, body: &'static str) -> http::Request<Body> {
    let mut builder = http::Request::builder().method(http::Method::POST).uri(uri);
    if let Some(ct) = content_type {
        builder = builder.header(http::header::CONTENT_TYPE, ct);
    }
    builder.body(Body::from(body)).unwrap()
}

fn get(uri: &str) -> http::Request<Body> {
    http::Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(res: Response) -> Value {
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn blog_ok_echoes_all_three_fields() {
    let (app, backend) = test_router();
    let req = post_json(
        "/v1/blog",
        json!({"topic": "climate change", "word_count": 200, "audience": "Researchers"}),
    );

    let res: Response = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), http::StatusCode::OK);
    let v = body_json(res).await;
    let text = v["text"].as_str().unwrap();
    assert!(text.contains("climate change"));
    assert!(text.contains("200"));
    assert!(text.contains("Researchers"));
    assert!(v["elapsed_seconds"].as_f64().unwrap() >= 0.0);
    assert!(v.get("error").is_none());
    assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn word_count_as_text_is_accepted() {
    let (app, _) = test_router();
    let req = post_json(
        "/v1/blog",
        json!({"topic": "Rust", "word_count": " 300 ", "audience": "common people"}),
    );
    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), http::StatusCode::OK);
    let v = body_json(res).await;
    let text = v["text"].as_str().unwrap();
    assert!(text.contains("for Common People about Rust within 300 words"));
}

#[tokio::test]
async fn empty_topic_is_bad_request() {
    let (app, backend) = test_router();
    let req = post_json(
        "/v1/blog",
        json!({"topic": "", "word_count": 200, "audience": "Researchers"}),
    );
    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), http::StatusCode::BAD_REQUEST);
    let v = body_json(res).await;
    assert_eq!(v["kind"], "invalid_input");
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn non_numeric_word_count_is_bad_request() {
    let (app, backend) = test_router();
    let req = post_json(
        "/v1/blog",
        json!({"topic": "AI", "word_count": "abc", "audience": "Common People"}),
    );
    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), http::StatusCode::BAD_REQUEST);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_audience_is_bad_request() {
    let (app, _) = test_router();
    let req = post_json(
        "/v1/blog",
        json!({"topic": "AI", "word_count": 100, "audience": "Astronauts"}),
    );
    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), http::StatusCode::BAD_REQUEST);
    let v = body_json(res).await;
    assert!(v["error"].as_str().unwrap().contains("Astronauts"));
}

#[tokio::test]
async fn missing_field_is_bad_request() {
    let (app, _) = test_router();
    let req = post_json("/v1/blog", json!({"topic": "AI", "audience": "Researchers"}));
    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), http::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn backend_error_is_reported_and_server_keeps_serving() {
    let (app, backend) = test_router();
    let req = post_json(
        "/v1/blog",
        json!({"topic": "reactor meltdown", "word_count": 50, "audience": "Researchers"}),
    );
    let res = app.clone().oneshot(req).await.unwrap();
    assert_eq!(res.status(), http::StatusCode::BAD_GATEWAY);
    let v = body_json(res).await;
    assert_eq!(v["kind"], "backend_failure");
    assert!(v["error"].as_str().unwrap().contains("CUDA out of memory"));
    assert!(v.get("text").is_none());

    // the same router still answers
    let req = post_json(
        "/v1/blog",
        json!({"topic": "gardening", "word_count": 50, "audience": "Researchers"}),
    );
    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), http::StatusCode::OK);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn stats_track_outcomes() {
    let (app, _) = test_router();
    for body in [
        json!({"topic": "a", "word_count": 10, "audience": "Researchers"}),
        json!({"topic": "", "word_count": 10, "audience": "Researchers"}),
        json!({"topic": "meltdown", "word_count": 10, "audience": "Researchers"}),
    ] {
        app.clone().oneshot(post_json("/v1/blog", body)).await.unwrap();
    }
    let res = app.oneshot(get("/v1/stats")).await.unwrap();
    assert_eq!(res.status(), http::StatusCode::OK);
    let v = body_json(res).await;
    assert_eq!(v["requests"]["success"], 1);
    assert_eq!(v["requests"]["invalid_input"], 1);
    assert_eq!(v["requests"]["backend_failure"], 1);
    assert_eq!(v["max_concurrent_generations"], 1);
}

#[tokio::test]
async fn download_returns_plain_text_attachment() {
    let (app, _) = test_router();
    let text = "# Title\n<script>alert(1)</script>\n";
    let res = app
        .oneshot(post_json("/v1/blog/download", json!({"text": text})))
        .await
        .unwrap();
    assert_eq!(res.status(), http::StatusCode::OK);
    assert_eq!(
        res.headers()[http::header::CONTENT_TYPE],
        "text/plain; charset=utf-8"
    );
    assert_eq!(
        res.headers()[http::header::CONTENT_DISPOSITION],
        "attachment; filename=\"generated_blog.txt\""
    );
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], text.as_bytes());
}

#[tokio::test]
async fn download_rejects_path_in_file_name() {
    let (app, _) = test_router();
    let res = app
        .oneshot(post_json(
            "/v1/blog/download",
            json!({"text": "x", "file_name": "../../etc/passwd"}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), http::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn export_writes_into_export_dir() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = Config::try_parse_from([
        "blogbot",
        "--export-dir",
        dir.path().to_str().unwrap(),
        "--template",
        "concise",
    ])
    .unwrap();
    let state = AppState::from_config(&cfg, Arc::new(FakeBackend::default())).unwrap();
    let app = routes(state);

    let res = app
        .oneshot(post_json(
            "/v1/blog/export",
            json!({"file_name": "my_post", "text": "hello\nworld"}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), http::StatusCode::OK);
    let v = body_json(res).await;
    assert_eq!(v["bytes"], 11);
    let written = std::fs::read_to_string(dir.path().join("my_post.txt")).unwrap();
    assert_eq!(written, "hello\nworld");
}

#[tokio::test]
async fn audiences_and_health() {
    let (app, _) = test_router();
    let res = app.clone().oneshot(get("/v1/audiences")).await.unwrap();
    let v = body_json(res).await;
    assert_eq!(v["audiences"].as_array().unwrap().len(), 4);
    assert_eq!(v["template"], "classic");

    let res = app.clone().oneshot(get("/health")).await.unwrap();
    let v = body_json(res).await;
    assert_eq!(v["status"], "ok");
    assert_eq!(v["backend_loaded"], true);

    let res = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(res.status(), http::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_json_is_bad_request_with_kind() {
    let (app, backend) = test_router();
    for uri in ["/v1/blog", "/v1/blog/export", "/v1/blog/download"] {
        let res = app
            .clone()
            .oneshot(post_raw(uri, Some("application/json"), "{\"topic\": "))
            .await
            .unwrap();
        assert_eq!(res.status(), http::StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(
            res.headers()[http::header::CONTENT_TYPE],
            "application/json",
            "{uri}"
        );
        let v = body_json(res).await;
        assert_eq!(v["kind"], "invalid_input", "{uri}");
        assert!(v["error"].as_str().unwrap().starts_with("invalid input"));
    }
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);

    let res = app.oneshot(get("/v1/stats")).await.unwrap();
    let v = body_json(res).await;
    assert_eq!(v["requests"]["invalid_input"], 1);
}

#[tokio::test]
async fn missing_content_type_is_bad_request() {
    let (app, backend) = test_router();
    let body = r#"{"topic": "AI", "word_count": 100, "audience": "Researchers"}"#;
    let res = app.oneshot(post_raw("/v1/blog", None, body)).await.unwrap();
    assert_eq!(res.status(), http::StatusCode::BAD_REQUEST);
    let v = body_json(res).await;
    assert_eq!(v["kind"], "invalid_input");
    assert!(v["error"].as_str().unwrap().contains("Content-Type"));
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn metrics_are_rendered_once_recorder_is_installed() {
    let backend = Arc::new(FakeBackend::default());
    let handler = BlogHandler::new(
        backend,
        Validator::new(AudienceSet::default()).unwrap(),
        TemplatePreset::Classic.template().unwrap(),
        GenerationConfig::default(),
    )
    .unwrap();
    let mut state = AppState::new(Arc::new(handler));
    state.prometheus = Some(stats::prometheus_handle().unwrap());
    let app = routes(state);

    let res = app
        .clone()
        .oneshot(post_json(
            "/v1/blog",
            json!({"topic": "wasps", "word_count": 80, "audience": "Researchers"}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), http::StatusCode::OK);

    let res = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(res.status(), http::StatusCode::OK);
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("blogbot_requests_total{outcome=\"success\"}"), "{text}");
    assert!(text.contains("blogbot_generation_seconds"), "{text}");
}

#[tokio::test]
async fn lazy_backend_loads_on_first_generation() {
    let cfg = Config::try_parse_from(["blogbot", "--lazy-load"]).unwrap();
    let loads = Arc::new(AtomicUsize::new(0));
    let counter = loads.clone();
    let backend = lazy::build_backend(cfg.lazy_load, move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(FakeBackend::default())
    })
    .unwrap();
    let app = routes(AppState::from_config(&cfg, backend).unwrap());

    let res = app.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(body_json(res).await["backend_loaded"], false);
    assert_eq!(loads.load(Ordering::SeqCst), 0);

    // rejected input does not trigger a load
    let res = app
        .clone()
        .oneshot(post_json(
            "/v1/blog",
            json!({"topic": "", "word_count": 80, "audience": "Researchers"}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), http::StatusCode::BAD_REQUEST);
    assert_eq!(loads.load(Ordering::SeqCst), 0);

    for topic in ["owls", "otters"] {
        let res = app
            .clone()
            .oneshot(post_json(
                "/v1/blog",
                json!({"topic": topic, "word_count": 80, "audience": "Researchers"}),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), http::StatusCode::OK);
    }

    let res = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(body_json(res).await["backend_loaded"], true);
    assert_eq!(loads.load(Ordering::SeqCst), 1);
}
