use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlogError {
    /// Rejected before the backend is ever touched.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("generation failed: {0}")]
    BackendFailure(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("export failed: {0}")]
    Export(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BlogError {
    pub fn kind(&self) -> &'static str {
        match self {
            BlogError::InvalidInput(_) => "invalid_input",
            BlogError::BackendFailure(_) => "backend_failure",
            BlogError::Configuration(_) => "configuration_error",
            BlogError::Export(_) | BlogError::Io(_) => "export_error",
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        BlogError::InvalidInput(msg.into())
    }
}

/// Malformed bodies, wrong content types and shape mismatches are the caller's fault.
impl From<JsonRejection> for BlogError {
    fn from(rejection: JsonRejection) -> Self {
        BlogError::InvalidInput(rejection.body_text())
    }
}

impl IntoResponse for BlogError {
    fn into_response(self) -> Response {
        let status = match self {
            BlogError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            BlogError::BackendFailure(_) => StatusCode::BAD_GATEWAY,
            BlogError::Configuration(_) | BlogError::Export(_) | BlogError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = json!({
            "error": self.to_string(),
            "kind": self.kind(),
        });

        (status, Json(body)).into_response()
    }
}
