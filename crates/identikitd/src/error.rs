//! HTTP error types.
//!
//! Backend routes answer failures as `{"status": "failure", "error": ...}`;
//! proxy routes answer `{"error": ...}`.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use identikit_core::dataurl::DataUrlError;
use serde_json::json;
use thiserror::Error;

use crate::engine::EngineError;
use crate::store::StoreError;

/// Recognition backend error.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("{0}")]
    BadRequest(String),

    /// Resource not found (404)
    #[error("{0}")]
    NotFound(String),

    /// Image decoded but no face in it (422)
    #[error("No face detected")]
    NoFace,

    /// Internal server error (500)
    #[error("{0}")]
    Internal(String),
}

impl From<DataUrlError> for ApiError {
    fn from(err: DataUrlError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(err: JsonRejection) -> Self {
        ApiError::BadRequest(format!("Invalid JSON body: {}", err.body_text()))
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NoFaceDetected => ApiError::NoFace,
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::NoFace => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({
            "status": "failure",
            "error": self.to_string(),
        }));
        (status, body).into_response()
    }
}

/// Result type for backend handlers
pub type ApiResult<T> = Result<T, ApiError>;

/// Proxy route error.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Request could not be reshaped (400)
    #[error("{0}")]
    BadRequest(String),

    /// Backend answered but without a usable result (404)
    #[error("{0}")]
    NotFound(String),

    /// Backend answered with a non-success status; relayed as-is
    #[error("{message}")]
    Upstream { status: StatusCode, message: String },

    /// Backend unreachable or its reply unreadable (502)
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for ProxyError {
    fn from(err: reqwest::Error) -> Self {
        ProxyError::Unavailable(err.to_string())
    }
}

impl From<JsonRejection> for ProxyError {
    fn from(err: JsonRejection) -> Self {
        ProxyError::BadRequest(format!("Invalid JSON body: {}", err.body_text()))
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = match &self {
            ProxyError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::NotFound(_) => StatusCode::NOT_FOUND,
            ProxyError::Upstream { status, .. } => *status,
            ProxyError::Unavailable(msg) => {
                tracing::warn!(error = %msg, "backend unavailable");
                StatusCode::BAD_GATEWAY
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
