//! Request handlers
//!
//! Map HTTP requests onto engine calls and engine errors onto status codes.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Extension, Path};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::engine::Engine;
use crate::error::LedgerError;

use super::AppState;

/// API error type mapping to HTTP status codes
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Not Allowed")]
    MethodNotAllowed,
    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, format!("{}\n", self)).into_response()
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::KeyNotFound => ApiError::NotFound(e.to_string()),
            LedgerError::InvalidKey(_) => ApiError::BadRequest(e.to_string()),
            other => {
                tracing::error!(error = %other, "request failed");
                ApiError::Internal(other.to_string())
            }
        }
    }
}

/// Run an engine call on the blocking pool
async fn with_engine<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Engine) -> crate::Result<T> + Send + 'static,
{
    let engine = Arc::clone(&state.engine);
    let result = tokio::task::spawn_blocking(move || f(&engine))
        .await
        .map_err(|e| ApiError::Internal(format!("engine task failed: {}", e)))?;
    Ok(result?)
}

/// Handler for `PUT /v1/{key}`
pub async fn put_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(key): Path<String>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let value = String::from_utf8(body.to_vec())
        .map_err(|_| ApiError::BadRequest("value must be valid UTF-8".to_string()))?;
    let len = value.len();

    let k = key.clone();
    with_engine(&state, move |engine| engine.put(&k, &value)).await?;

    tracing::info!(key = %key, len, "PUT");
    Ok(StatusCode::CREATED)
}

/// Handler for `GET /v1/{key}`
pub async fn get_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<String, ApiError> {
    let k = key.clone();
    let value = with_engine(&state, move |engine| engine.get(&k)).await?;

    tracing::info!(key = %key, "GET");
    Ok(value)
}

/// Handler for `DELETE /v1/{key}`
pub async fn delete_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<StatusCode, ApiError> {
    let k = key.clone();
    with_engine(&state, move |engine| engine.delete(&k)).await?;

    tracing::info!(key = %key, "DELETE");
    Ok(StatusCode::OK)
}

/// Any method not routed above
pub async fn not_allowed_handler() -> ApiError {
    ApiError::MethodNotAllowed
}
