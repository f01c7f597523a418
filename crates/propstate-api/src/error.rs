//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("timed out: {0}")]
  Timeout(String),

  /// The request was well-formed but touches data that cannot be opened.
  #[error("unprocessable: {0}")]
  Unprocessable(String),

  #[error("internal error: {0}")]
  Internal(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<propstate_engine::Error> for ApiError {
  fn from(err: propstate_engine::Error) -> Self {
    use propstate_engine::Error as E;
    match err {
      E::Validation(m) => Self::BadRequest(m),
      E::NotFound(id) => Self::NotFound(format!("property {id} not found")),
      e @ E::ConcurrentUpdate { .. } => Self::Conflict(e.to_string()),
      e @ E::Timeout { .. } => Self::Timeout(e.to_string()),
      e @ E::Decryption(_) => Self::Unprocessable(e.to_string()),
      e @ E::Codec(_) => Self::Internal(e.to_string()),
      E::Store(e) => Self::Store(e),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::Timeout(m) => (StatusCode::GATEWAY_TIMEOUT, m.clone()),
      ApiError::Unprocessable(m) => (StatusCode::UNPROCESSABLE_ENTITY, m.clone()),
      ApiError::Internal(m) => {
        tracing::error!(error = %m, "internal error");
        (StatusCode::INTERNAL_SERVER_ERROR, m.clone())
      }
      ApiError::Store(e) => {
        tracing::error!(error = %e, "store unavailable");
        (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
      }
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
