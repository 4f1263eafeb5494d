//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an HTTP handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("bad request: {0}")]
  BadRequest(String),

  /// The turnstile device refused or could not be reached.
  #[error("device error: {0}")]
  Device(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  pub fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(e))
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = match &self {
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::Device(_) => StatusCode::BAD_GATEWAY,
      ApiError::Store(e) => {
        tracing::error!(error = %e, "store failure");
        StatusCode::INTERNAL_SERVER_ERROR
      }
    };
    let message = match self {
      ApiError::BadRequest(m) | ApiError::Device(m) => m,
      ApiError::Store(e) => e.to_string(),
    };
    (status, Json(json!({ "success": false, "error": message }))).into_response()
  }
}

/// Startup failures of the server library.
#[derive(Debug, Error)]
pub enum Error {
  #[error("http client error: {0}")]
  Http(#[from] reqwest::Error),
}
