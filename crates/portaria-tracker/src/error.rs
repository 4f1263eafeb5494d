//! Error types for `portaria-tracker`.

use thiserror::Error;

/// A transport-level failure talking to the enrollment endpoints or the
/// audit sink. Business-level outcomes (device error labels, refused starts)
/// are not errors.
#[derive(Debug, Error)]
pub enum Error {
  #[error("request failed: {0}")]
  Http(#[from] reqwest::Error),

  #[error("server answered {0}")]
  Status(reqwest::StatusCode),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
