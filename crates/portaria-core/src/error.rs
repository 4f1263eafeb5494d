//! Error types for `portaria-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown direction: {0:?}")]
  UnknownDirection(String),

  #[error("unknown period: {0:?}")]
  UnknownPeriod(String),

  #[error("unknown log status: {0:?}")]
  UnknownLogStatus(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
