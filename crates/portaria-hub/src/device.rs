//! HTTP client for the turnstile controller.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeviceError {
  #[error("turnstile unreachable: {0}")]
  Transport(#[from] reqwest::Error),
  #[error("turnstile answered {0}")]
  Status(reqwest::StatusCode),
  #[error("turnstile refused: {0}")]
  Rejected(String),
}

/// Body of `POST /api/catraca/iniciar-cadastro` on the device.
#[derive(Debug, Clone, Serialize)]
pub struct StartEnrollment {
  pub user_id:     String,
  #[serde(rename = "identificador")]
  pub identifier:  String,
  #[serde(rename = "nome")]
  pub name:        Option<String>,
  pub webhook_url: String,
  pub session_id:  String,
}

#[derive(Debug, Deserialize)]
struct Ack {
  #[serde(default)]
  success: bool,
  #[serde(default)]
  message: Option<String>,
}

/// The device's own view of its state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceStatus {
  #[serde(default, rename = "modo")]
  pub mode:            Option<String>,
  #[serde(default)]
  pub sensor_status:   Option<String>,
  #[serde(default, rename = "cadastro_ativo")]
  pub enrollment_open: Option<bool>,
}

/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct DeviceClient {
  client:   Client,
  base_url: String,
}

impl DeviceClient {
  pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
    let client = Client::builder().timeout(timeout).build()?;
    Ok(Self { client, base_url: base_url.into() })
  }

  fn url(&self, path: &str) -> String {
    format!("{}{}", self.base_url.trim_end_matches('/'), path)
  }

  /// `POST /api/catraca/iniciar-cadastro`
  pub async fn start_enrollment(&self, request: &StartEnrollment) -> Result<(), DeviceError> {
    let resp = self
      .client
      .post(self.url("/api/catraca/iniciar-cadastro"))
      .json(request)
      .send()
      .await?;

    if !resp.status().is_success() {
      return Err(DeviceError::Status(resp.status()));
    }
    let ack: Ack = resp.json().await?;
    if !ack.success {
      return Err(DeviceError::Rejected(
        ack.message.unwrap_or_else(|| "enrollment not started".to_owned()),
      ));
    }
    Ok(())
  }

  /// `GET /api/catraca/status`
  pub async fn status(&self) -> Result<DeviceStatus, DeviceError> {
    let resp = self.client.get(self.url("/api/catraca/status")).send().await?;
    if !resp.status().is_success() {
      return Err(DeviceError::Status(resp.status()));
    }
    Ok(resp.json().await?)
  }

  /// `POST /api/cancelar-cadastro`
  pub async fn cancel_enrollment(&self) -> Result<(), DeviceError> {
    let resp = self.client.post(self.url("/api/cancelar-cadastro")).send().await?;
    if !resp.status().is_success() {
      return Err(DeviceError::Status(resp.status()));
    }
    Ok(())
  }
}
