//! The collaborators an enrollment session talks to.

use std::future::Future;

use portaria_core::action_log::NewActionLog;
use serde::Deserialize;
use serde_json::Value;

use crate::Result;

/// The person whose fingerprint is being enrolled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
  pub user_id:    String,
  pub identifier: String,
  pub name:       Option<String>,
}

/// Synchronous answer to a start request.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StartAck {
  #[serde(default)]
  pub success:    bool,
  #[serde(default)]
  pub error:      Option<String>,
  #[serde(default)]
  pub session_id: Option<String>,
}

/// One answer of the status endpoint.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StatusReport {
  #[serde(default, rename = "etapa")]
  pub step:    String,
  #[serde(default, rename = "mensagem")]
  pub message: Option<String>,
  #[serde(default, rename = "dados")]
  pub data:    Option<Value>,
}

impl StatusReport {
  pub fn step(step: impl Into<String>) -> Self {
    Self { step: step.into(), ..Default::default() }
  }
}

/// Start, poll, and cancel endpoints of the enrollment integration.
pub trait EnrollmentApi: Send + Sync {
  /// Ask the device to begin enrolling `subject`, reporting progress to
  /// `callback_url` (or the server's own webhook when `None`).
  fn start<'a>(
    &'a self,
    subject: &'a Subject,
    callback_url: Option<&'a str>,
  ) -> impl Future<Output = Result<StartAck>> + Send + 'a;

  fn status<'a>(
    &'a self,
    session_id: Option<&'a str>,
  ) -> impl Future<Output = Result<StatusReport>> + Send + 'a;

  /// Best-effort; callers do not wait on the answer.
  fn cancel(&self) -> impl Future<Output = Result<()>> + Send + '_;
}

/// Append-only audit log.
pub trait AuditSink: Send + Sync {
  fn record(&self, entry: NewActionLog) -> impl Future<Output = Result<()>> + Send + '_;
}
