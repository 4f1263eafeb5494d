//! Action-log records: the append-only audit trail of administrative actions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Action code written when a biometric enrollment reaches a terminal state.
pub const ENROLL_BIOMETRY: &str = "CADASTRAR_BIOMETRIA";

/// Action code written when the server hands an enrollment to the device.
pub const START_BIOMETRY_ENROLLMENT: &str = "INICIAR_CADASTRO_BIOMETRIA";

/// Outcome recorded alongside an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogStatus {
  Success,
  Error,
  Started,
}

impl LogStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Success => "SUCCESS",
      Self::Error => "ERROR",
      Self::Started => "STARTED",
    }
  }

  pub fn parse(s: &str) -> crate::Result<Self> {
    match s {
      "SUCCESS" => Ok(Self::Success),
      "ERROR" => Ok(Self::Error),
      "STARTED" => Ok(Self::Started),
      other => Err(crate::Error::UnknownLogStatus(other.to_owned())),
    }
  }
}

/// Input to [`crate::store::RecordStore::append_action_log`]; also the body
/// the enrollment tracker posts to the audit sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewActionLog {
  pub subject_id:   Option<String>,
  pub identifier:   Option<String>,
  pub action:       String,
  pub status:       LogStatus,
  pub details:      Option<String>,
  pub subject_name: Option<String>,
}

/// A persisted action-log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionLog {
  pub id:           Uuid,
  pub subject_id:   Option<String>,
  pub identifier:   Option<String>,
  pub action:       String,
  pub status:       LogStatus,
  pub details:      Option<String>,
  pub subject_name: Option<String>,
  pub recorded_at:  DateTime<Utc>,
}
