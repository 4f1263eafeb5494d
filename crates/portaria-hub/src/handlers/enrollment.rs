//! Biometric enrollment relay between dashboards and the turnstile.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/api/catraca/iniciar-cadastro` | Opens a session and asks the device to start |
//! | `GET`  | `/api/catraca/status` | Device health, never fails |
//! | `POST` | `/api/webhook/biometria` | Step reports from the device |
//! | `GET`  | `/api/biometry` | Latest step, optional `?session_id=` |
//! | `POST` | `/api/cancelar-cadastro` | Cancels everything in flight |
//! | `POST` | `/api/biometry/cleanup` | Optional `{"older_than": minutes}` |

use axum::{
  Json,
  body::Bytes,
  extract::{Query, State},
};
use chrono::{Duration, Utc};
use portaria_core::{
  action_log::{LogStatus, NewActionLog, START_BIOMETRY_ENROLLMENT},
  store::RecordStore,
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{AppState, device::StartEnrollment, error::ApiError, relay::WebhookUpdate};

// ─── Start ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct StartBody {
  #[serde(default)]
  pub user_id:     Option<Value>,
  #[serde(default, rename = "identificador")]
  pub identifier:  Option<String>,
  #[serde(default, rename = "nome")]
  pub name:        Option<String>,
  #[serde(default)]
  pub webhook_url: Option<String>,
}

/// `POST /api/catraca/iniciar-cadastro`
pub async fn start<S>(
  State(state): State<AppState<S>>,
  Json(body): Json<StartBody>,
) -> Result<Json<Value>, ApiError>
where
  S: RecordStore + Clone + Send + Sync + 'static,
{
  let user_id = body.user_id.as_ref().and_then(id_text);
  let identifier = body.identifier.filter(|s| !s.trim().is_empty());
  let (Some(user_id), Some(identifier)) = (user_id, identifier) else {
    return Err(ApiError::BadRequest("user_id and identificador are required".into()));
  };

  let session_id = state.relay.begin(&user_id, &identifier, body.name.as_deref());
  let webhook_url = body.webhook_url.unwrap_or_else(|| {
    format!("{}/api/webhook/biometria", state.config.public_url.trim_end_matches('/'))
  });
  let request = StartEnrollment {
    user_id:     user_id.clone(),
    identifier:  identifier.clone(),
    name:        body.name.clone(),
    webhook_url,
    session_id:  session_id.clone(),
  };

  let outcome = state.device.start_enrollment(&request).await;

  let (status, details) = match &outcome {
    Ok(()) => (LogStatus::Started, format!("biometric enrollment started, session {session_id}")),
    Err(e) => (LogStatus::Error, format!("could not start enrollment: {e}")),
  };
  let log = NewActionLog {
    subject_id:   Some(user_id),
    identifier:   Some(identifier),
    action:       START_BIOMETRY_ENROLLMENT.to_owned(),
    status,
    details:      Some(details.clone()),
    subject_name: body.name,
  };
  if let Err(e) = state.store.append_action_log(log).await {
    tracing::warn!(error = %e, session = %session_id, "failed to log enrollment start");
  }

  match outcome {
    Ok(()) => {
      tracing::info!(session = %session_id, "device accepted enrollment, awaiting webhooks");
      Ok(Json(json!({
        "success":    true,
        "message":    "biometric enrollment started",
        "session_id": session_id,
      })))
    }
    Err(e) => {
      tracing::error!(error = %e, session = %session_id, "device refused enrollment");
      state.relay.fail(&session_id, details);
      Err(ApiError::Device(e.to_string()))
    }
  }
}

/// Accepts `"42"` and `42` alike.
fn id_text(value: &Value) -> Option<String> {
  match value {
    Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}

// ─── Device status ────────────────────────────────────────────────────────────

/// `GET /api/catraca/status`
pub async fn device_status<S>(State(state): State<AppState<S>>) -> Json<Value>
where
  S: RecordStore + Clone + Send + Sync + 'static,
{
  match state.device.status().await {
    Ok(status) => Json(json!({
      "success":        true,
      "online":         true,
      "modo":           status.mode,
      "sensor_status":  status.sensor_status,
      "cadastro_ativo": status.enrollment_open,
    })),
    Err(e) => {
      tracing::warn!(error = %e, "turnstile status check failed");
      Json(json!({ "success": false, "online": false, "error": e.to_string() }))
    }
  }
}

// ─── Webhook ──────────────────────────────────────────────────────────────────

/// `POST /api/webhook/biometria`
pub async fn webhook<S>(
  State(state): State<AppState<S>>,
  Json(update): Json<WebhookUpdate>,
) -> Result<Json<Value>, ApiError>
where
  S: RecordStore + Clone + Send + Sync + 'static,
{
  let session_id = state
    .relay
    .apply(update)
    .ok_or_else(|| ApiError::BadRequest("field \"etapa\" is required".into()))?;

  Ok(Json(json!({
    "success":    true,
    "message":    "webhook received",
    "session_id": session_id,
    "timestamp":  Utc::now(),
  })))
}

// ─── Poll ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct StatusParams {
  pub session_id: Option<String>,
}

/// `GET /api/biometry[?session_id=]`
pub async fn status<S>(
  State(state): State<AppState<S>>,
  Query(params): Query<StatusParams>,
) -> Json<Value>
where
  S: RecordStore + Clone + Send + Sync + 'static,
{
  let (session, session_id) = state.relay.snapshot(params.session_id.as_deref());
  Json(json!({
    "success":    true,
    "etapa":      session.step,
    "mensagem":   session.message,
    "dados":      session.data,
    "timestamp":  session.updated_at,
    "session_id": session_id,
  }))
}

// ─── Cancel ───────────────────────────────────────────────────────────────────

/// `POST /api/cancelar-cadastro`
pub async fn cancel<S>(State(state): State<AppState<S>>) -> Json<Value>
where
  S: RecordStore + Clone + Send + Sync + 'static,
{
  state.relay.cancel();

  let device = state.device.clone();
  tokio::spawn(async move {
    if let Err(e) = device.cancel_enrollment().await {
      tracing::warn!(error = %e, "device cancel not delivered");
    }
  });

  Json(json!({ "success": true, "message": "enrollment cancelled" }))
}

// ─── Cleanup ──────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct CleanupBody {
  #[serde(default)]
  pub older_than: Option<i64>,
}

/// `POST /api/biometry/cleanup`. An empty body uses the configured TTL.
pub async fn cleanup<S>(
  State(state): State<AppState<S>>,
  body: Bytes,
) -> Result<Json<Value>, ApiError>
where
  S: RecordStore + Clone + Send + Sync + 'static,
{
  let body: CleanupBody = if body.is_empty() {
    CleanupBody::default()
  } else {
    serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?
  };
  let minutes = body
    .older_than
    .filter(|m| *m > 0)
    .unwrap_or(state.config.session_ttl_minutes);

  let (removed, remaining) = state.relay.cleanup(Duration::minutes(minutes));
  Ok(Json(json!({
    "success":            true,
    "removed_sessions":   removed,
    "remaining_sessions": remaining,
  })))
}
