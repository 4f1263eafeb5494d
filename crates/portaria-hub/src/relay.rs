//! Server-side state of biometric enrollments.
//!
//! The turnstile reports enrollment progress by POSTing step labels to the
//! webhook; dashboards poll the latest label back out. Sessions are keyed by
//! the id handed to the device when the enrollment started, and the most
//! recently touched session is the "current" one returned to pollers that do
//! not name a session.

use std::{
  collections::HashMap,
  sync::{Mutex, MutexGuard},
};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Session key used by webhook updates that carry no session id.
pub const DEFAULT_SESSION: &str = "default";

/// Step label of a relay with nothing in flight.
pub const IDLE_STEP: &str = "inicial";

/// The last step reported for one session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionState {
  #[serde(rename = "etapa")]
  pub step:       String,
  #[serde(rename = "mensagem")]
  pub message:    String,
  #[serde(rename = "dados")]
  pub data:       Option<Value>,
  pub success:    bool,
  #[serde(rename = "timestamp")]
  pub updated_at: DateTime<Utc>,
}

impl SessionState {
  fn new(step: &str, message: &str, data: Option<Value>, success: bool) -> Self {
    Self {
      step: step.to_owned(),
      message: message.to_owned(),
      data,
      success,
      updated_at: Utc::now(),
    }
  }

  fn idle() -> Self { Self::new(IDLE_STEP, "waiting for an enrollment to start", None, true) }
}

/// Body of the device webhook.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookUpdate {
  #[serde(default, rename = "etapa")]
  pub step:       Option<String>,
  #[serde(default, rename = "mensagem")]
  pub message:    Option<String>,
  #[serde(default, rename = "dados")]
  pub data:       Option<Value>,
  #[serde(default)]
  pub success:    Option<bool>,
  #[serde(default)]
  pub session_id: Option<String>,
}

struct RelayState {
  sessions:   HashMap<String, SessionState>,
  current:    SessionState,
  current_id: Option<String>,
}

impl RelayState {
  /// Replace `id`'s state and make it current.
  fn store(&mut self, id: String, state: SessionState) {
    self.current = state.clone();
    self.sessions.insert(id.clone(), state);
    self.current_id = Some(id);
  }
}

pub struct EnrollmentRelay {
  state: Mutex<RelayState>,
}

impl Default for EnrollmentRelay {
  fn default() -> Self { Self::new() }
}

impl EnrollmentRelay {
  pub fn new() -> Self {
    Self {
      state: Mutex::new(RelayState {
        sessions:   HashMap::new(),
        current:    SessionState::idle(),
        current_id: None,
      }),
    }
  }

  /// Open a session for `user_id` in step `iniciando` and return its id.
  pub fn begin(&self, user_id: &str, identifier: &str, name: Option<&str>) -> String {
    let id = format!("session_{user_id}_{}", Utc::now().timestamp_millis());
    let data = json!({ "user_id": user_id, "identificador": identifier, "nome": name });
    let state = SessionState::new("iniciando", "starting biometric enrollment", Some(data), true);

    self.lock().store(id.clone(), state);
    tracing::info!(session = %id, user = user_id, "enrollment session opened");
    id
  }

  /// Mark `session_id` as failed, if it still exists.
  pub fn fail(&self, session_id: &str, message: impl Into<String>) {
    let mut relay = self.lock();
    let Some(session) = relay.sessions.get_mut(session_id) else { return };
    session.step = "erro".to_owned();
    session.message = message.into();
    session.success = false;
    session.updated_at = Utc::now();

    if relay.current_id.as_deref() == Some(session_id) {
      relay.current = relay.sessions[session_id].clone();
    }
  }

  /// Apply a webhook update. Returns the session key it was stored under,
  /// or `None` when the update carries no step label.
  pub fn apply(&self, update: WebhookUpdate) -> Option<String> {
    let step = update.step.filter(|s| !s.is_empty())?;
    let key = update.session_id.unwrap_or_else(|| DEFAULT_SESSION.to_owned());
    let state = SessionState {
      step,
      message: update.message.unwrap_or_else(|| "processing".to_owned()),
      data: update.data,
      success: update.success.unwrap_or(true),
      updated_at: Utc::now(),
    };

    tracing::debug!(session = %key, step = %state.step, "webhook update");
    self.lock().store(key.clone(), state);
    Some(key)
  }

  /// The state of `session_id` when known, else the current state, together
  /// with the id it answers for.
  pub fn snapshot(&self, session_id: Option<&str>) -> (SessionState, Option<String>) {
    let relay = self.lock();
    match session_id.and_then(|id| relay.sessions.get(id).map(|s| (id, s))) {
      Some((id, state)) => (state.clone(), Some(id.to_owned())),
      None => (
        relay.current.clone(),
        session_id.map(str::to_owned).or_else(|| relay.current_id.clone()),
      ),
    }
  }

  /// Abandon every session and report `cancelado` as the current state.
  pub fn cancel(&self) {
    let mut relay = self.lock();
    let dropped = relay.sessions.len();
    relay.sessions.clear();
    relay.current_id = None;
    relay.current = SessionState::new("cancelado", "enrollment cancelled by the user", None, false);
    tracing::info!(dropped, "enrollment cancelled");
  }

  /// Drop sessions not updated within `max_age`. Returns
  /// `(removed, remaining)`.
  pub fn cleanup(&self, max_age: Duration) -> (usize, usize) {
    self.cleanup_before(Utc::now() - max_age)
  }

  pub fn cleanup_before(&self, cutoff: DateTime<Utc>) -> (usize, usize) {
    let mut relay = self.lock();
    let before = relay.sessions.len();
    relay.sessions.retain(|_, session| session.updated_at >= cutoff);
    let remaining = relay.sessions.len();
    tracing::info!(removed = before - remaining, remaining, "stale enrollment sessions removed");
    (before - remaining, remaining)
  }

  fn lock(&self) -> MutexGuard<'_, RelayState> {
    self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }
}
