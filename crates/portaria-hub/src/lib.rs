//! Realtime access-control hub.
//!
//! Exposes an axum [`Router`] that accepts dashboard WebSocket subscribers,
//! records turnstile entrances and exits through any [`RecordStore`], fans
//! each new record out to every subscriber, and relays biometric enrollment
//! progress between the turnstile and the dashboards.

pub mod auth;
pub mod device;
pub mod error;
pub mod handlers;
pub mod hub;
pub mod relay;
pub mod socket;

pub use error::{ApiError, Error};

use std::{path::PathBuf, sync::Arc, time::Duration};

use axum::{
  Router,
  routing::{get, post},
};
use portaria_core::store::RecordStore;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use auth::{AuthPolicy, Authenticator};
use device::DeviceClient;
use handlers::{enrollment, entries, logs, status};
use hub::Hub;
use relay::EnrollmentRelay;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `PORTARIA_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:                String,
  #[serde(default = "default_port")]
  pub port:                u16,
  #[serde(default = "default_store_path")]
  pub store_path:          PathBuf,
  pub jwt_secret:          String,
  #[serde(default)]
  pub auth_policy:         AuthPolicy,
  #[serde(default = "default_heartbeat_secs")]
  pub heartbeat_secs:      u64,
  #[serde(default = "default_bootstrap_recent")]
  pub bootstrap_recent:    usize,
  /// Base URL of the turnstile controller.
  #[serde(default = "default_device_url")]
  pub device_url:          String,
  /// Base URL under which the device can reach this server's webhook.
  #[serde(default = "default_public_url")]
  pub public_url:          String,
  #[serde(default = "default_session_ttl_minutes")]
  pub session_ttl_minutes: i64,
}

fn default_host() -> String { "127.0.0.1".to_owned() }
fn default_port() -> u16 { 5001 }
fn default_store_path() -> PathBuf { PathBuf::from("portaria.db") }
fn default_heartbeat_secs() -> u64 { hub::DEFAULT_HEARTBEAT_INTERVAL.as_secs() }
fn default_bootstrap_recent() -> usize { hub::DEFAULT_BOOTSTRAP_RECENT }
fn default_device_url() -> String { "http://localhost:5000".to_owned() }
fn default_public_url() -> String { "http://localhost:5001".to_owned() }
fn default_session_ttl_minutes() -> i64 { 60 }

impl ServerConfig {
  pub fn heartbeat_interval(&self) -> Duration { Duration::from_secs(self.heartbeat_secs.max(1)) }
}

/// Timeout for calls to the turnstile controller.
const DEVICE_TIMEOUT: Duration = Duration::from_secs(60);

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
#[derive(Clone)]
pub struct AppState<S: RecordStore> {
  pub store:  Arc<S>,
  pub hub:    Arc<Hub<S>>,
  pub relay:  Arc<EnrollmentRelay>,
  pub device: DeviceClient,
  pub config: Arc<ServerConfig>,
}

impl<S: RecordStore> AppState<S> {
  pub fn new(store: S, config: ServerConfig) -> Result<Self, Error> {
    let store = Arc::new(store);
    let auth = Authenticator::new(config.jwt_secret.clone(), config.auth_policy);
    let hub = Arc::new(Hub::new(store.clone(), auth, config.bootstrap_recent));
    let device = DeviceClient::new(config.device_url.clone(), DEVICE_TIMEOUT)?;

    Ok(Self {
      store,
      hub,
      relay: Arc::new(EnrollmentRelay::new()),
      device,
      config: Arc::new(config),
    })
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the axum [`Router`] for the hub.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: RecordStore + Clone + Send + Sync + 'static,
{
  Router::new()
    .route("/ws",                             get(socket::handler::<S>))
    // Records
    .route("/api/entries",                    get(entries::list::<S>).post(entries::create::<S>))
    .route("/api/statistics",                 get(entries::statistics::<S>))
    .route("/api/logs/action",                get(logs::list::<S>).post(logs::create::<S>))
    .route("/api/hub/status",                 get(status::handler::<S>))
    // Enrollment relay
    .route("/api/catraca/status",             get(enrollment::device_status::<S>))
    .route("/api/catraca/iniciar-cadastro",   post(enrollment::start::<S>))
    .route("/api/webhook/biometria",          post(enrollment::webhook::<S>))
    .route("/api/biometry",                   get(enrollment::status::<S>))
    .route("/api/biometry/cleanup",           post(enrollment::cleanup::<S>))
    .route("/api/cancelar-cadastro",          post(enrollment::cancel::<S>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

// ─── Integration tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  use axum::{
    Json,
    body::Body,
    http::{Request, StatusCode, header},
  };
  use portaria_store_sqlite::SqliteStore;
  use serde_json::{Value, json};
  use futures::{SinkExt as _, Stream, StreamExt as _};
  use tokio::net::TcpListener;
  use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message as WsMessage},
  };
  use tower::ServiceExt as _;

  fn config(device_url: &str) -> ServerConfig {
    ServerConfig {
      host:                "127.0.0.1".to_owned(),
      port:                5001,
      store_path:          PathBuf::from(":memory:"),
      jwt_secret:          "test-secret".to_owned(),
      auth_policy:         AuthPolicy::Permissive,
      heartbeat_secs:      30,
      bootstrap_recent:    5,
      device_url:          device_url.to_owned(),
      public_url:          "http://hub.test".to_owned(),
      session_ttl_minutes: 60,
    }
  }

  /// Nothing listens on the discard port.
  const DEAD_DEVICE: &str = "http://127.0.0.1:9";

  async fn make_state(device_url: &str) -> AppState<SqliteStore> {
    let store = SqliteStore::open_in_memory().await.unwrap();
    AppState::new(store, config(device_url)).unwrap()
  }

  /// Serve a stand-in turnstile that accepts every enrollment.
  async fn fake_device() -> String {
    let app = Router::new()
      .route(
        "/api/catraca/iniciar-cadastro",
        post(|Json(body): Json<Value>| async move {
          assert!(body["webhook_url"].as_str().unwrap().ends_with("/api/webhook/biometria"));
          assert!(body["session_id"].as_str().unwrap().starts_with("session_"));
          Json(json!({ "success": true }))
        }),
      )
      .route(
        "/api/catraca/status",
        get(|| async { Json(json!({ "modo": "normal", "sensor_status": "ok", "cadastro_ativo": false })) }),
      );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{address}")
  }

  async fn send(
    state: AppState<SqliteStore>,
    method: &str,
    uri: &str,
    body: Option<Value>,
  ) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
      Some(json) => {
        builder = builder.header(header::CONTENT_TYPE, "application/json");
        Body::from(json.to_string())
      }
      None => Body::empty(),
    };
    let resp = router(state).oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, json)
  }

  fn entry(user: &str, direction: &str) -> Value {
    json!({
      "userId":     user,
      "identifier": format!("MAT-{user}"),
      "name":       format!("User {user}"),
      "personKind": "ALUNO",
      "direction":  direction,
    })
  }

  // ── Records ─────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn posting_an_entry_broadcasts_entry_then_statistics() {
    let state = make_state(DEAD_DEVICE).await;
    let mut sub = state.hub.connect(Some("demo-token")).await.unwrap();
    while sub.frames.try_recv().is_ok() {}

    let (status, record) = send(state.clone(), "POST", "/api/entries", Some(entry("7", "ENTRANCE"))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(record["direction"], "ENTRANCE");

    let first: Value = serde_json::from_str(&sub.frames.try_recv().unwrap()).unwrap();
    let second: Value = serde_json::from_str(&sub.frames.try_recv().unwrap()).unwrap();
    assert_eq!(first["kind"], "ENTRANCE");
    assert_eq!(first["payload"]["id"], record["id"]);
    assert_eq!(second["kind"], "STATISTICS");
    assert_eq!(second["payload"]["entrances"], 1);
  }

  #[tokio::test]
  async fn entries_are_listed_newest_first() {
    let state = make_state(DEAD_DEVICE).await;
    send(state.clone(), "POST", "/api/entries", Some(entry("1", "ENTRANCE"))).await;
    send(state.clone(), "POST", "/api/entries", Some(entry("2", "EXIT"))).await;

    let (status, list) = send(state.clone(), "GET", "/api/entries", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list[0]["userId"], "2");
    assert_eq!(list[1]["userId"], "1");

    let (_, filtered) = send(state.clone(), "GET", "/api/entries?user_id=1", None).await;
    assert_eq!(filtered.as_array().unwrap().len(), 1);

    let (status, _) = send(state, "GET", "/api/entries?period=LUNCH", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn entry_without_identity_is_rejected() {
    let state = make_state(DEAD_DEVICE).await;
    let (status, body) = send(state, "POST", "/api/entries", Some(entry(" ", "EXIT"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
  }

  #[tokio::test]
  async fn statistics_reflect_todays_records() {
    let state = make_state(DEAD_DEVICE).await;
    send(state.clone(), "POST", "/api/entries", Some(entry("1", "ENTRANCE"))).await;
    send(state.clone(), "POST", "/api/entries", Some(entry("1", "EXIT"))).await;

    let (status, stats) = send(state, "GET", "/api/statistics", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!((stats["total"].as_u64(), stats["exits"].as_u64()), (Some(2), Some(1)));
  }

  #[tokio::test]
  async fn action_logs_round_trip() {
    let state = make_state(DEAD_DEVICE).await;
    let log = json!({
      "subjectId":   "visitor-42",
      "action":      "CADASTRAR_BIOMETRIA",
      "status":      "SUCCESS",
      "details":     "enrolled",
      "subjectName": "Visitor",
    });
    let (status, _) = send(state.clone(), "POST", "/api/logs/action", Some(log)).await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, logs) = send(state, "GET", "/api/logs/action?subject_id=visitor-42", None).await;
    assert_eq!(logs[0]["status"], "SUCCESS");
    assert_eq!(logs[0]["identifier"], Value::Null);
  }

  #[tokio::test]
  async fn hub_status_counts_subscribers() {
    let state = make_state(DEAD_DEVICE).await;
    let _a = state.hub.connect(Some("demo-token")).await.unwrap();
    let _b = state.hub.connect(Some("demo-token")).await.unwrap();

    let (status, body) = send(state, "GET", "/api/hub/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "port": 5001, "clientsConnected": 2, "status": "RUNNING" }));
  }

  // ── Enrollment relay ────────────────────────────────────────────────────────

  #[tokio::test]
  async fn start_requires_user_and_identifier() {
    let state = make_state(DEAD_DEVICE).await;
    let (status, _) = send(
      state,
      "POST",
      "/api/catraca/iniciar-cadastro",
      Some(json!({ "user_id": 42, "nome": "Ana" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn start_opens_session_and_logs_it() {
    let device = fake_device().await;
    let state = make_state(&device).await;

    let (status, body) = send(
      state.clone(),
      "POST",
      "/api/catraca/iniciar-cadastro",
      Some(json!({ "user_id": 42, "identificador": "MAT-42", "nome": "Ana" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let session_id = body["session_id"].as_str().unwrap().to_owned();
    assert!(session_id.starts_with("session_42_"));

    let (_, polled) = send(state.clone(), "GET", "/api/biometry", None).await;
    assert_eq!(polled["etapa"], "iniciando");
    assert_eq!(polled["session_id"], session_id.as_str());

    let (_, logs) = send(state, "GET", "/api/logs/action?action=INICIAR", None).await;
    assert_eq!(logs[0]["status"], "STARTED");
    assert_eq!(logs[0]["subjectId"], "42");
  }

  #[tokio::test]
  async fn unreachable_device_marks_session_failed() {
    let state = make_state(DEAD_DEVICE).await;
    let (status, body) = send(
      state.clone(),
      "POST",
      "/api/catraca/iniciar-cadastro",
      Some(json!({ "user_id": "42", "identificador": "MAT-42" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["success"], false);

    let (_, polled) = send(state.clone(), "GET", "/api/biometry", None).await;
    assert_eq!(polled["etapa"], "erro");

    let (_, logs) = send(state, "GET", "/api/logs/action", None).await;
    assert_eq!(logs[0]["status"], "ERROR");
  }

  #[tokio::test]
  async fn webhook_steps_are_polled_back() {
    let state = make_state(DEAD_DEVICE).await;
    let (status, _) = send(state.clone(), "POST", "/api/webhook/biometria", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let update = json!({ "etapa": "primeira_capturada", "mensagem": "lift finger", "session_id": "s1" });
    let (status, ack) = send(state.clone(), "POST", "/api/webhook/biometria", Some(update)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["session_id"], "s1");

    let (_, polled) = send(state.clone(), "GET", "/api/biometry?session_id=s1", None).await;
    assert_eq!(polled["etapa"], "primeira_capturada");
    assert_eq!(polled["mensagem"], "lift finger");

    send(state.clone(), "POST", "/api/cancelar-cadastro", None).await;
    let (_, polled) = send(state, "GET", "/api/biometry?session_id=s1", None).await;
    assert_eq!(polled["etapa"], "cancelado");
  }

  #[tokio::test]
  async fn cleanup_with_empty_body_uses_ttl() {
    let state = make_state(DEAD_DEVICE).await;
    state.relay.begin("1", "A", None);

    let (status, body) = send(state.clone(), "POST", "/api/biometry/cleanup", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed_sessions"], 0);
    assert_eq!(body["remaining_sessions"], 1);
  }

  #[tokio::test]
  async fn device_status_reports_offline_device() {
    let state = make_state(DEAD_DEVICE).await;
    let (status, body) = send(state, "GET", "/api/catraca/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["online"], false);

    let state = make_state(&fake_device().await).await;
    let (_, body) = send(state, "GET", "/api/catraca/status", None).await;
    assert_eq!(body["online"], true);
    assert_eq!(body["modo"], "normal");
  }

  // ── WebSocket ───────────────────────────────────────────────────────────────

  /// Serve the full router on an ephemeral port and return the `/ws` URL.
  async fn serve_hub(state: AppState<SqliteStore>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let app = router(state);
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("ws://{address}/ws")
  }

  /// The next text frame, parsed as JSON.
  async fn next_frame<C>(client: &mut C) -> Value
  where
    C: Stream<Item = Result<WsMessage, WsError>> + Unpin,
  {
    loop {
      if let WsMessage::Text(text) = client.next().await.unwrap().unwrap() {
        return serde_json::from_str(text.as_str()).unwrap();
      }
    }
  }

  async fn wait_for_subscribers(state: &AppState<SqliteStore>, expected: usize) {
    for _ in 0..200 {
      if state.hub.subscriber_count() == expected {
        return;
      }
      tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(state.hub.subscriber_count(), expected);
  }

  #[tokio::test]
  async fn socket_bootstraps_answers_ping_and_unregisters_on_close() {
    let state = make_state(DEAD_DEVICE).await;
    let url = serve_hub(state.clone()).await;

    let (mut client, _) = connect_async(format!("{url}?token=demo-token")).await.unwrap();
    let first = next_frame(&mut client).await;
    assert_eq!(first["kind"], "STATISTICS");
    assert_eq!(state.hub.subscriber_count(), 1);

    client.send(WsMessage::text("not json")).await.unwrap();
    client.send(WsMessage::text(r#"{"kind":"PING"}"#)).await.unwrap();
    let reply = next_frame(&mut client).await;
    assert_eq!(reply["kind"], "PONG");
    assert!(reply["payload"]["asOf"].is_string());

    send(state.clone(), "POST", "/api/entries", Some(entry("9", "EXIT"))).await;
    assert_eq!(next_frame(&mut client).await["kind"], "EXIT");
    assert_eq!(next_frame(&mut client).await["kind"], "STATISTICS");

    client.close(None).await.unwrap();
    wait_for_subscribers(&state, 0).await;
  }

  #[tokio::test]
  async fn socket_without_token_is_refused_with_policy_close() {
    let state = make_state(DEAD_DEVICE).await;
    let url = serve_hub(state.clone()).await;

    let (mut client, _) = connect_async(url).await.unwrap();
    let refusal = next_frame(&mut client).await;
    assert_eq!(refusal["kind"], "ERROR");
    assert_eq!(refusal["payload"]["code"], "TOKEN_REQUIRED");

    let close = loop {
      match client.next().await {
        Some(Ok(WsMessage::Close(frame))) => break frame,
        Some(Ok(_)) => continue,
        other => panic!("expected a close frame, got {other:?}"),
      }
    };
    let close = close.expect("close frame carries a code");
    assert_eq!(u16::from(close.code), 1008);
    assert_eq!(close.reason.as_str(), "TOKEN_REQUIRED");
    assert_eq!(state.hub.subscriber_count(), 0);
  }
}
