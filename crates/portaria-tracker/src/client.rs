//! Async HTTP client for the hub's enrollment relay and action log.

use std::time::Duration;

use portaria_core::action_log::NewActionLog;
use reqwest::{Client, Response};
use serde_json::json;

use crate::{
  Error, Result,
  api::{AuditSink, EnrollmentApi, StartAck, StatusReport, Subject},
};

/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct HttpEnrollmentClient {
  client:   Client,
  base_url: String,
}

impl HttpEnrollmentClient {
  pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
    let client = Client::builder().timeout(timeout).build()?;
    Ok(Self { client, base_url: base_url.into() })
  }

  fn url(&self, path: &str) -> String {
    format!("{}/api{}", self.base_url.trim_end_matches('/'), path)
  }
}

/// Fail on any non-2xx status.
fn success(resp: Response) -> Result<Response> {
  if resp.status().is_success() { Ok(resp) } else { Err(Error::Status(resp.status())) }
}

impl EnrollmentApi for HttpEnrollmentClient {
  /// `POST /api/catraca/iniciar-cadastro`
  async fn start<'a>(&'a self, subject: &'a Subject, callback_url: Option<&'a str>) -> Result<StartAck> {
    let resp = self
      .client
      .post(self.url("/catraca/iniciar-cadastro"))
      .json(&json!({
        "user_id":       subject.user_id,
        "identificador": subject.identifier,
        "nome":          subject.name,
        "webhook_url":   callback_url,
      }))
      .send()
      .await?;

    // A refusal still carries `{success:false, error}`; only an unreadable
    // body makes a failed status a transport error.
    let status = resp.status();
    match (status.is_success(), resp.json::<StartAck>().await) {
      (true, parsed) => Ok(parsed?),
      (false, Ok(ack)) if !ack.success => Ok(ack),
      (false, _) => Err(Error::Status(status)),
    }
  }

  /// `GET /api/biometry[?session_id=]`
  async fn status<'a>(&'a self, session_id: Option<&'a str>) -> Result<StatusReport> {
    let mut req = self.client.get(self.url("/biometry"));
    if let Some(id) = session_id {
      req = req.query(&[("session_id", id)]);
    }
    Ok(success(req.send().await?)?.json().await?)
  }

  /// `POST /api/cancelar-cadastro`
  async fn cancel(&self) -> Result<()> {
    success(self.client.post(self.url("/cancelar-cadastro")).send().await?)?;
    Ok(())
  }
}

impl AuditSink for HttpEnrollmentClient {
  /// `POST /api/logs/action`
  async fn record(&self, entry: NewActionLog) -> Result<()> {
    success(self.client.post(self.url("/logs/action")).json(&entry).send().await?)?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  use axum::{
    Json, Router,
    http::StatusCode,
    routing::{get, post},
  };
  use serde_json::Value;
  use tokio::net::TcpListener;

  async fn serve(app: Router) -> HttpEnrollmentClient {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    HttpEnrollmentClient::new(format!("http://{address}"), Duration::from_secs(5)).unwrap()
  }

  fn subject() -> Subject {
    Subject {
      user_id:    "visitor-42".into(),
      identifier: "V-42".into(),
      name:       Some("Visitor".into()),
    }
  }

  #[tokio::test]
  async fn refused_start_is_a_negative_ack() {
    let client = serve(Router::new().route(
      "/api/catraca/iniciar-cadastro",
      post(|| async {
        (StatusCode::BAD_GATEWAY, Json(json!({ "success": false, "error": "sensor busy" })))
      }),
    ))
    .await;

    let ack = client.start(&subject(), None).await.unwrap();
    assert!(!ack.success);
    assert_eq!(ack.error.as_deref(), Some("sensor busy"));
  }

  #[tokio::test]
  async fn accepted_start_carries_session_id() {
    let client = serve(Router::new().route(
      "/api/catraca/iniciar-cadastro",
      post(|Json(body): Json<Value>| async move {
        assert_eq!(body["identificador"], "V-42");
        Json(json!({ "success": true, "session_id": "session_visitor-42_1" }))
      }),
    ))
    .await;

    let ack = client.start(&subject(), Some("http://hub/api/webhook/biometria")).await.unwrap();
    assert!(ack.success);
    assert_eq!(ack.session_id.as_deref(), Some("session_visitor-42_1"));
  }

  #[tokio::test]
  async fn non_success_status_poll_is_a_transport_error() {
    let client = serve(Router::new().route(
      "/api/biometry",
      get(|| async { (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "etapa": "finalizado" }))) }),
    ))
    .await;

    let err = client.status(Some("s1")).await.unwrap_err();
    assert!(matches!(err, Error::Status(StatusCode::SERVICE_UNAVAILABLE)));
  }

  #[tokio::test]
  async fn poll_reads_step_label() {
    let client = serve(Router::new().route(
      "/api/biometry",
      get(|| async { Json(json!({ "success": true, "etapa": "validando", "dados": { "posicao": 3 } })) }),
    ))
    .await;

    let report = client.status(None).await.unwrap();
    assert_eq!(report.step, "validando");
    assert_eq!(report.data.unwrap()["posicao"], 3);
  }
}
