//! Hub wire protocol.
//!
//! Every frame in either direction is a JSON object of the shape
//! `{ "kind": ..., "payload": ..., "emittedAt": ... }`. Server frames are
//! built from [`ServerEvent`]; client frames are read loosely through
//! [`ClientFrame`] so that unknown kinds can be ignored instead of rejected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::{AccessRecord, DailyStatistics, Direction};

// ─── Payloads ────────────────────────────────────────────────────────────────

/// Periodic liveness signal, independent of transport keep-alives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatPayload {
  pub as_of:                   DateTime<Utc>,
  pub active_subscriber_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
  pub code:    String,
  pub message: String,
  pub as_of:   DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PongPayload {
  pub as_of: DateTime<Utc>,
}

// ─── Server → client ─────────────────────────────────────────────────────────

/// A domain event pushed from the hub to its subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "UPPERCASE")]
pub enum ServerEvent {
  Entrance(AccessRecord),
  Exit(AccessRecord),
  Statistics(DailyStatistics),
  Heartbeat(HeartbeatPayload),
  Error(ErrorPayload),
  Pong(PongPayload),
}

impl ServerEvent {
  /// The entrance or exit event describing `record`.
  pub fn from_record(record: AccessRecord) -> Self {
    match record.direction {
      Direction::Entrance => Self::Entrance(record),
      Direction::Exit => Self::Exit(record),
    }
  }

  pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
    Self::Error(ErrorPayload {
      code:    code.into(),
      message: message.into(),
      as_of:   Utc::now(),
    })
  }

  /// The wire value of the `kind` field.
  pub fn kind(&self) -> &'static str {
    match self {
      Self::Entrance(_) => "ENTRANCE",
      Self::Exit(_) => "EXIT",
      Self::Statistics(_) => "STATISTICS",
      Self::Heartbeat(_) => "HEARTBEAT",
      Self::Error(_) => "ERROR",
      Self::Pong(_) => "PONG",
    }
  }
}

/// A [`ServerEvent`] stamped with its emission time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
  #[serde(flatten)]
  pub event:      ServerEvent,
  pub emitted_at: DateTime<Utc>,
}

impl Envelope {
  pub fn now(event: ServerEvent) -> Self {
    Self { event, emitted_at: Utc::now() }
  }

  /// Serialise to the text frame sent over the socket.
  pub fn to_frame(&self) -> crate::Result<String> {
    Ok(serde_json::to_string(self)?)
  }
}

// ─── Client → server ─────────────────────────────────────────────────────────

/// A client frame as received, before its kind is interpreted.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientFrame {
  pub kind:    String,
  #[serde(default)]
  pub payload: serde_json::Value,
}

/// The client messages the hub acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
  Ping,
  /// Any other kind; ignored by the hub.
  Unrecognized(String),
}

impl ClientFrame {
  /// Parse a text frame. Fails only on malformed JSON or a missing `kind`.
  pub fn parse(text: &str) -> crate::Result<Self> {
    Ok(serde_json::from_str(text)?)
  }

  pub fn message(&self) -> ClientMessage {
    match self.kind.as_str() {
      "PING" => ClientMessage::Ping,
      other => ClientMessage::Unrecognized(other.to_owned()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn statistics_envelope_shape() {
    let at = Utc::now();
    let envelope = Envelope {
      event:      ServerEvent::Statistics(DailyStatistics {
        total:     3,
        entrances: 2,
        exits:     1,
        as_of:     at,
      }),
      emitted_at: at,
    };
    let json: serde_json::Value =
      serde_json::from_str(&envelope.to_frame().unwrap()).unwrap();
    assert_eq!(json["kind"], "STATISTICS");
    assert_eq!(json["payload"]["entrances"], 2);
    assert_eq!(json["payload"]["exits"], 1);
    assert!(json["payload"]["asOf"].is_string());
    assert!(json["emittedAt"].is_string());
  }

  #[test]
  fn heartbeat_carries_subscriber_count() {
    let envelope = Envelope::now(ServerEvent::Heartbeat(HeartbeatPayload {
      as_of:                   Utc::now(),
      active_subscriber_count: 7,
    }));
    let json = serde_json::to_value(&envelope).unwrap();
    assert_eq!(json["kind"], "HEARTBEAT");
    assert_eq!(json["payload"]["activeSubscriberCount"], 7);
  }

  #[test]
  fn ping_is_recognised() {
    let frame = ClientFrame::parse(r#"{"kind":"PING"}"#).unwrap();
    assert_eq!(frame.message(), ClientMessage::Ping);
  }

  #[test]
  fn unknown_kind_is_not_an_error() {
    let frame =
      ClientFrame::parse(r#"{"kind":"SUBSCRIBE","payload":{"room":1}}"#).unwrap();
    assert_eq!(frame.message(), ClientMessage::Unrecognized("SUBSCRIBE".into()));
  }

  #[test]
  fn malformed_frame_fails_to_parse() {
    assert!(ClientFrame::parse("not json").is_err());
    assert!(ClientFrame::parse(r#"{"payload":{}}"#).is_err());
  }
}
