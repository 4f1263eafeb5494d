//! `GET /ws?token=…`: the hub's WebSocket endpoint.
//!
//! Each accepted socket is split in two. A writer task drains the
//! subscriber's frame queue into the sink; the reader loop feeds client
//! frames to the hub until the peer closes or either half fails, then the
//! subscriber is disconnected.

use axum::{
  extract::{
    Query, State, WebSocketUpgrade,
    ws::{CloseFrame, Message, WebSocket, close_code},
  },
  response::Response,
};
use futures::{SinkExt as _, StreamExt as _};
use portaria_core::{
  event::{Envelope, ServerEvent},
  store::RecordStore,
};
use serde::Deserialize;

use crate::{AppState, auth::AuthFailure};

#[derive(Debug, Deserialize)]
pub struct ConnectParams {
  pub token: Option<String>,
}

pub async fn handler<S>(
  ws: WebSocketUpgrade,
  Query(params): Query<ConnectParams>,
  State(state): State<AppState<S>>,
) -> Response
where
  S: RecordStore + Clone + Send + Sync + 'static,
{
  ws.on_upgrade(move |socket| serve(socket, state, params.token))
}

async fn serve<S>(socket: WebSocket, state: AppState<S>, token: Option<String>)
where
  S: RecordStore + Clone + Send + Sync + 'static,
{
  let (mut sink, mut stream) = socket.split();

  let subscription = match state.hub.connect(token.as_deref()).await {
    Ok(subscription) => subscription,
    Err(failure) => {
      tracing::warn!(code = failure.code(), "socket refused: {failure}");
      refuse(&mut sink, &failure).await;
      return;
    }
  };

  let id = subscription.handle.id;
  let user = subscription.handle.identity.user_id;
  let mut frames = subscription.frames;

  let mut writer = tokio::spawn(async move {
    while let Some(frame) = frames.recv().await {
      if let Err(e) = sink.send(Message::Text(frame.into())).await {
        tracing::debug!(subscriber = %id, error = %e, "socket write failed");
        break;
      }
    }
  });

  loop {
    tokio::select! {
      incoming = stream.next() => match incoming {
        Some(Ok(Message::Text(text))) => state.hub.handle_client_message(id, text.as_str()),
        Some(Ok(Message::Close(_))) | None => break,
        // Pings are answered by axum; binary frames mean nothing here.
        Some(Ok(_)) => {}
        Some(Err(e)) => {
          tracing::debug!(subscriber = %id, error = %e, "socket read failed");
          break;
        }
      },
      _ = &mut writer => break,
    }
  }

  state.hub.disconnect(id);
  writer.abort();
  tracing::debug!(subscriber = %id, user = %user, "socket closed");
}

/// Send an ERROR frame describing `failure`, then close with 1008.
async fn refuse<T>(sink: &mut T, failure: &AuthFailure)
where
  T: futures::Sink<Message> + Unpin,
{
  let event = ServerEvent::error(failure.code(), failure.to_string());
  if let Ok(frame) = Envelope::now(event).to_frame() {
    let _ = sink.send(Message::Text(frame.into())).await;
  }
  let close = CloseFrame {
    code:   close_code::POLICY,
    reason: failure.code().into(),
  };
  let _ = sink.send(Message::Close(Some(close))).await;
}
