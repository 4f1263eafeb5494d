//! `GET /api/hub/status`

use axum::{Json, extract::State};
use portaria_core::store::RecordStore;
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HubStatus {
  pub port:              u16,
  pub clients_connected: usize,
  pub status:            &'static str,
}

pub async fn handler<S>(State(state): State<AppState<S>>) -> Json<HubStatus>
where
  S: RecordStore + Clone + Send + Sync + 'static,
{
  Json(HubStatus {
    port:              state.config.port,
    clients_connected: state.hub.subscriber_count(),
    status:            "RUNNING",
  })
}
