//! Handlers for `/api/logs/action`.

use axum::{
  Json,
  extract::{Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use portaria_core::{
  action_log::{ActionLog, NewActionLog},
  store::{ActionLogQuery, RecordStore},
};
use serde::Deserialize;

use crate::{AppState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub subject_id: Option<String>,
  pub action:     Option<String>,
  pub limit:      Option<usize>,
  pub offset:     Option<usize>,
}

/// `GET /api/logs/action[?subject_id=&action=&limit=&offset=]`
pub async fn list<S>(
  State(state): State<AppState<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<ActionLog>>, ApiError>
where
  S: RecordStore + Clone + Send + Sync + 'static,
{
  let query = ActionLogQuery {
    subject_id: params.subject_id,
    action:     params.action,
    limit:      params.limit,
    offset:     params.offset,
  };
  let logs = state.store.list_action_logs(&query).await.map_err(ApiError::store)?;
  Ok(Json(logs))
}

/// `POST /api/logs/action`
pub async fn create<S>(
  State(state): State<AppState<S>>,
  Json(body): Json<NewActionLog>,
) -> Result<impl IntoResponse, ApiError>
where
  S: RecordStore + Clone + Send + Sync + 'static,
{
  if body.action.trim().is_empty() {
    return Err(ApiError::BadRequest("action is required".into()));
  }
  let log = state.store.append_action_log(body).await.map_err(ApiError::store)?;
  tracing::info!(
    action = %log.action,
    status = log.status.as_str(),
    subject = log.subject_id.as_deref().unwrap_or("-"),
    "action logged"
  );
  Ok((StatusCode::CREATED, Json(log)))
}
