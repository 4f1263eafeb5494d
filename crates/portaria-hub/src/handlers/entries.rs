//! Handlers for access records.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/api/entries` | Persists, then broadcasts the entry and fresh statistics |
//! | `GET`  | `/api/entries` | Optional `date`, `user_id`, `period`, `kind`, `limit`, `offset` |
//! | `GET`  | `/api/statistics` | Optional `date`, defaults to today |

use axum::{
  Json,
  extract::{Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use chrono::NaiveDate;
use portaria_core::{
  record::{AccessRecord, DailyStatistics, NewAccessRecord, Period},
  store::{RecordQuery, RecordStore},
};
use serde::Deserialize;

use crate::{AppState, error::ApiError, hub::today};

// ─── Create ───────────────────────────────────────────────────────────────────

/// `POST /api/entries`
pub async fn create<S>(
  State(state): State<AppState<S>>,
  Json(body): Json<NewAccessRecord>,
) -> Result<impl IntoResponse, ApiError>
where
  S: RecordStore + Clone + Send + Sync + 'static,
{
  if body.user_id.trim().is_empty() || body.identifier.trim().is_empty() {
    return Err(ApiError::BadRequest("userId and identifier are required".into()));
  }

  let record = state.store.record_access(body).await.map_err(ApiError::store)?;
  tracing::info!(
    record = %record.id,
    user = %record.user_id,
    direction = record.direction.as_str(),
    "access recorded"
  );

  state.hub.publish_entry_event(record.clone()).await;
  Ok((StatusCode::CREATED, Json(record)))
}

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub date:    Option<NaiveDate>,
  pub user_id: Option<String>,
  pub period:  Option<String>,
  pub kind:    Option<String>,
  pub limit:   Option<usize>,
  pub offset:  Option<usize>,
}

/// `GET /api/entries`
pub async fn list<S>(
  State(state): State<AppState<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<AccessRecord>>, ApiError>
where
  S: RecordStore + Clone + Send + Sync + 'static,
{
  let period = params
    .period
    .as_deref()
    .map(Period::parse)
    .transpose()
    .map_err(|e| ApiError::BadRequest(e.to_string()))?;

  let query = RecordQuery {
    date: params.date,
    user_id: params.user_id,
    period,
    person_kind: params.kind,
    limit: params.limit,
    offset: params.offset,
  };
  let records = state.store.list_records(&query).await.map_err(ApiError::store)?;
  Ok(Json(records))
}

// ─── Statistics ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct StatisticsParams {
  pub date: Option<NaiveDate>,
}

/// `GET /api/statistics[?date=YYYY-MM-DD]`
pub async fn statistics<S>(
  State(state): State<AppState<S>>,
  Query(params): Query<StatisticsParams>,
) -> Result<Json<DailyStatistics>, ApiError>
where
  S: RecordStore + Clone + Send + Sync + 'static,
{
  let date = params.date.unwrap_or_else(today);
  let statistics = state.store.daily_statistics(date).await.map_err(ApiError::store)?;
  Ok(Json(statistics))
}
