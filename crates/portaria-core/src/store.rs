//! The `RecordStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g. `portaria-store-sqlite`).
//! The hub and its REST surface depend on this abstraction, not on any
//! concrete backend. The store is the system of record; the hub only relays.

use std::future::Future;

use chrono::NaiveDate;

use crate::{
  action_log::{ActionLog, NewActionLog},
  record::{AccessRecord, DailyStatistics, NewAccessRecord, Period},
};

// ─── Query types ─────────────────────────────────────────────────────────────

/// Parameters for [`RecordStore::list_records`].
#[derive(Debug, Clone, Default)]
pub struct RecordQuery {
  /// Restrict to one calendar day.
  pub date:        Option<NaiveDate>,
  pub user_id:     Option<String>,
  pub period:      Option<Period>,
  pub person_kind: Option<String>,
  pub limit:       Option<usize>,
  pub offset:      Option<usize>,
}

/// Parameters for [`RecordStore::list_action_logs`].
#[derive(Debug, Clone, Default)]
pub struct ActionLogQuery {
  pub subject_id: Option<String>,
  /// Case-insensitive substring match on the action code.
  pub action:     Option<String>,
  pub limit:      Option<usize>,
  pub offset:     Option<usize>,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the access-record store.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait RecordStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Access records ────────────────────────────────────────────────────

  /// Persist an entrance or exit. The id and `created_at` are assigned by
  /// the store.
  fn record_access(
    &self,
    input: NewAccessRecord,
  ) -> impl Future<Output = Result<AccessRecord, Self::Error>> + Send + '_;

  /// Counts for `date`, recomputed from the records on every call.
  fn daily_statistics(
    &self,
    date: NaiveDate,
  ) -> impl Future<Output = Result<DailyStatistics, Self::Error>> + Send + '_;

  /// The `limit` most recent records of `date`, newest first.
  fn recent_records(
    &self,
    date: NaiveDate,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<AccessRecord>, Self::Error>> + Send + '_;

  /// Filtered listing, newest first.
  fn list_records<'a>(
    &'a self,
    query: &'a RecordQuery,
  ) -> impl Future<Output = Result<Vec<AccessRecord>, Self::Error>> + Send + 'a;

  // ── Action log ────────────────────────────────────────────────────────

  fn append_action_log(
    &self,
    input: NewActionLog,
  ) -> impl Future<Output = Result<ActionLog, Self::Error>> + Send + '_;

  /// Filtered listing, newest first.
  fn list_action_logs<'a>(
    &'a self,
    query: &'a ActionLogQuery,
  ) -> impl Future<Output = Result<Vec<ActionLog>, Self::Error>> + Send + 'a;
}
