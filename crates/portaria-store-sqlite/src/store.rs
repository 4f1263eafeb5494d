//! [`SqliteStore`], the SQLite implementation of [`RecordStore`].

use std::path::Path;

use chrono::{DateTime, Local, NaiveDate, SubsecRound, Timelike, Utc};
use rusqlite::types::Value;
use uuid::Uuid;

use portaria_core::{
  action_log::{ActionLog, NewActionLog},
  record::{AccessRecord, DailyStatistics, NewAccessRecord, Period},
  store::{ActionLogQuery, RecordQuery, RecordStore},
};

use crate::{
  Result,
  encode::{
    ACTION_LOG_COLUMNS, RECORD_COLUMNS, RawActionLog, RawRecord, encode_date,
    encode_dt, encode_time, encode_uuid,
  },
  schema::SCHEMA,
};

const DEFAULT_LIMIT: usize = 100;

// ─── Store ───────────────────────────────────────────────────────────────────

/// A record store backed by a single SQLite file.
///
/// Cloning is cheap: the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    tracing::debug!("sqlite schema initialised");
    Ok(())
  }

  /// Run a `SELECT` over `access_records` with positional parameters.
  async fn query_records(&self, sql: String, params: Vec<Value>) -> Result<Vec<AccessRecord>> {
    let raws: Vec<RawRecord> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params), RawRecord::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRecord::into_record).collect()
  }
}

/// Timestamps are persisted at microsecond precision.
fn now_micros() -> DateTime<Utc> { Utc::now().trunc_subsecs(6) }

fn sql_int(n: usize) -> Value { Value::Integer(i64::try_from(n).unwrap_or(i64::MAX)) }

// ─── RecordStore impl ────────────────────────────────────────────────────────

impl RecordStore for SqliteStore {
  type Error = crate::Error;

  // ── Access records ────────────────────────────────────────────────────────

  async fn record_access(&self, input: NewAccessRecord) -> Result<AccessRecord> {
    let now = Local::now();
    let time = input
      .time
      .unwrap_or_else(|| now.time().with_nanosecond(0).unwrap_or(now.time()));
    let record = AccessRecord {
      id:          Uuid::new_v4(),
      user_id:     input.user_id,
      identifier:  input.identifier,
      name:        input.name,
      person_kind: input.person_kind,
      period:      input.period.unwrap_or_else(|| Period::from_time(time)),
      entry_date:  input.entry_date.unwrap_or_else(|| now.date_naive()),
      time,
      direction:   input.direction,
      created_at:  now_micros(),
    };

    let values = vec![
      Value::Text(encode_uuid(record.id)),
      Value::Text(record.user_id.clone()),
      Value::Text(record.identifier.clone()),
      Value::Text(record.name.clone()),
      Value::Text(record.person_kind.clone()),
      Value::Text(record.period.as_str().to_owned()),
      Value::Text(encode_date(record.entry_date)),
      Value::Text(encode_time(record.time)),
      Value::Text(record.direction.as_str().to_owned()),
      Value::Text(encode_dt(record.created_at)),
    ];

    self
      .conn
      .call(move |conn| {
        conn.execute(
          &format!(
            "INSERT INTO access_records ({RECORD_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
          ),
          rusqlite::params_from_iter(values),
        )?;
        Ok(())
      })
      .await?;

    Ok(record)
  }

  async fn daily_statistics(&self, date: NaiveDate) -> Result<DailyStatistics> {
    let date_str = encode_date(date);

    let (total, entrances, exits): (i64, i64, i64) = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT COUNT(*),
                  COALESCE(SUM(CASE WHEN direction = 'ENTRANCE' THEN 1 ELSE 0 END), 0),
                  COALESCE(SUM(CASE WHEN direction = 'EXIT' THEN 1 ELSE 0 END), 0)
           FROM access_records
           WHERE entry_date = ?1",
          rusqlite::params![date_str],
          |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?)
      })
      .await?;

    Ok(DailyStatistics {
      total:     total.max(0) as u64,
      entrances: entrances.max(0) as u64,
      exits:     exits.max(0) as u64,
      as_of:     Utc::now(),
    })
  }

  async fn recent_records(&self, date: NaiveDate, limit: usize) -> Result<Vec<AccessRecord>> {
    self
      .query_records(
        format!(
          "SELECT {RECORD_COLUMNS} FROM access_records
           WHERE entry_date = ?1
           ORDER BY created_at DESC, rowid DESC
           LIMIT ?2"
        ),
        vec![Value::Text(encode_date(date)), sql_int(limit)],
      )
      .await
  }

  async fn list_records<'a>(&'a self, query: &'a RecordQuery) -> Result<Vec<AccessRecord>> {
    let mut sql = format!("SELECT {RECORD_COLUMNS} FROM access_records WHERE 1=1");
    let mut params: Vec<Value> = Vec::new();

    if let Some(date) = query.date {
      params.push(Value::Text(encode_date(date)));
      sql.push_str(&format!(" AND entry_date = ?{}", params.len()));
    }
    if let Some(user_id) = &query.user_id {
      params.push(Value::Text(user_id.clone()));
      sql.push_str(&format!(" AND user_id = ?{}", params.len()));
    }
    if let Some(period) = query.period {
      params.push(Value::Text(period.as_str().to_owned()));
      sql.push_str(&format!(" AND period = ?{}", params.len()));
    }
    if let Some(kind) = &query.person_kind {
      params.push(Value::Text(kind.to_uppercase()));
      sql.push_str(&format!(" AND person_kind = ?{}", params.len()));
    }

    params.push(sql_int(query.limit.unwrap_or(DEFAULT_LIMIT)));
    params.push(sql_int(query.offset.unwrap_or(0)));
    sql.push_str(&format!(
      " ORDER BY created_at DESC, rowid DESC LIMIT ?{} OFFSET ?{}",
      params.len() - 1,
      params.len()
    ));

    self.query_records(sql, params).await
  }

  // ── Action log ────────────────────────────────────────────────────────────

  async fn append_action_log(&self, input: NewActionLog) -> Result<ActionLog> {
    let log = ActionLog {
      id:           Uuid::new_v4(),
      subject_id:   input.subject_id,
      identifier:   input.identifier,
      action:       input.action,
      status:       input.status,
      details:      input.details,
      subject_name: input.subject_name,
      recorded_at:  now_micros(),
    };

    let id_str      = encode_uuid(log.id);
    let subject_id  = log.subject_id.clone();
    let identifier  = log.identifier.clone();
    let action      = log.action.clone();
    let status      = log.status.as_str();
    let details     = log.details.clone();
    let name        = log.subject_name.clone();
    let recorded_at = encode_dt(log.recorded_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          &format!(
            "INSERT INTO action_logs ({ACTION_LOG_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
          ),
          rusqlite::params![
            id_str,
            subject_id,
            identifier,
            action,
            status,
            details,
            name,
            recorded_at
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(log)
  }

  async fn list_action_logs<'a>(&'a self, query: &'a ActionLogQuery) -> Result<Vec<ActionLog>> {
    let mut sql = format!("SELECT {ACTION_LOG_COLUMNS} FROM action_logs WHERE 1=1");
    let mut params: Vec<Value> = Vec::new();

    if let Some(subject_id) = &query.subject_id {
      params.push(Value::Text(subject_id.clone()));
      sql.push_str(&format!(" AND subject_id = ?{}", params.len()));
    }
    if let Some(action) = &query.action {
      params.push(Value::Text(format!("%{action}%")));
      sql.push_str(&format!(" AND action LIKE ?{}", params.len()));
    }

    params.push(sql_int(query.limit.unwrap_or(DEFAULT_LIMIT)));
    params.push(sql_int(query.offset.unwrap_or(0)));
    sql.push_str(&format!(
      " ORDER BY recorded_at DESC, rowid DESC LIMIT ?{} OFFSET ?{}",
      params.len() - 1,
      params.len()
    ));

    let raws: Vec<RawActionLog> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params), RawActionLog::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawActionLog::into_action_log).collect()
  }
}
