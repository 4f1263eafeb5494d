//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings so that text
//! ordering matches chronological ordering. UUIDs are stored hyphenated.

use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Utc};
use portaria_core::{
  action_log::{ActionLog, LogStatus},
  record::{AccessRecord, Direction, Period},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ──────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_time(t: NaiveTime) -> String { t.format("%H:%M:%S").to_string() }

pub fn decode_time(s: &str) -> Result<NaiveTime> {
  NaiveTime::parse_from_str(s, "%H:%M:%S").map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Row types ────────────────────────────────────────────────────────────────

/// An `access_records` row as read from SQLite, before decoding.
pub struct RawRecord {
  pub id:          String,
  pub user_id:     String,
  pub identifier:  String,
  pub name:        String,
  pub person_kind: String,
  pub period:      String,
  pub entry_date:  String,
  pub time:        String,
  pub direction:   String,
  pub created_at:  String,
}

pub const RECORD_COLUMNS: &str = "id, user_id, identifier, name, person_kind, period, \
                                  entry_date, time, direction, created_at";

impl RawRecord {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:          row.get(0)?,
      user_id:     row.get(1)?,
      identifier:  row.get(2)?,
      name:        row.get(3)?,
      person_kind: row.get(4)?,
      period:      row.get(5)?,
      entry_date:  row.get(6)?,
      time:        row.get(7)?,
      direction:   row.get(8)?,
      created_at:  row.get(9)?,
    })
  }

  pub fn into_record(self) -> Result<AccessRecord> {
    Ok(AccessRecord {
      id:          Uuid::parse_str(&self.id)?,
      user_id:     self.user_id,
      identifier:  self.identifier,
      name:        self.name,
      person_kind: self.person_kind,
      period:      Period::parse(&self.period)?,
      entry_date:  decode_date(&self.entry_date)?,
      time:        decode_time(&self.time)?,
      direction:   Direction::parse(&self.direction)?,
      created_at:  decode_dt(&self.created_at)?,
    })
  }
}

/// An `action_logs` row as read from SQLite, before decoding.
pub struct RawActionLog {
  pub id:           String,
  pub subject_id:   Option<String>,
  pub identifier:   Option<String>,
  pub action:       String,
  pub status:       String,
  pub details:      Option<String>,
  pub subject_name: Option<String>,
  pub recorded_at:  String,
}

pub const ACTION_LOG_COLUMNS: &str =
  "id, subject_id, identifier, action, status, details, subject_name, recorded_at";

impl RawActionLog {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:           row.get(0)?,
      subject_id:   row.get(1)?,
      identifier:   row.get(2)?,
      action:       row.get(3)?,
      status:       row.get(4)?,
      details:      row.get(5)?,
      subject_name: row.get(6)?,
      recorded_at:  row.get(7)?,
    })
  }

  pub fn into_action_log(self) -> Result<ActionLog> {
    Ok(ActionLog {
      id:           Uuid::parse_str(&self.id)?,
      subject_id:   self.subject_id,
      identifier:   self.identifier,
      action:       self.action,
      status:       LogStatus::parse(&self.status)?,
      details:      self.details,
      subject_name: self.subject_name,
      recorded_at:  decode_dt(&self.recorded_at)?,
    })
  }
}
