//! Access records. One entrance or exit through the front desk or turnstile.
//!
//! Records are immutable once persisted. Daily statistics are never stored;
//! they are recomputed from the records on every request.

use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Direction ───────────────────────────────────────────────────────────────

/// Whether a record marks someone coming in or going out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
  Entrance,
  Exit,
}

impl Direction {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Entrance => "ENTRANCE",
      Self::Exit => "EXIT",
    }
  }

  pub fn parse(s: &str) -> crate::Result<Self> {
    match s {
      "ENTRANCE" => Ok(Self::Entrance),
      "EXIT" => Ok(Self::Exit),
      other => Err(crate::Error::UnknownDirection(other.to_owned())),
    }
  }
}

// ─── Period ──────────────────────────────────────────────────────────────────

/// The school shift a record falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Period {
  #[serde(rename = "MANHA")]
  Morning,
  #[serde(rename = "TARDE")]
  Afternoon,
  #[serde(rename = "NOITE")]
  Night,
}

impl Period {
  /// Shift boundaries: before noon is morning, before 18:00 is afternoon.
  pub fn from_time(time: NaiveTime) -> Self {
    match time.hour() {
      0..12 => Self::Morning,
      12..18 => Self::Afternoon,
      _ => Self::Night,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Morning => "MANHA",
      Self::Afternoon => "TARDE",
      Self::Night => "NOITE",
    }
  }

  pub fn parse(s: &str) -> crate::Result<Self> {
    match s.to_ascii_uppercase().as_str() {
      "MANHA" => Ok(Self::Morning),
      "TARDE" => Ok(Self::Afternoon),
      "NOITE" => Ok(Self::Night),
      _ => Err(crate::Error::UnknownPeriod(s.to_owned())),
    }
  }
}

// ─── AccessRecord ────────────────────────────────────────────────────────────

/// A persisted entrance or exit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessRecord {
  pub id:          Uuid,
  pub user_id:     String,
  /// Badge or enrollment number printed on the student/staff card.
  pub identifier:  String,
  pub name:        String,
  /// Free-form category of the person, e.g. `ALUNO`, `VISITANTE`.
  pub person_kind: String,
  pub period:      Period,
  pub entry_date:  NaiveDate,
  pub time:        NaiveTime,
  pub direction:   Direction,
  /// Server-assigned; orders records within a day.
  pub created_at:  DateTime<Utc>,
}

/// Input to [`crate::store::RecordStore::record_access`].
///
/// `id` and `created_at` are always assigned by the store. Date, time, and
/// period default to the moment of recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccessRecord {
  pub user_id:     String,
  pub identifier:  String,
  pub name:        String,
  #[serde(default = "default_person_kind")]
  pub person_kind: String,
  pub direction:   Direction,
  #[serde(default)]
  pub period:      Option<Period>,
  #[serde(default)]
  pub entry_date:  Option<NaiveDate>,
  #[serde(default)]
  pub time:        Option<NaiveTime>,
}

impl NewAccessRecord {
  pub fn new(
    user_id: impl Into<String>,
    identifier: impl Into<String>,
    name: impl Into<String>,
    direction: Direction,
  ) -> Self {
    Self {
      user_id: user_id.into(),
      identifier: identifier.into(),
      name: name.into(),
      person_kind: default_person_kind(),
      direction,
      period: None,
      entry_date: None,
      time: None,
    }
  }
}

fn default_person_kind() -> String { "VISITANTE".to_owned() }

// ─── DailyStatistics ─────────────────────────────────────────────────────────

/// Aggregate counts for one calendar day, computed at read time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyStatistics {
  pub total:     u64,
  pub entrances: u64,
  pub exits:     u64,
  pub as_of:     DateTime<Utc>,
}

impl DailyStatistics {
  pub fn empty(as_of: DateTime<Utc>) -> Self {
    Self { total: 0, entrances: 0, exits: 0, as_of }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn period_boundaries() {
    let at = |h| NaiveTime::from_hms_opt(h, 0, 0).unwrap();
    assert_eq!(Period::from_time(at(0)), Period::Morning);
    assert_eq!(Period::from_time(at(11)), Period::Morning);
    assert_eq!(Period::from_time(at(12)), Period::Afternoon);
    assert_eq!(Period::from_time(at(17)), Period::Afternoon);
    assert_eq!(Period::from_time(at(18)), Period::Night);
    assert_eq!(Period::from_time(at(23)), Period::Night);
  }

  #[test]
  fn period_parse_is_case_insensitive() {
    assert_eq!(Period::parse("tarde").unwrap(), Period::Afternoon);
    assert!(Period::parse("madrugada").is_err());
  }

  #[test]
  fn record_serialises_camel_case() {
    let record = AccessRecord {
      id:          Uuid::nil(),
      user_id:     "42".into(),
      identifier:  "2024001".into(),
      name:        "Ana".into(),
      person_kind: "ALUNO".into(),
      period:      Period::Morning,
      entry_date:  NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
      time:        NaiveTime::from_hms_opt(7, 30, 0).unwrap(),
      direction:   Direction::Exit,
      created_at:  Utc::now(),
    };
    let json = serde_json::to_value(&record).unwrap();
    assert_eq!(json["userId"], "42");
    assert_eq!(json["direction"], "EXIT");
    assert_eq!(json["period"], "MANHA");
    assert_eq!(json["entryDate"], "2024-03-01");
  }
}
