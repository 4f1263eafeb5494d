//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{NaiveDate, NaiveTime};
use portaria_core::{
  action_log::{LogStatus, NewActionLog},
  record::{Direction, NewAccessRecord, Period},
  store::{ActionLogQuery, RecordQuery, RecordStore},
};

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn day() -> NaiveDate { NaiveDate::from_ymd_opt(2024, 5, 6).unwrap() }

fn record_on(date: NaiveDate, user: &str, direction: Direction) -> NewAccessRecord {
  let mut input = NewAccessRecord::new(user, format!("ID-{user}"), format!("User {user}"), direction);
  input.entry_date = Some(date);
  input.time = Some(NaiveTime::from_hms_opt(9, 15, 0).unwrap());
  input
}

fn log(subject: &str, action: &str, status: LogStatus) -> NewActionLog {
  NewActionLog {
    subject_id:   Some(subject.to_owned()),
    identifier:   Some(format!("ID-{subject}")),
    action:       action.to_owned(),
    status,
    details:      None,
    subject_name: Some(format!("User {subject}")),
  }
}

// ─── Access records ──────────────────────────────────────────────────────────

#[tokio::test]
async fn record_access_assigns_id_and_defaults_period() {
  let s = store().await;

  let mut input = record_on(day(), "1", Direction::Entrance);
  input.time = Some(NaiveTime::from_hms_opt(14, 0, 0).unwrap());
  let record = s.record_access(input).await.unwrap();

  assert_eq!(record.period, Period::Afternoon);
  assert_eq!(record.entry_date, day());
  assert_eq!(record.direction, Direction::Entrance);

  let listed = s.list_records(&RecordQuery::default()).await.unwrap();
  assert_eq!(listed, vec![record]);
}

#[tokio::test]
async fn explicit_period_is_kept() {
  let s = store().await;
  let mut input = record_on(day(), "1", Direction::Exit);
  input.period = Some(Period::Night);
  let record = s.record_access(input).await.unwrap();
  assert_eq!(record.period, Period::Night);
}

#[tokio::test]
async fn daily_statistics_counts_only_that_day() {
  let s = store().await;
  let other_day = NaiveDate::from_ymd_opt(2024, 5, 7).unwrap();

  s.record_access(record_on(day(), "1", Direction::Entrance)).await.unwrap();
  s.record_access(record_on(day(), "2", Direction::Entrance)).await.unwrap();
  s.record_access(record_on(day(), "1", Direction::Exit)).await.unwrap();
  s.record_access(record_on(other_day, "3", Direction::Entrance)).await.unwrap();

  let stats = s.daily_statistics(day()).await.unwrap();
  assert_eq!((stats.total, stats.entrances, stats.exits), (3, 2, 1));

  let stats = s.daily_statistics(other_day).await.unwrap();
  assert_eq!((stats.total, stats.entrances, stats.exits), (1, 1, 0));
}

#[tokio::test]
async fn daily_statistics_on_empty_day_is_zero() {
  let s = store().await;
  let stats = s.daily_statistics(day()).await.unwrap();
  assert_eq!((stats.total, stats.entrances, stats.exits), (0, 0, 0));
}

#[tokio::test]
async fn recent_records_newest_first_and_limited() {
  let s = store().await;
  let mut ids = Vec::new();
  for i in 0..7 {
    let r = s
      .record_access(record_on(day(), &i.to_string(), Direction::Entrance))
      .await
      .unwrap();
    ids.push(r.id);
  }

  let recent = s.recent_records(day(), 5).await.unwrap();
  assert_eq!(recent.len(), 5);
  let expected: Vec<_> = ids.iter().rev().take(5).copied().collect();
  let got: Vec<_> = recent.iter().map(|r| r.id).collect();
  assert_eq!(got, expected);
}

#[tokio::test]
async fn list_records_filters() {
  let s = store().await;
  let other_day = NaiveDate::from_ymd_opt(2024, 5, 7).unwrap();

  s.record_access(record_on(day(), "1", Direction::Entrance)).await.unwrap();
  s.record_access(record_on(day(), "2", Direction::Entrance)).await.unwrap();
  s.record_access(record_on(other_day, "1", Direction::Exit)).await.unwrap();

  let by_user = s
    .list_records(&RecordQuery { user_id: Some("1".into()), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(by_user.len(), 2);
  assert!(by_user.iter().all(|r| r.user_id == "1"));

  let by_day = s
    .list_records(&RecordQuery { date: Some(other_day), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(by_day.len(), 1);

  let by_period = s
    .list_records(&RecordQuery { period: Some(Period::Night), ..Default::default() })
    .await
    .unwrap();
  assert!(by_period.is_empty());

  let paged = s
    .list_records(&RecordQuery { limit: Some(1), offset: Some(1), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(paged.len(), 1);
  assert_eq!(paged[0].user_id, "2");
}

// ─── Action log ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn append_and_list_action_logs() {
  let s = store().await;

  s.append_action_log(log("7", "CRIAR_USUARIO", LogStatus::Success)).await.unwrap();
  let enrolled = s
    .append_action_log(log("7", "CADASTRAR_BIOMETRIA", LogStatus::Error))
    .await
    .unwrap();
  s.append_action_log(log("8", "CADASTRAR_BIOMETRIA", LogStatus::Success)).await.unwrap();

  let all = s.list_action_logs(&ActionLogQuery::default()).await.unwrap();
  assert_eq!(all.len(), 3);
  assert_eq!(all[1], enrolled);

  let for_seven = s
    .list_action_logs(&ActionLogQuery { subject_id: Some("7".into()), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(for_seven.len(), 2);

  let biometry = s
    .list_action_logs(&ActionLogQuery { action: Some("biometria".into()), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(biometry.len(), 2);
  assert!(biometry.iter().all(|l| l.action == "CADASTRAR_BIOMETRIA"));
}

#[tokio::test]
async fn action_log_optional_fields_round_trip_as_none() {
  let s = store().await;
  let appended = s
    .append_action_log(NewActionLog {
      subject_id:   None,
      identifier:   None,
      action:       "LOGIN".into(),
      status:       LogStatus::Started,
      details:      None,
      subject_name: None,
    })
    .await
    .unwrap();

  let listed = s.list_action_logs(&ActionLogQuery::default()).await.unwrap();
  assert_eq!(listed, vec![appended]);
}
