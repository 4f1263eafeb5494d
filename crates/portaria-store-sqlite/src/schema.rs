//! SQL schema for the Portaria SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- Append-only. Statistics are computed from this table on every read.
CREATE TABLE IF NOT EXISTS access_records (
    id          TEXT PRIMARY KEY,
    user_id     TEXT NOT NULL,
    identifier  TEXT NOT NULL,
    name        TEXT NOT NULL,
    person_kind TEXT NOT NULL,
    period      TEXT NOT NULL,   -- 'MANHA' | 'TARDE' | 'NOITE'
    entry_date  TEXT NOT NULL,   -- YYYY-MM-DD, local calendar day
    time        TEXT NOT NULL,   -- HH:MM:SS
    direction   TEXT NOT NULL,   -- 'ENTRANCE' | 'EXIT'
    created_at  TEXT NOT NULL    -- fixed-width RFC 3339 UTC; sorts lexically
);

CREATE TABLE IF NOT EXISTS action_logs (
    id           TEXT PRIMARY KEY,
    subject_id   TEXT,
    identifier   TEXT,
    action       TEXT NOT NULL,
    status       TEXT NOT NULL,  -- 'SUCCESS' | 'ERROR' | 'STARTED'
    details      TEXT,
    subject_name TEXT,
    recorded_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS access_records_date_idx    ON access_records(entry_date, created_at);
CREATE INDEX IF NOT EXISTS access_records_user_idx    ON access_records(user_id);
CREATE INDEX IF NOT EXISTS action_logs_subject_idx    ON action_logs(subject_id);
CREATE INDEX IF NOT EXISTS action_logs_recorded_idx   ON action_logs(recorded_at);

PRAGMA user_version = 1;
";
