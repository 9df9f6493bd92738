//! # Record Store
//!
//! SQLite persistence for sterilization records, the audit trail and user accounts.
//!
//! The store follows a connection-per-operation model: every public method opens the
//! database file, does its work (inside a transaction when it writes more than one
//! row) and drops the connection. Methods are synchronous; HTTP handlers call them
//! through `actix_web::web::block` so the async workers never wait on disk.
//!
//! ## Sub-modules:
//! - `records`: create / read / update / delete of `SterilizationRecord`s. Every
//!   write derives the status with `common::status::compute_status` and appends the
//!   matching audit rows in the same transaction.
//! - `audit`: the append-only audit trail. The schema installs triggers that abort
//!   any `UPDATE` or `DELETE` on `audit_log`.
//! - `users`: user accounts keyed by email, role lookup and last-login tracking.

mod audit;
mod records;
mod users;

use chrono::{DateTime, SecondsFormat, Utc};
use log::info;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::error::ApiError;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS records (
    id                TEXT PRIMARY KEY,
    date              TEXT NOT NULL,
    sterilizer        TEXT NOT NULL,
    program           TEXT NOT NULL,
    mechanical        TEXT,
    chemical_external TEXT,
    chemical_internal TEXT,
    bio_test          TEXT,
    status            TEXT NOT NULL,
    slip_image        TEXT,
    attest_image      TEXT,
    equipment         TEXT NOT NULL,
    notes             TEXT NOT NULL,
    sterile_staff     TEXT NOT NULL,
    result_reader     TEXT NOT NULL,
    created_by        TEXT NOT NULL,
    created_at        TEXT NOT NULL,
    updated_at        TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS records_created_at ON records (created_at);

CREATE TABLE IF NOT EXISTS audit_log (
    id          TEXT PRIMARY KEY,
    action      TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    entity_id   TEXT NOT NULL,
    user_id     TEXT NOT NULL,
    user_email  TEXT NOT NULL,
    user_role   TEXT NOT NULL,
    timestamp   TEXT NOT NULL,
    details     TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS audit_log_timestamp ON audit_log (timestamp);
CREATE INDEX IF NOT EXISTS audit_log_entity ON audit_log (entity_id);

CREATE TRIGGER IF NOT EXISTS audit_log_no_update
BEFORE UPDATE ON audit_log
BEGIN
    SELECT RAISE(ABORT, 'audit_log is append-only');
END;
CREATE TRIGGER IF NOT EXISTS audit_log_no_delete
BEFORE DELETE ON audit_log
BEGIN
    SELECT RAISE(ABORT, 'audit_log is append-only');
END;

CREATE TABLE IF NOT EXISTS users (
    id         TEXT PRIMARY KEY,
    email      TEXT NOT NULL UNIQUE,
    full_name  TEXT NOT NULL,
    role       TEXT NOT NULL,
    active     INTEGER NOT NULL,
    last_login TEXT
);
";

/// Handle to the SQLite database. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Store {
    path: Arc<PathBuf>,
}

impl Store {
    /// Opens (or creates) the database at `path` and installs the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ApiError> {
        let store = Store {
            path: Arc::new(path.as_ref().to_path_buf()),
        };
        let conn = store.connect()?;
        conn.execute_batch(SCHEMA)?;
        info!("Record store ready at {}", store.path.display());
        Ok(store)
    }

    pub(crate) fn connect(&self) -> Result<Connection, ApiError> {
        let conn = Connection::open(self.path.as_path())?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(conn)
    }
}

/// Timestamps are stored as fixed-width RFC 3339 strings so text order is time order.
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ApiError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| ApiError::Internal(format!("corrupt timestamp '{}': {}", raw, e)))
}

/// SQLite `LIMIT` value; `-1` means no limit.
pub(crate) fn sql_limit(limit: Option<usize>) -> i64 {
    limit
        .and_then(|l| i64::try_from(l).ok())
        .unwrap_or(-1)
}


#[cfg(test)]
mod tests {
    use super::*;
    use chrono::SubsecRound;

    #[test]
    fn test_open_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("twice.sqlite");
        Store::open(&path).expect("first open");
        Store::open(&path).expect("second open");
    }

    #[test]
    fn test_timestamp_round_trip_keeps_order() {
        let earlier = Utc::now();
        let later = earlier + chrono::Duration::milliseconds(5);
        let (a, b) = (format_timestamp(&earlier), format_timestamp(&later));
        assert!(a < b);
        assert_eq!(parse_timestamp(&a).unwrap(), earlier.trunc_subsecs(6));
    }

    #[test]
    fn test_sql_limit() {
        assert_eq!(sql_limit(None), -1);
        assert_eq!(sql_limit(Some(25)), 25);
    }
}
