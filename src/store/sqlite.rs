//! `SQLite`-backed implementation of [`RunStore`].
//!
//! Uses a single `Mutex<Connection>` for thread safety.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::RunStore;
use super::error::{self, StoreError};
use crate::result::{RunRecord, StepSummary};
use crate::state_machine::{JobStatus, RunId};

/// Idempotent DDL for the run history table.
const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS job_runs (
    run_id INTEGER PRIMARY KEY,
    job_name TEXT NOT NULL,
    status TEXT NOT NULL,
    started_at TEXT NOT NULL,
    ended_at TEXT,
    steps_json TEXT NOT NULL DEFAULT '[]',
    error_message TEXT
);

CREATE INDEX IF NOT EXISTS idx_job_runs_job ON job_runs (job_name, run_id);
";

const SELECT_COLUMNS: &str =
    "SELECT run_id, job_name, status, started_at, ended_at, steps_json, error_message FROM job_runs";

/// Raw column values of one `job_runs` row.
struct RunRow {
    run_id: i64,
    job_name: String,
    status: String,
    started_at: String,
    ended_at: Option<String>,
    steps_json: String,
    error_message: Option<String>,
}

impl RunRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            run_id: row.get(0)?,
            job_name: row.get(1)?,
            status: row.get(2)?,
            started_at: row.get(3)?,
            ended_at: row.get(4)?,
            steps_json: row.get(5)?,
            error_message: row.get(6)?,
        })
    }

    fn into_record(self) -> error::Result<RunRecord> {
        let run_id = self.run_id;
        let corrupt = |reason: String| StoreError::Corrupt { run_id, reason };

        let status = self.status.parse::<JobStatus>().map_err(corrupt)?;
        let started_at = parse_timestamp(&self.started_at).map_err(corrupt)?;
        let ended_at = self
            .ended_at
            .as_deref()
            .map(parse_timestamp)
            .transpose()
            .map_err(corrupt)?;
        let steps: Vec<StepSummary> = serde_json::from_str(&self.steps_json)?;

        Ok(RunRecord {
            run_id: RunId::new(self.run_id),
            job_name: self.job_name,
            status,
            started_at,
            ended_at,
            steps,
            error: self.error_message,
        })
    }
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| format!("bad timestamp `{raw}`: {e}"))
}

/// `SQLite`-backed run history.
///
/// Create with [`SqliteRunStore::open`] for file-backed persistence
/// or [`SqliteRunStore::in_memory`] for tests.
pub struct SqliteRunStore {
    conn: Mutex<Connection>,
}

impl SqliteRunStore {
    /// Open or create a run store database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the directory can't be created,
    /// or [`StoreError::Sqlite`] if the database can't be opened.
    pub fn open(path: &Path) -> error::Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(CREATE_TABLES)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory run store (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] if the schema can't be created.
    pub fn in_memory() -> error::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CREATE_TABLES)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the connection lock.
    fn lock_conn(&self) -> error::Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Stored record for `run_id`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on storage failure or an unreadable row.
    pub fn get(&self, run_id: RunId) -> error::Result<Option<RunRecord>> {
        let conn = self.lock_conn()?;
        let row = conn
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE run_id = ?1"),
                [run_id.get()],
                RunRow::from_row,
            )
            .optional()?;
        row.map(RunRow::into_record).transpose()
    }
}

impl RunStore for SqliteRunStore {
    fn is_run_id_used(&self, run_id: RunId) -> error::Result<bool> {
        let conn = self.lock_conn()?;
        let used: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM job_runs WHERE run_id = ?1)",
            [run_id.get()],
            |row| row.get(0),
        )?;
        Ok(used)
    }

    fn reserve_run(&self, record: &RunRecord) -> error::Result<bool> {
        let steps_json = serde_json::to_string(&record.steps)?;
        let conn = self.lock_conn()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO job_runs \
             (run_id, job_name, status, started_at, ended_at, steps_json, error_message) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.run_id.get(),
                record.job_name,
                record.status.to_string(),
                format_timestamp(record.started_at),
                record.ended_at.map(format_timestamp),
                steps_json,
                record.error,
            ],
        )?;
        Ok(inserted > 0)
    }

    fn record_run(&self, record: &RunRecord) -> error::Result<()> {
        let steps_json = serde_json::to_string(&record.steps)?;
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO job_runs \
             (run_id, job_name, status, started_at, ended_at, steps_json, error_message) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
             ON CONFLICT(run_id) DO UPDATE SET \
             job_name = ?2, status = ?3, started_at = ?4, ended_at = ?5, \
             steps_json = ?6, error_message = ?7",
            params![
                record.run_id.get(),
                record.job_name,
                record.status.to_string(),
                format_timestamp(record.started_at),
                record.ended_at.map(format_timestamp),
                steps_json,
                record.error,
            ],
        )?;
        Ok(())
    }

    fn last_run_id(&self) -> error::Result<Option<RunId>> {
        let conn = self.lock_conn()?;
        let last: Option<i64> =
            conn.query_row("SELECT MAX(run_id) FROM job_runs", [], |row| row.get(0))?;
        Ok(last.map(RunId::new))
    }

    fn list_runs(&self, limit: usize) -> error::Result<Vec<RunRecord>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY run_id DESC LIMIT ?1"))?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map([limit], RunRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(RunRow::into_record).collect()
    }
}
