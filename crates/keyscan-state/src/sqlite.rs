//! `SQLite`-backed implementation of [`StateBackend`].
//!
//! Uses a single `Mutex<Connection>` for thread safety.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{NaiveDateTime, Utc};
use keyscan_types::state::{JobName, PositionState, RunStats, RunStatus};
use keyscan_types::{Key, Namespace};
use rusqlite::{Connection, OptionalExtension};

use crate::backend::StateBackend;
use crate::error::{self, StateError};

/// `SQLite` datetime format (UTC, no timezone suffix).
const SQLITE_DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

/// Idempotent DDL for state tables.
const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS scan_positions (
    job TEXT NOT NULL,
    database_name TEXT NOT NULL,
    collection_name TEXT NOT NULL,
    key_field TEXT,
    key_json TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (job, database_name, collection_name)
);

CREATE TABLE IF NOT EXISTS scan_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job TEXT NOT NULL,
    status TEXT NOT NULL,
    started_at TEXT NOT NULL DEFAULT (datetime('now')),
    finished_at TEXT,
    namespaces_scanned INTEGER DEFAULT 0,
    records_emitted INTEGER DEFAULT 0,
    batches_emitted INTEGER DEFAULT 0,
    error_message TEXT
);
";

/// `SQLite`-backed state storage.
///
/// Create with [`SqliteStateBackend::open`] for file-backed persistence
/// or [`SqliteStateBackend::in_memory`] for tests.
pub struct SqliteStateBackend {
    conn: Mutex<Connection>,
}

impl SqliteStateBackend {
    /// Open or create a `SQLite` state database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Io`] if the directory can't be created,
    /// or [`StateError::Sqlite`] if the database can't be opened.
    pub fn open(path: &Path) -> error::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(CREATE_TABLES)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory `SQLite` backend (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Sqlite`] if the in-memory database can't
    /// be initialized.
    pub fn in_memory() -> error::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CREATE_TABLES)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the connection lock.
    fn lock_conn(&self) -> error::Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StateError::LockPoisoned)
    }

    /// Convert a `SQLite` datetime string to ISO-8601.
    fn sqlite_to_iso8601(raw: &str) -> String {
        NaiveDateTime::parse_from_str(raw, SQLITE_DATETIME_FMT).map_or_else(
            |_| raw.to_string(),
            |ndt| format!("{}Z", ndt.format("%Y-%m-%dT%H:%M:%S")),
        )
    }

    /// Convert an ISO-8601 string to `SQLite` datetime format.
    fn iso8601_to_sqlite(iso: &str) -> String {
        chrono::DateTime::parse_from_rfc3339(iso).map_or_else(
            |_| Utc::now().format(SQLITE_DATETIME_FMT).to_string(),
            |dt| dt.format(SQLITE_DATETIME_FMT).to_string(),
        )
    }

    fn decode_position(
        key_field: Option<String>,
        key_json: &str,
        updated_at: &str,
    ) -> error::Result<PositionState> {
        let key: Key = serde_json::from_str(key_json)?;
        Ok(PositionState {
            key_field,
            key,
            updated_at: Self::sqlite_to_iso8601(updated_at),
        })
    }

    #[cfg(test)]
    fn get_run_row(
        &self,
        run_id: i64,
    ) -> error::Result<(String, i64, Option<String>, Option<String>)> {
        let conn = self.lock_conn()?;
        Ok(conn.query_row(
            "SELECT status, records_emitted, finished_at, error_message FROM scan_runs WHERE id = ?1",
            [run_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?)
    }
}

impl StateBackend for SqliteStateBackend {
    fn get_position(
        &self,
        job: &JobName,
        namespace: &Namespace,
    ) -> error::Result<Option<PositionState>> {
        let conn = self.lock_conn()?;
        let row = conn
            .query_row(
                "SELECT key_field, key_json, updated_at FROM scan_positions \
                 WHERE job = ?1 AND database_name = ?2 AND collection_name = ?3",
                rusqlite::params![job.as_str(), namespace.database, namespace.collection],
                |row| {
                    let key_field: Option<String> = row.get(0)?;
                    let key_json: String = row.get(1)?;
                    let updated_at: String = row.get(2)?;
                    Ok((key_field, key_json, updated_at))
                },
            )
            .optional()?;

        row.map(|(key_field, key_json, updated_at)| {
            Self::decode_position(key_field, &key_json, &updated_at)
        })
        .transpose()
    }

    fn set_position(
        &self,
        job: &JobName,
        namespace: &Namespace,
        position: &PositionState,
    ) -> error::Result<()> {
        let key_json = serde_json::to_string(&position.key)?;
        let updated_at = Self::iso8601_to_sqlite(&position.updated_at);
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO scan_positions \
             (job, database_name, collection_name, key_field, key_json, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
             ON CONFLICT(job, database_name, collection_name) \
             DO UPDATE SET key_field = ?4, key_json = ?5, updated_at = ?6",
            rusqlite::params![
                job.as_str(),
                namespace.database,
                namespace.collection,
                position.key_field,
                key_json,
                updated_at,
            ],
        )
        .map_err(|e| StateError::backend_context("set_position", e))?;
        Ok(())
    }

    fn list_positions(&self, job: &JobName) -> error::Result<Vec<(Namespace, PositionState)>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT database_name, collection_name, key_field, key_json, updated_at \
             FROM scan_positions WHERE job = ?1 \
             ORDER BY database_name, collection_name",
        )?;
        let rows = stmt.query_map([job.as_str()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut positions = Vec::new();
        for row in rows {
            let (database, collection, key_field, key_json, updated_at) = row?;
            positions.push((
                Namespace::new(database, collection),
                Self::decode_position(key_field, &key_json, &updated_at)?,
            ));
        }
        Ok(positions)
    }

    fn start_run(&self, job: &JobName) -> error::Result<i64> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO scan_runs (job, status) VALUES (?1, ?2)",
            rusqlite::params![job.as_str(), RunStatus::Running.as_str()],
        )
        .map_err(|e| StateError::backend_context("start_run", e))?;
        Ok(conn.last_insert_rowid())
    }

    #[allow(clippy::cast_possible_wrap)]
    fn complete_run(&self, run_id: i64, status: RunStatus, stats: &RunStats) -> error::Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "UPDATE scan_runs SET status = ?1, finished_at = datetime('now'), \
             namespaces_scanned = ?2, records_emitted = ?3, batches_emitted = ?4, \
             error_message = ?5 WHERE id = ?6",
            rusqlite::params![
                status.as_str(),
                stats.namespaces_scanned as i64,
                stats.records_emitted as i64,
                stats.batches_emitted as i64,
                stats.error_message,
                run_id,
            ],
        )
        .map_err(|e| StateError::backend_context("complete_run", e))?;
        Ok(())
    }
}
