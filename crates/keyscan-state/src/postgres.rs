//! `PostgreSQL`-backed implementation of [`StateBackend`].
//!
//! Uses the sync `postgres` crate with a single `Mutex<Client>` for
//! thread safety. The `postgres` crate drives its own internal runtime,
//! so callers inside tokio must invoke it from the blocking pool.

use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use keyscan_types::state::{JobName, PositionState, RunStats, RunStatus};
use keyscan_types::{Key, Namespace};
use postgres::{Client, NoTls};

use crate::backend::StateBackend;
use crate::error::{self, StateError};

/// Idempotent DDL for state tables (`PostgreSQL` dialect).
const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS scan_positions (
    job TEXT NOT NULL,
    database_name TEXT NOT NULL,
    collection_name TEXT NOT NULL,
    key_field TEXT,
    key_json TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (now()::text),
    PRIMARY KEY (job, database_name, collection_name)
);

CREATE TABLE IF NOT EXISTS scan_runs (
    id BIGSERIAL PRIMARY KEY,
    job TEXT NOT NULL,
    status TEXT NOT NULL,
    started_at TEXT NOT NULL DEFAULT (now()::text),
    finished_at TEXT,
    namespaces_scanned BIGINT DEFAULT 0,
    records_emitted BIGINT DEFAULT 0,
    batches_emitted BIGINT DEFAULT 0,
    error_message TEXT
);
";

/// `PostgreSQL`-backed state storage.
///
/// Create with [`PostgresStateBackend::open`] providing a libpq-style
/// connection string (e.g. `"host=localhost dbname=keyscan user=postgres"`).
pub struct PostgresStateBackend {
    client: Mutex<Client>,
}

impl PostgresStateBackend {
    /// Connect to a `PostgreSQL` database and initialize state tables.
    ///
    /// `connstr` is a libpq-style connection string or `PostgreSQL` URI:
    /// - `"host=localhost port=5432 dbname=keyscan user=postgres"`
    /// - `"postgresql://postgres@localhost/keyscan"`
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Postgres`] if connection or DDL execution fails.
    pub fn open(connstr: &str) -> error::Result<Self> {
        let mut client = Client::connect(connstr, NoTls)?;
        client.batch_execute(CREATE_TABLES)?;
        Ok(Self {
            client: Mutex::new(client),
        })
    }

    /// Acquire the client lock.
    fn lock_client(&self) -> error::Result<MutexGuard<'_, Client>> {
        self.client.lock().map_err(|_| StateError::LockPoisoned)
    }

    fn decode_position(
        key_field: Option<String>,
        key_json: &str,
        updated_at: String,
    ) -> error::Result<PositionState> {
        let key: Key = serde_json::from_str(key_json)?;
        Ok(PositionState {
            key_field,
            key,
            updated_at,
        })
    }
}

impl StateBackend for PostgresStateBackend {
    fn get_position(
        &self,
        job: &JobName,
        namespace: &Namespace,
    ) -> error::Result<Option<PositionState>> {
        let mut client = self.lock_client()?;
        let rows = client.query(
            "SELECT key_field, key_json, updated_at FROM scan_positions \
             WHERE job = $1 AND database_name = $2 AND collection_name = $3",
            &[&job.as_str(), &namespace.database, &namespace.collection],
        )?;

        match rows.first() {
            Some(row) => {
                let key_json: String = row.get(1);
                Self::decode_position(row.get(0), &key_json, row.get(2)).map(Some)
            }
            None => Ok(None),
        }
    }

    fn set_position(
        &self,
        job: &JobName,
        namespace: &Namespace,
        position: &PositionState,
    ) -> error::Result<()> {
        let key_json = serde_json::to_string(&position.key)?;
        let mut client = self.lock_client()?;
        client
            .execute(
                "INSERT INTO scan_positions \
                 (job, database_name, collection_name, key_field, key_json, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6) \
                 ON CONFLICT (job, database_name, collection_name) \
                 DO UPDATE SET key_field = $4, key_json = $5, updated_at = $6",
                &[
                    &job.as_str(),
                    &namespace.database,
                    &namespace.collection,
                    &position.key_field,
                    &key_json,
                    &position.updated_at,
                ],
            )
            .map_err(|e| StateError::backend_context("set_position", e))?;
        Ok(())
    }

    fn list_positions(&self, job: &JobName) -> error::Result<Vec<(Namespace, PositionState)>> {
        let mut client = self.lock_client()?;
        let rows = client.query(
            "SELECT database_name, collection_name, key_field, key_json, updated_at \
             FROM scan_positions WHERE job = $1 \
             ORDER BY database_name, collection_name",
            &[&job.as_str()],
        )?;

        rows.iter()
            .map(|row| {
                let namespace = Namespace::new(row.get::<_, String>(0), row.get::<_, String>(1));
                let key_json: String = row.get(3);
                let position = Self::decode_position(row.get(2), &key_json, row.get(4))?;
                Ok((namespace, position))
            })
            .collect()
    }

    fn start_run(&self, job: &JobName) -> error::Result<i64> {
        let mut client = self.lock_client()?;
        let row = client
            .query_one(
                "INSERT INTO scan_runs (job, status) VALUES ($1, $2) RETURNING id",
                &[&job.as_str(), &RunStatus::Running.as_str()],
            )
            .map_err(|e| StateError::backend_context("start_run", e))?;
        Ok(row.get(0))
    }

    #[allow(clippy::cast_possible_wrap)]
    fn complete_run(&self, run_id: i64, status: RunStatus, stats: &RunStats) -> error::Result<()> {
        let mut client = self.lock_client()?;
        client
            .execute(
                "UPDATE scan_runs SET status = $1, finished_at = now()::text, \
                 namespaces_scanned = $2, records_emitted = $3, batches_emitted = $4, \
                 error_message = $5 WHERE id = $6",
                &[
                    &status.as_str(),
                    &(stats.namespaces_scanned as i64),
                    &(stats.records_emitted as i64),
                    &(stats.batches_emitted as i64),
                    &stats.error_message,
                    &run_id,
                ],
            )
            .map_err(|e| StateError::backend_context("complete_run", e))?;
        Ok(())
    }
}
