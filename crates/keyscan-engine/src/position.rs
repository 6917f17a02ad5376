//! Durable per-namespace scan positions.
//!
//! A position is the key of the last record known to be acknowledged.
//! Resuming from position `c` scans keys strictly greater than `c`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use keyscan_state::StateBackend;
use keyscan_types::state::{JobName, PositionState, RunStats, RunStatus};
use keyscan_types::{Key, Namespace};
use tokio::sync::Mutex;

use crate::errors::{Result, ScanError};

/// Job-scoped view of persisted positions.
///
/// Loaded once by [`start`](Self::start), then advanced only through
/// [`commit`](Self::commit). Commits are serialized and monotonic per
/// namespace, so a position never moves backwards.
pub struct PositionCache {
    backend: Arc<dyn StateBackend>,
    job: JobName,
    key_field: Option<String>,
    positions: Mutex<HashMap<Namespace, Key>>,
    started: AtomicBool,
}

impl PositionCache {
    #[must_use]
    pub fn new(backend: Arc<dyn StateBackend>, job: impl Into<JobName>) -> Self {
        Self {
            backend,
            job: job.into(),
            key_field: None,
            positions: Mutex::new(HashMap::new()),
            started: AtomicBool::new(false),
        }
    }

    /// Record `key_field` alongside every committed position.
    #[must_use]
    pub fn with_key_field(mut self, key_field: impl Into<String>) -> Self {
        self.key_field = Some(key_field.into());
        self
    }

    #[must_use]
    pub fn job(&self) -> &JobName {
        &self.job
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    async fn run_blocking<T, F>(&self, op: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(&dyn StateBackend, &JobName) -> keyscan_state::error::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let backend = Arc::clone(&self.backend);
        let job = self.job.clone();
        tokio::task::spawn_blocking(move || f(backend.as_ref(), &job))
            .await
            .map_err(|e| ScanError::Internal(format!("{op} task panicked: {e}")))?
            .map_err(ScanError::Storage)
    }

    /// Load every persisted position of the job.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Storage`] if the backend cannot be read.
    pub async fn start(&self) -> Result<()> {
        let loaded = self
            .run_blocking("list_positions", |backend, job| backend.list_positions(job))
            .await?;
        let mut positions = self.positions.lock().await;
        positions.clear();
        for (namespace, state) in loaded {
            tracing::debug!(
                job = self.job.as_str(),
                namespace = %namespace,
                key = %state.key,
                "Loaded position"
            );
            positions.insert(namespace, state.key);
        }
        tracing::info!(
            job = self.job.as_str(),
            namespaces = positions.len(),
            "Position cache started"
        );
        self.started.store(true, Ordering::Release);
        Ok(())
    }

    /// The position of `namespace`, or `None` to scan from the beginning.
    pub async fn position(&self, namespace: &Namespace) -> Option<Key> {
        self.positions.lock().await.get(namespace).cloned()
    }

    /// Durably record `key` as the position of `namespace`.
    ///
    /// Returns `false` without writing when `key` does not advance the
    /// current position.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Storage`] if the write fails. The in-memory
    /// position is left unchanged in that case.
    pub async fn commit(&self, namespace: &Namespace, key: Key) -> Result<bool> {
        let mut positions = self.positions.lock().await;
        if positions.get(namespace).is_some_and(|current| key <= *current) {
            tracing::trace!(namespace = %namespace, key = %key, "Position not advanced");
            return Ok(false);
        }

        let state = PositionState {
            key_field: self.key_field.clone(),
            key: key.clone(),
            updated_at: chrono::Utc::now().to_rfc3339(),
        };
        let ns = namespace.clone();
        self.run_blocking("set_position", move |backend, job| {
            backend.set_position(job, &ns, &state)
        })
        .await?;

        tracing::debug!(
            job = self.job.as_str(),
            namespace = %namespace,
            key = %key,
            "Position committed"
        );
        positions.insert(namespace.clone(), key);
        Ok(true)
    }

    /// Open a run-history record.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Storage`] if the backend write fails.
    pub async fn begin_run(&self) -> Result<i64> {
        self.run_blocking("start_run", |backend, job| backend.start_run(job))
            .await
    }

    /// Close a run-history record.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Storage`] if the backend write fails.
    pub async fn finish_run(&self, run_id: i64, status: RunStatus, stats: RunStats) -> Result<()> {
        self.run_blocking("complete_run", move |backend, _job| {
            backend.complete_run(run_id, status, &stats)
        })
        .await
    }
}
