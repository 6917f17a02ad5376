//! State backend trait definition.
//!
//! [`StateBackend`] defines the storage contract for per-namespace scan
//! positions and run history. Model types live in
//! [`keyscan_types::state`].

use keyscan_types::state::{JobName, PositionState, RunStats, RunStatus};
use keyscan_types::Namespace;

use crate::error;

/// Storage contract for job state.
///
/// Implementations must be `Send + Sync` for use behind `Arc<dyn StateBackend>`.
/// All methods block; async callers run them on the blocking pool.
pub trait StateBackend: Send + Sync {
    /// Read the position for a (job, namespace) pair.
    ///
    /// Returns `Ok(None)` when no position has been persisted yet.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn get_position(
        &self,
        job: &JobName,
        namespace: &Namespace,
    ) -> error::Result<Option<PositionState>>;

    /// Upsert the position for a (job, namespace) pair.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn set_position(
        &self,
        job: &JobName,
        namespace: &Namespace,
        position: &PositionState,
    ) -> error::Result<()>;

    /// Every persisted position for `job`, ordered by namespace.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn list_positions(&self, job: &JobName) -> error::Result<Vec<(Namespace, PositionState)>>;

    /// Begin a new scan run, returning its unique ID.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn start_run(&self, job: &JobName) -> error::Result<i64>;

    /// Finalize a scan run with status and aggregate stats.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn complete_run(&self, run_id: i64, status: RunStatus, stats: &RunStats)
        -> error::Result<()>;
}
