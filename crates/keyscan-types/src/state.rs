//! State backend model types.
//!
//! Pure data types used by `StateBackend` implementations.

use serde::{Deserialize, Serialize};

use crate::key::Key;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Name of a backfill job. Checkpoints and run history are scoped by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobName(String);

impl JobName {
    /// Create a new job name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrow the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S: Into<String>> From<S> for JobName {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

// ---------------------------------------------------------------------------
// Run tracking
// ---------------------------------------------------------------------------

/// Terminal status of a scan run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    /// Wire-format string for storage.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate statistics for a finished scan run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub namespaces_scanned: u64,
    pub records_emitted: u64,
    pub batches_emitted: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

// ---------------------------------------------------------------------------
// Position state
// ---------------------------------------------------------------------------

/// Snapshot of a persisted position for a (job, namespace) pair.
///
/// `updated_at` is an ISO-8601 UTC string (e.g. `"2026-01-15T10:00:00Z"`).
/// Backends handle timestamp formatting internally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionState {
    /// Name of the key field the position refers to (e.g. `"id"`).
    pub key_field: Option<String>,
    /// Highest key whose records are all acknowledged.
    pub key: Key,
    /// ISO-8601 UTC timestamp of when this position was last written.
    pub updated_at: String,
}
