//! Scan error model.
//!
//! Every [`ScanError`] is fatal for the run that produced it: the
//! orchestrator cancels sibling workers and surfaces the first one from
//! `wait`. Retry policy belongs to the emitter's transport, not here.

use keyscan_state::StateError;
use keyscan_types::Namespace;

/// Categorized failure of a scan run.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// The scan configuration is invalid. Raised before any query runs.
    #[error("invalid scan configuration: {0}")]
    Config(String),

    /// The source store could not be reached.
    #[error("source connection failed: {0}")]
    Connection(String),

    /// A chunk fetch failed; continuing would break coverage.
    #[error("query failed for {namespace}: {message}")]
    Query { namespace: Namespace, message: String },

    /// Reading or committing a position failed.
    #[error("position storage failed: {0}")]
    Storage(#[from] StateError),

    /// The emitter rejected a batch or never resolved its acknowledgment.
    #[error("emit failed for {namespace}: {source}")]
    Emit {
        namespace: Namespace,
        #[source]
        source: EmitError,
    },

    /// The emitter failed to release its resources after the run.
    #[error("emitter close failed: {0}")]
    EmitterClose(#[source] EmitError),

    /// The run was stopped by its cancellation token.
    #[error("scan cancelled")]
    Cancelled,

    /// A worker task panicked or an invariant of the engine was broken.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ScanError {
    /// Short category label used in logs and run history.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Connection(_) => "connection",
            Self::Query { .. } => "query",
            Self::Storage(_) => "storage",
            Self::Emit { .. } | Self::EmitterClose(_) => "emit",
            Self::Cancelled => "cancelled",
            Self::Internal(_) => "internal",
        }
    }

    pub(crate) fn query(namespace: &Namespace, message: impl std::fmt::Display) -> Self {
        Self::Query {
            namespace: namespace.clone(),
            message: message.to_string(),
        }
    }
}

/// Failure reported by an [`Emitter`](crate::emitter::Emitter).
#[derive(Debug, thiserror::Error)]
pub enum EmitError {
    /// The downstream sink refused the batch.
    #[error("batch rejected: {0}")]
    Rejected(String),

    /// Writing to the downstream sink failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The batch could not be encoded.
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),

    /// The batch's acknowledgment was dropped without being resolved.
    #[error("acknowledgment dropped without a completion signal")]
    AckDropped,
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, ScanError>;
