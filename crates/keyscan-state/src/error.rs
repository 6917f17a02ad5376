//! State backend error types.

/// Errors produced by [`StateBackend`](crate::StateBackend) operations.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// Underlying `SQLite` failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Underlying `PostgreSQL` failure.
    #[error("postgres error: {0}")]
    Postgres(#[from] postgres::Error),

    /// Backend failure annotated with the operation that produced it.
    #[error("{context}: {source}")]
    Backend {
        context: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// File-system I/O failure (e.g. creating the database directory).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored position could not be encoded or decoded.
    #[error("position encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// Internal mutex was poisoned by a panicked thread.
    #[error("state backend lock poisoned")]
    LockPoisoned,
}

impl StateError {
    /// Wrap a backend error with the name of the failing operation.
    pub fn backend_context(
        context: &'static str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Backend {
            context,
            source: Box::new(source),
        }
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, StateError>;
