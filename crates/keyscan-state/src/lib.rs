//! Checkpoint persistence for keyscan jobs.
//!
//! Provides the [`StateBackend`] trait with [`SqliteStateBackend`] and
//! [`PostgresStateBackend`] implementations for per-namespace scan
//! positions and run history.

#![warn(clippy::pedantic)]

pub mod backend;
pub mod error;
pub mod postgres;
pub mod sqlite;

pub use backend::StateBackend;
pub use error::StateError;
pub use postgres::PostgresStateBackend;
pub use sqlite::SqliteStateBackend;

/// Commonly used types for working with state backends.
pub mod prelude {
    pub use crate::backend::StateBackend;
    pub use crate::error::StateError;
    pub use crate::sqlite::SqliteStateBackend;
    pub use keyscan_types::state::{JobName, PositionState, RunStats, RunStatus};
    pub use keyscan_types::{Key, Namespace};
}
