//! State backend creation from job configuration.
//!
//! Both backends block on I/O (the Postgres one runs its own runtime), so
//! async callers create, use and drop them on the blocking pool.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use keyscan_state::{PostgresStateBackend, SqliteStateBackend, StateBackend};

use crate::config::types::{StateBackendKind, StateConfig};

/// Default `SQLite` state location: `$HOME/.keyscan/state.db`.
#[must_use]
pub fn default_state_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".keyscan").join("state.db")
}

/// Open the configured state backend.
///
/// # Errors
///
/// Returns an error if the backend cannot be opened or initialized.
pub fn create_state_backend(config: &StateConfig) -> Result<Arc<dyn StateBackend>> {
    match config.backend {
        StateBackendKind::Sqlite => {
            let backend = if let Some(path) = &config.connection {
                SqliteStateBackend::open(Path::new(path)).context("Failed to open state DB")?
            } else {
                SqliteStateBackend::open(&default_state_path())
                    .context("Failed to open default state DB")?
            };
            Ok(Arc::new(backend) as Arc<dyn StateBackend>)
        }
        StateBackendKind::Postgres => {
            let connstr = config
                .connection
                .as_deref()
                .unwrap_or("host=localhost dbname=keyscan_state");
            let backend = PostgresStateBackend::open(connstr)
                .context("Failed to open Postgres state backend")?;
            Ok(Arc::new(backend) as Arc<dyn StateBackend>)
        }
    }
}

/// Open the configured backend and report whether it is usable.
#[must_use]
pub fn check_state_backend(config: &StateConfig) -> bool {
    match create_state_backend(config) {
        Ok(_) => {
            tracing::info!("State backend: OK");
            true
        }
        Err(e) => {
            tracing::error!("State backend: FAILED: {e:#}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyscan_types::state::JobName;
    use tempfile::tempdir;

    #[test]
    fn test_create_state_backend_custom_path() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("state.db");
        let config = StateConfig {
            backend: StateBackendKind::Sqlite,
            connection: Some(db_path.to_string_lossy().to_string()),
        };

        let backend = create_state_backend(&config).unwrap();
        let run_id = backend.start_run(&JobName::new("test")).unwrap();
        assert!(run_id > 0);
        assert!(db_path.exists());
    }

    #[test]
    fn test_check_state_backend_reports_failure() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let config = StateConfig {
            backend: StateBackendKind::Sqlite,
            connection: Some(blocker.join("state.db").to_string_lossy().to_string()),
        };
        assert!(!check_state_backend(&config));
    }

    #[test]
    fn test_default_state_path_under_home() {
        assert!(default_state_path().ends_with(".keyscan/state.db"));
    }
}
