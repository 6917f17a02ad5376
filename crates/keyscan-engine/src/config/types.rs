//! Typed job configuration.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, ScanError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub version: String,
    pub job: String,
    pub source: SourceConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub state: StateConfig,
}

/// Connection descriptor for the Postgres source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub user: String,
    #[serde(default)]
    pub password: String,
    pub database: String,
    /// Schemas to discover tables in. Empty means every non-system schema.
    #[serde(default)]
    pub schemas: Vec<String>,
    #[serde(default = "default_key_field")]
    pub key_field: String,
}

fn default_port() -> u16 {
    5432
}

fn default_key_field() -> String {
    "id".to_string()
}

impl SourceConfig {
    /// libpq-style connection string for `tokio-postgres`.
    #[must_use]
    pub fn connection_string(&self) -> String {
        let connstr = format!(
            "host={} port={} user={} dbname={}",
            self.host, self.port, self.user, self.database
        );
        if self.password.is_empty() {
            connstr
        } else {
            format!("{connstr} password={}", self.password)
        }
    }
}

/// Tuning knobs of one scan run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Rows grouped per emitted batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Parallel extraction lanes per namespace.
    #[serde(default = "default_worker_cnt")]
    pub worker_cnt: usize,
    /// Rows fetched per pagination round.
    #[serde(default = "default_chunk_threshold")]
    pub chunk_threshold: usize,
    /// Batches emitted per rolling second across all workers. 0 = unlimited.
    #[serde(default)]
    pub batch_per_second_limit: u32,
}

fn default_batch_size() -> usize {
    500
}
fn default_worker_cnt() -> usize {
    1
}
fn default_chunk_threshold() -> usize {
    10_000
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            worker_cnt: default_worker_cnt(),
            chunk_threshold: default_chunk_threshold(),
            batch_per_second_limit: 0,
        }
    }
}

impl ScanConfig {
    /// Every bound violation, in field order.
    #[must_use]
    pub fn violations(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.batch_size == 0 {
            errors.push("batch_size must be at least 1".to_string());
        }
        if self.worker_cnt == 0 {
            errors.push("worker_cnt must be at least 1".to_string());
        }
        if self.chunk_threshold == 0 {
            errors.push("chunk_threshold must be at least 1".to_string());
        }
        errors
    }

    /// Check the scan bounds.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Config`] naming every violated bound.
    pub fn validate(&self) -> Result<()> {
        let errors = self.violations();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ScanError::Config(errors.join("; ")))
        }
    }
}

/// Namespace include/exclude patterns (`db.table`, `db.*`, `*`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateBackendKind {
    #[default]
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default)]
    pub backend: StateBackendKind,
    pub connection: Option<String>,
}
