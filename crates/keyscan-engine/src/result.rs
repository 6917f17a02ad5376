//! Scan run result types.

use keyscan_types::{Key, Namespace};

/// Counts reported by one worker for its partition.
#[derive(Debug, Clone)]
pub(crate) struct PartitionReport {
    pub(crate) namespace: Namespace,
    pub(crate) records_emitted: u64,
    pub(crate) batches_emitted: u64,
    pub(crate) chunks: u64,
}

/// Per-namespace outcome of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceSummary {
    pub namespace: Namespace,
    pub partitions: usize,
    pub records_emitted: u64,
    pub batches_emitted: u64,
    pub chunks: u64,
    /// Position the run resumed after, if any.
    pub resumed_from: Option<Key>,
}

/// Result of a completed run.
#[derive(Debug, Clone, Default)]
pub struct ScanSummary {
    pub namespaces: Vec<NamespaceSummary>,
    pub records_emitted: u64,
    pub batches_emitted: u64,
    pub duration_secs: f64,
}

impl ScanSummary {
    /// Summary of one namespace, if it was scanned.
    #[must_use]
    pub fn namespace(&self, namespace: &Namespace) -> Option<&NamespaceSummary> {
        self.namespaces.iter().find(|s| &s.namespace == namespace)
    }
}
