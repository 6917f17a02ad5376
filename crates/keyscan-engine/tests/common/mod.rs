//! Shared harness for engine integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use keyscan_engine::config::types::ScanConfig;
use keyscan_engine::source::MemorySource;
use keyscan_engine::{
    Batch, EmitError, Emitter, Orchestrator, PositionCache, Router, ScanError, ScanSummary,
};
use keyscan_state::prelude::*;
use tokio::time::Instant;

pub const JOB: &str = "backfill";

pub fn ns() -> Namespace {
    Namespace::new("test", "test")
}

/// Run `fut` on a fresh current-thread runtime with a paused clock.
pub fn block_on<F: Future>(fut: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()
        .expect("test runtime")
        .block_on(fut)
}

pub fn scan_config(batch_size: usize, worker_cnt: usize, chunk_threshold: usize, limit: u32) -> ScanConfig {
    ScanConfig {
        batch_size,
        worker_cnt,
        chunk_threshold,
        batch_per_second_limit: limit,
    }
}

pub fn memory_state() -> Arc<dyn StateBackend> {
    Arc::new(SqliteStateBackend::in_memory().expect("in-memory state"))
}

pub fn stored_position(backend: &Arc<dyn StateBackend>, namespace: &Namespace) -> Option<Key> {
    backend
        .get_position(&JobName::new(JOB), namespace)
        .expect("read position")
        .map(|p| p.key)
}

#[derive(Debug, Clone)]
pub struct Emitted {
    pub namespace: Namespace,
    pub keys: Vec<Key>,
    pub at: Instant,
    pub acked: bool,
}

/// Emitter that records every batch and acknowledges it inline.
#[derive(Default)]
pub struct RecordingEmitter {
    batches: Mutex<Vec<Emitted>>,
    attempts: AtomicUsize,
    closes: AtomicUsize,
    /// 1-based attempt number that is rejected.
    pub reject_at: Option<usize>,
    /// 1-based attempt number whose ack is dropped unresolved.
    pub drop_ack_at: Option<usize>,
    /// Resolve acks as `Dropped` instead of `Relayed`.
    pub drop_deliveries: bool,
}

impl RecordingEmitter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn rejecting_at(attempt: usize) -> Arc<Self> {
        Arc::new(Self {
            reject_at: Some(attempt),
            ..Self::default()
        })
    }

    pub fn dropping_ack_at(attempt: usize) -> Arc<Self> {
        Arc::new(Self {
            drop_ack_at: Some(attempt),
            ..Self::default()
        })
    }

    pub fn dropping_deliveries() -> Arc<Self> {
        Arc::new(Self {
            drop_deliveries: true,
            ..Self::default()
        })
    }

    pub fn batches(&self) -> Vec<Emitted> {
        self.batches.lock().unwrap().clone()
    }

    pub fn keys(&self) -> Vec<Key> {
        self.batches().into_iter().flat_map(|b| b.keys).collect()
    }

    pub fn acked_keys(&self) -> Vec<Key> {
        self.batches()
            .into_iter()
            .filter(|b| b.acked)
            .flat_map(|b| b.keys)
            .collect()
    }

    pub fn keys_for(&self, namespace: &Namespace) -> Vec<Key> {
        self.batches()
            .into_iter()
            .filter(|b| &b.namespace == namespace)
            .flat_map(|b| b.keys)
            .collect()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl Emitter for RecordingEmitter {
    fn emit(&self, batch: Batch) -> Result<(), EmitError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.reject_at == Some(attempt) {
            return Err(EmitError::Rejected(format!("attempt {attempt} rejected")));
        }
        let Batch {
            namespace,
            rows,
            ack,
            ..
        } = batch;
        let drop_ack = self.drop_ack_at == Some(attempt);
        self.batches.lock().unwrap().push(Emitted {
            namespace,
            keys: rows.into_iter().map(|r| r.key).collect(),
            at: Instant::now(),
            acked: !drop_ack,
        });
        if drop_ack {
            drop(ack);
        } else if self.drop_deliveries {
            ack.dropped();
        } else {
            ack.relayed();
        }
        Ok(())
    }

    fn close(&self) -> Result<(), EmitError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn accept_all() -> impl Router {
    |_: &Namespace| true
}

/// Start a run over `source` and wait for it.
pub async fn run_scan(
    source: MemorySource,
    config: ScanConfig,
    router: &dyn Router,
    backend: Arc<dyn StateBackend>,
    emitter: Arc<RecordingEmitter>,
) -> Result<ScanSummary, ScanError> {
    let positions = Arc::new(PositionCache::new(backend, JOB).with_key_field("_id"));
    positions.start().await?;
    let mut orchestrator = Orchestrator::new(config, source);
    orchestrator.start(emitter, router, positions).await?;
    orchestrator.wait().await
}

pub fn sorted(mut keys: Vec<Key>) -> Vec<Key> {
    keys.sort();
    keys
}
