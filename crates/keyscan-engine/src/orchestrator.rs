//! Run lifecycle: resolve namespaces, resume, partition, spawn, drain.

use std::sync::Arc;
use std::time::Instant;

use keyscan_types::state::{RunStats, RunStatus};
use keyscan_types::{Key, KeyRange, Namespace};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::types::ScanConfig;
use crate::emitter::Emitter;
use crate::errors::{Result, ScanError};
use crate::partition::{plan_partitions, Partition};
use crate::position::PositionCache;
use crate::progress::NamespaceProgress;
use crate::rate_limit::RateLimiter;
use crate::result::{NamespaceSummary, PartitionReport, ScanSummary};
use crate::router::Router;
use crate::source::{Source, SourceSession};
use crate::worker::Worker;

struct NamespacePlan {
    namespace: Namespace,
    partitions: usize,
    resumed_from: Option<Key>,
}

struct RunningScan {
    tasks: JoinSet<Result<PartitionReport>>,
    plans: Vec<NamespacePlan>,
    emitter: Arc<dyn Emitter>,
    positions: Arc<PositionCache>,
    run_id: i64,
    started_at: Instant,
}

/// Drives one scan run over every accepted namespace of a source.
///
/// [`start`](Self::start) returns once workers are launched;
/// [`wait`](Self::wait) blocks until they drain. The first fatal worker
/// error cancels every sibling.
pub struct Orchestrator<S: Source> {
    config: ScanConfig,
    source: Arc<S>,
    cancel: CancellationToken,
    running: Option<RunningScan>,
}

impl<S: Source> Orchestrator<S> {
    #[must_use]
    pub fn new(config: ScanConfig, source: S) -> Self {
        Self {
            config,
            source: Arc::new(source),
            cancel: CancellationToken::new(),
            running: None,
        }
    }

    /// Token that stops the run when cancelled.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request a stop. In-flight batches are abandoned without committing.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Validate, resolve namespaces and launch workers.
    ///
    /// # Errors
    ///
    /// Returns `Config`, `Connection`, `Query` or `Storage` errors raised
    /// during setup. Workers launched before the failure are stopped.
    pub async fn start(
        &mut self,
        emitter: Arc<dyn Emitter>,
        router: &dyn Router,
        positions: Arc<PositionCache>,
    ) -> Result<()> {
        if self.running.is_some() {
            return Err(ScanError::Internal("scan already started".to_string()));
        }
        self.config.validate()?;
        if !positions.is_started() {
            positions.start().await?;
        }

        let namespaces: Vec<Namespace> = self
            .source
            .list_namespaces()
            .await?
            .into_iter()
            .filter(|namespace| {
                let accepted = router.exists(namespace);
                if !accepted {
                    tracing::debug!(namespace = %namespace, "Namespace skipped by router");
                }
                accepted
            })
            .collect();

        let run_id = positions.begin_run().await?;
        let limiter = Arc::new(RateLimiter::new(self.config.batch_per_second_limit));
        let mut tasks = JoinSet::new();
        let mut plans = Vec::with_capacity(namespaces.len());

        for namespace in namespaces {
            let (resumed_from, partitions) = match self.plan_namespace(&namespace, &positions).await
            {
                Ok(planned) => planned,
                Err(error) => {
                    self.cancel.cancel();
                    tasks.shutdown().await;
                    let stats = RunStats {
                        error_message: Some(error.to_string()),
                        ..RunStats::default()
                    };
                    if let Err(e) = positions.finish_run(run_id, RunStatus::Failed, stats).await {
                        tracing::warn!(error = %e, "Failed to record run failure");
                    }
                    return Err(error);
                }
            };

            tracing::info!(
                job = positions.job().as_str(),
                namespace = %namespace,
                partitions = partitions.len(),
                resumed_from = ?resumed_from,
                "Scanning namespace"
            );

            let progress = Arc::new(NamespaceProgress::new(
                partitions.len(),
                resumed_from.clone(),
            ));
            plans.push(NamespacePlan {
                namespace: namespace.clone(),
                partitions: partitions.len(),
                resumed_from,
            });
            for partition in partitions {
                let worker = Worker {
                    source: Arc::clone(&self.source),
                    namespace: namespace.clone(),
                    partition,
                    batch_size: self.config.batch_size,
                    chunk_threshold: self.config.chunk_threshold,
                    emitter: Arc::clone(&emitter),
                    limiter: Arc::clone(&limiter),
                    positions: Arc::clone(&positions),
                    progress: Arc::clone(&progress),
                    cancel: self.cancel.clone(),
                };
                tasks.spawn(worker.run());
            }
        }

        tracing::info!(
            job = positions.job().as_str(),
            namespaces = plans.len(),
            workers = tasks.len(),
            "Scan started"
        );

        self.running = Some(RunningScan {
            tasks,
            plans,
            emitter,
            positions,
            run_id,
            started_at: Instant::now(),
        });
        Ok(())
    }

    async fn plan_namespace(
        &self,
        namespace: &Namespace,
        positions: &PositionCache,
    ) -> Result<(Option<Key>, Vec<Partition>)> {
        let resumed_from = positions.position(namespace).await;
        let range = resumed_from
            .clone()
            .map_or_else(KeyRange::full, KeyRange::after);
        if self.config.worker_cnt <= 1 {
            return Ok((resumed_from, plan_partitions(&range, None, 1)));
        }
        let mut session = self.source.open_session(namespace).await?;
        let bounds = session.key_bounds().await?;
        Ok((
            resumed_from,
            plan_partitions(&range, bounds.as_ref(), self.config.worker_cnt),
        ))
    }

    /// Block until every worker has stopped, then close the emitter.
    ///
    /// # Errors
    ///
    /// Returns the first fatal worker error, [`ScanError::Cancelled`] if
    /// the run was stopped by its token, or a close/run-history failure.
    pub async fn wait(&mut self) -> Result<ScanSummary> {
        let Some(mut running) = self.running.take() else {
            return Err(ScanError::Internal("scan not started".to_string()));
        };

        let mut reports = Vec::new();
        let mut first_error: Option<ScanError> = None;
        let mut cancelled = false;

        while let Some(joined) = running.tasks.join_next().await {
            let error = match joined {
                Ok(Ok(report)) => {
                    reports.push(report);
                    continue;
                }
                Ok(Err(ScanError::Cancelled)) => {
                    cancelled = true;
                    continue;
                }
                Ok(Err(error)) => error,
                Err(join_err) => ScanError::Internal(format!("worker task panicked: {join_err}")),
            };
            if first_error.is_none() {
                tracing::error!(kind = error.kind(), error = %error, "Worker failed, cancelling run");
                self.cancel.cancel();
                first_error = Some(error);
            } else {
                tracing::debug!(error = %error, "Additional worker failure after cancellation");
            }
        }

        if first_error.is_none() && cancelled {
            first_error = Some(ScanError::Cancelled);
        }

        if let Err(e) = running.emitter.close() {
            if first_error.is_none() {
                first_error = Some(ScanError::EmitterClose(e));
            } else {
                tracing::warn!(error = %e, "Emitter close failed");
            }
        }

        let summary = summarize(&running.plans, &reports, running.started_at);
        let stats = RunStats {
            namespaces_scanned: running.plans.len() as u64,
            records_emitted: summary.records_emitted,
            batches_emitted: summary.batches_emitted,
            error_message: first_error.as_ref().map(ToString::to_string),
        };
        let status = if first_error.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
        if let Err(e) = running
            .positions
            .finish_run(running.run_id, status, stats)
            .await
        {
            if first_error.is_none() {
                first_error = Some(e);
            } else {
                tracing::warn!(error = %e, "Failed to record run outcome");
            }
        }

        if let Some(error) = first_error {
            return Err(error);
        }

        tracing::info!(
            job = running.positions.job().as_str(),
            namespaces = summary.namespaces.len(),
            records = summary.records_emitted,
            batches = summary.batches_emitted,
            duration_secs = summary.duration_secs,
            "Scan completed"
        );
        Ok(summary)
    }
}

fn summarize(plans: &[NamespacePlan], reports: &[PartitionReport], started_at: Instant) -> ScanSummary {
    let namespaces: Vec<NamespaceSummary> = plans
        .iter()
        .map(|plan| {
            let mut summary = NamespaceSummary {
                namespace: plan.namespace.clone(),
                partitions: plan.partitions,
                records_emitted: 0,
                batches_emitted: 0,
                chunks: 0,
                resumed_from: plan.resumed_from.clone(),
            };
            for report in reports.iter().filter(|r| r.namespace == plan.namespace) {
                summary.records_emitted += report.records_emitted;
                summary.batches_emitted += report.batches_emitted;
                summary.chunks += report.chunks;
            }
            summary
        })
        .collect();

    ScanSummary {
        records_emitted: namespaces.iter().map(|n| n.records_emitted).sum(),
        batches_emitted: namespaces.iter().map(|n| n.batches_emitted).sum(),
        namespaces,
        duration_secs: started_at.elapsed().as_secs_f64(),
    }
}
