//! One extraction lane: walk a partition, batch, throttle, emit, commit.

use std::future::Future;
use std::sync::Arc;

use keyscan_types::{Namespace, Operation, Record};
use tokio_util::sync::CancellationToken;

use crate::batcher::Batcher;
use crate::emitter::{Ack, Batch, Delivery, Emitter};
use crate::errors::{EmitError, Result, ScanError};
use crate::partition::Partition;
use crate::position::PositionCache;
use crate::progress::NamespaceProgress;
use crate::rate_limit::RateLimiter;
use crate::result::PartitionReport;
use crate::source::Source;
use crate::walker::RangeWalker;

pub(crate) struct Worker<S: Source> {
    pub(crate) source: Arc<S>,
    pub(crate) namespace: Namespace,
    pub(crate) partition: Partition,
    pub(crate) batch_size: usize,
    pub(crate) chunk_threshold: usize,
    pub(crate) emitter: Arc<dyn Emitter>,
    pub(crate) limiter: Arc<RateLimiter>,
    pub(crate) positions: Arc<PositionCache>,
    pub(crate) progress: Arc<NamespaceProgress>,
    pub(crate) cancel: CancellationToken,
}

impl<S: Source> Worker<S> {
    /// Race `fut` against cancellation.
    async fn cancellable<F: Future>(&self, fut: F) -> Result<F::Output> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(ScanError::Cancelled),
            out = fut => Ok(out),
        }
    }

    pub(crate) async fn run(self) -> Result<PartitionReport> {
        let mut report = PartitionReport {
            namespace: self.namespace.clone(),
            records_emitted: 0,
            batches_emitted: 0,
            chunks: 0,
        };

        tracing::debug!(
            namespace = %self.namespace,
            partition = self.partition.index,
            range = %self.partition.range,
            "Worker started"
        );

        let session = self
            .cancellable(self.source.open_session(&self.namespace))
            .await??;
        let mut walker =
            RangeWalker::new(session, self.partition.range.clone(), self.chunk_threshold);
        let mut batcher = Batcher::new(self.batch_size);

        while let Some(mut chunk) = self.cancellable(walker.next_chunk()).await?? {
            chunk.begin();
            let last_key = chunk.last_key().cloned();
            let rows = chunk.records.len();
            for batch in batcher.split(std::mem::take(&mut chunk.records)) {
                let len = batch.len() as u64;
                self.emit_batch(batch).await?;
                report.records_emitted += len;
                report.batches_emitted += 1;
            }
            chunk.complete();
            report.chunks += 1;

            tracing::debug!(
                namespace = %self.namespace,
                partition = self.partition.index,
                chunk = chunk.seq,
                rows,
                range = %chunk.range,
                "Chunk acknowledged"
            );

            if let Some(watermark) =
                self.progress
                    .record(self.partition.index, last_key.as_ref(), false)
            {
                self.positions.commit(&self.namespace, watermark).await?;
            }
        }

        if let Some(watermark) = self.progress.record(self.partition.index, None, true) {
            self.positions.commit(&self.namespace, watermark).await?;
        }

        tracing::debug!(
            namespace = %self.namespace,
            partition = self.partition.index,
            records = report.records_emitted,
            batches = report.batches_emitted,
            "Worker finished"
        );
        Ok(report)
    }

    async fn emit_batch(&self, rows: Vec<Record>) -> Result<()> {
        self.cancellable(self.limiter.acquire()).await?;

        let (ack, signal) = Ack::channel();
        let batch = Batch {
            namespace: self.namespace.clone(),
            operation: Operation::Read,
            rows,
            ack,
        };
        tracing::trace!(
            namespace = %self.namespace,
            partition = self.partition.index,
            rows = batch.len(),
            first = ?batch.first_key(),
            last = ?batch.last_key(),
            "Emitting batch"
        );
        self.emitter
            .emit(batch)
            .map_err(|source| ScanError::Emit {
                namespace: self.namespace.clone(),
                source,
            })?;

        let delivery = self
            .cancellable(signal)
            .await?
            .map_err(|_| ScanError::Emit {
                namespace: self.namespace.clone(),
                source: EmitError::AckDropped,
            })?;
        if delivery == Delivery::Dropped {
            tracing::debug!(namespace = %self.namespace, "Batch dropped by emitter");
        }
        Ok(())
    }
}
