//! Downstream emission contract.
//!
//! Every [`Batch`] carries an [`Ack`]. The emitter resolves it once the
//! batch is durably relayed (or deliberately dropped); the worker that
//! produced the batch does not emit the next one until then, and only
//! commits positions covered by resolved batches.

use keyscan_types::{Key, Namespace, Operation, Record};
use serde::{Serialize, Serializer};
use tokio::sync::{mpsc, oneshot};

use crate::errors::EmitError;

/// Outcome reported through an [`Ack`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The batch reached its destination.
    Relayed,
    /// The emitter intentionally discarded the batch.
    Dropped,
}

/// One-shot completion signal of a batch.
///
/// Resolving consumes the ack, so it can fire at most once. Dropping it
/// unresolved fails the run with [`EmitError::AckDropped`].
#[derive(Debug)]
pub struct Ack {
    tx: oneshot::Sender<Delivery>,
}

impl Ack {
    /// Create an ack and the receiver that observes its resolution.
    #[must_use]
    pub fn channel() -> (Self, oneshot::Receiver<Delivery>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    /// Signal that the batch was relayed.
    pub fn relayed(self) {
        self.resolve(Delivery::Relayed);
    }

    /// Signal that the batch was dropped on purpose.
    pub fn dropped(self) {
        self.resolve(Delivery::Dropped);
    }

    pub fn resolve(self, delivery: Delivery) {
        // The receiver is gone only when the worker was cancelled.
        let _ = self.tx.send(delivery);
    }
}

/// An ordered group of records from one chunk of one namespace.
///
/// Serializes as `{"namespace": {...}, "operation": "read", "rows": [...]}`
/// where each row is the record's field map.
#[derive(Debug, Serialize)]
pub struct Batch {
    pub namespace: Namespace,
    pub operation: Operation,
    #[serde(serialize_with = "rows_as_fields")]
    pub rows: Vec<Record>,
    #[serde(skip)]
    pub ack: Ack,
}

fn rows_as_fields<S: Serializer>(rows: &[Record], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(rows.iter().map(|r| &r.fields))
}

impl Batch {
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn first_key(&self) -> Option<&Key> {
        self.rows.first().map(|r| &r.key)
    }

    #[must_use]
    pub fn last_key(&self) -> Option<&Key> {
        self.rows.last().map(|r| &r.key)
    }
}

/// Downstream sink for batches.
///
/// `emit` is called from worker tasks and should hand the batch off
/// quickly; the worker waits on the batch's [`Ack`], not on `emit`.
/// Any error is fatal for the run.
pub trait Emitter: Send + Sync {
    /// Accept one batch. The emitter takes ownership of its [`Ack`].
    ///
    /// # Errors
    ///
    /// Returns [`EmitError`] if the batch cannot be accepted.
    fn emit(&self, batch: Batch) -> Result<(), EmitError>;

    /// Release resources. Called once, after every worker has stopped.
    ///
    /// # Errors
    ///
    /// Returns [`EmitError`] if flushing or closing the sink fails.
    fn close(&self) -> Result<(), EmitError> {
        Ok(())
    }
}

/// Emitter that forwards batches to an in-process consumer.
///
/// The consumer owns each batch's [`Ack`] and resolves it when done.
#[derive(Debug, Clone)]
pub struct ChannelEmitter {
    tx: mpsc::UnboundedSender<Batch>,
}

impl ChannelEmitter {
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Batch>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Emitter for ChannelEmitter {
    fn emit(&self, batch: Batch) -> Result<(), EmitError> {
        self.tx
            .send(batch)
            .map_err(|_| EmitError::Rejected("consumer channel closed".to_string()))
    }
}
