//! Chunked, resumable, rate-limited extraction engine.
//!
//! The [`Orchestrator`] scans every namespace a [`Source`](source::Source)
//! exposes and a [`Router`] accepts, in ascending key order, handing
//! batches to an [`Emitter`] and persisting progress through a
//! [`PositionCache`] once batches are acknowledged.

pub mod batcher;
pub mod config;
pub mod emitter;
pub mod errors;
pub mod orchestrator;
pub mod partition;
pub mod position;
pub(crate) mod progress;
pub mod rate_limit;
pub mod resolve;
pub mod result;
pub mod router;
pub mod source;
pub mod walker;
pub(crate) mod worker;

// Re-export public API for convenience
pub use emitter::{Ack, Batch, ChannelEmitter, Delivery, Emitter};
pub use errors::{EmitError, ScanError};
pub use orchestrator::Orchestrator;
pub use position::PositionCache;
pub use result::{NamespaceSummary, ScanSummary};
pub use router::{NamespaceFilter, Router};
