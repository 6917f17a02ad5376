//! Source store abstraction.
//!
//! A [`Source`] lists the namespaces it exposes and opens one
//! [`SourceSession`] per worker. Sessions are owned by the worker that
//! opened them and never shared.

use std::future::Future;

use keyscan_types::{Key, KeyRange, Namespace, Record};

use crate::errors::Result;

pub mod memory;
pub mod postgres;

pub use memory::MemorySource;
pub use postgres::PostgresSource;

/// A store holding key-ordered collections.
pub trait Source: Send + Sync + 'static {
    type Session: SourceSession;

    /// Name of the key field, recorded alongside persisted positions.
    fn key_field(&self) -> &str;

    /// Every namespace the store exposes, in ascending order.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Connection`](crate::errors::ScanError::Connection)
    /// when the store is unreachable.
    fn list_namespaces(&self) -> impl Future<Output = Result<Vec<Namespace>>> + Send;

    /// Open a session scoped to one namespace.
    ///
    /// # Errors
    ///
    /// Returns `Connection` when the store is unreachable and `Config` when
    /// the namespace cannot be scanned by key.
    fn open_session(
        &self,
        namespace: &Namespace,
    ) -> impl Future<Output = Result<Self::Session>> + Send;
}

/// Query capability over one namespace.
pub trait SourceSession: Send + 'static {
    /// Smallest and largest key currently stored, or `None` when empty.
    ///
    /// # Errors
    ///
    /// Returns `Query` when the bounds query fails.
    fn key_bounds(&mut self) -> impl Future<Output = Result<Option<(Key, Key)>>> + Send;

    /// Records whose key lies in `range`, ascending by key, at most `limit`
    /// of them. Records sharing a key keep a stable relative order.
    ///
    /// # Errors
    ///
    /// Returns `Query` when the fetch fails.
    fn fetch_range(
        &mut self,
        range: &KeyRange,
        limit: Option<usize>,
    ) -> impl Future<Output = Result<Vec<Record>>> + Send;
}
