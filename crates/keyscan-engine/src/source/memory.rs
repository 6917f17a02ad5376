//! In-process source backed by sorted vectors.
//!
//! Used by tests and demos. Records every query it serves and can be told
//! to fail, which makes coverage and fail-fast behavior observable.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use keyscan_types::{Key, KeyRange, Namespace, Record};

use super::{Source, SourceSession};
use crate::errors::{Result, ScanError};

#[derive(Default)]
struct MemoryState {
    collections: BTreeMap<Namespace, Vec<Record>>,
    queries: Vec<Namespace>,
    fail_after: Option<usize>,
    unreachable: bool,
    query_delay: Option<Duration>,
}

/// Cloneable handle to a shared in-memory store.
#[derive(Clone)]
pub struct MemorySource {
    key_field: String,
    state: Arc<Mutex<MemoryState>>,
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new("_id")
    }
}

fn lock(state: &Mutex<MemoryState>) -> Result<MutexGuard<'_, MemoryState>> {
    state
        .lock()
        .map_err(|_| ScanError::Internal("memory source lock poisoned".to_string()))
}

impl MemorySource {
    #[must_use]
    pub fn new(key_field: impl Into<String>) -> Self {
        Self {
            key_field: key_field.into(),
            state: Arc::default(),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> T {
        let mut guard = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut guard)
    }

    /// Ensure `namespace` exists, even with no records.
    pub fn create_collection(&self, namespace: &Namespace) {
        self.with_state(|s| {
            s.collections.entry(namespace.clone()).or_default();
        });
    }

    /// Insert a record, after any existing records with the same key.
    pub fn insert(&self, namespace: &Namespace, record: Record) {
        self.with_state(|s| {
            let records = s.collections.entry(namespace.clone()).or_default();
            let at = records.partition_point(|r| r.key <= record.key);
            records.insert(at, record);
        });
    }

    /// Insert one record per key whose only field is the key itself.
    pub fn insert_keys<K: Into<Key>>(&self, namespace: &Namespace, keys: impl IntoIterator<Item = K>) {
        for key in keys {
            self.insert(namespace, Record::from_key(&self.key_field, key.into()));
        }
    }

    /// Namespaces touched by each query, in the order they were served.
    #[must_use]
    pub fn query_log(&self) -> Vec<Namespace> {
        self.with_state(|s| s.queries.clone())
    }

    /// Let `n` more queries succeed, then fail every following one.
    pub fn fail_queries_after(&self, n: usize) {
        self.with_state(|s| s.fail_after = Some(n));
    }

    /// Make namespace listing and session opening fail.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.with_state(|s| s.unreachable = unreachable);
    }

    /// Delay every query by `delay` (tokio time).
    pub fn set_query_delay(&self, delay: Duration) {
        self.with_state(|s| s.query_delay = Some(delay));
    }
}

impl Source for MemorySource {
    type Session = MemorySession;

    fn key_field(&self) -> &str {
        &self.key_field
    }

    async fn list_namespaces(&self) -> Result<Vec<Namespace>> {
        let state = lock(&self.state)?;
        if state.unreachable {
            return Err(ScanError::Connection("memory source unreachable".to_string()));
        }
        Ok(state.collections.keys().cloned().collect())
    }

    async fn open_session(&self, namespace: &Namespace) -> Result<MemorySession> {
        if lock(&self.state)?.unreachable {
            return Err(ScanError::Connection("memory source unreachable".to_string()));
        }
        Ok(MemorySession {
            namespace: namespace.clone(),
            state: Arc::clone(&self.state),
        })
    }
}

/// Session over one namespace of a [`MemorySource`].
pub struct MemorySession {
    namespace: Namespace,
    state: Arc<Mutex<MemoryState>>,
}

impl MemorySession {
    /// Log the query, apply failure injection and return the configured delay.
    fn begin_query(&self) -> Result<Option<Duration>> {
        let mut state = lock(&self.state)?;
        state.queries.push(self.namespace.clone());
        match state.fail_after {
            Some(0) => Err(ScanError::query(&self.namespace, "injected query failure")),
            Some(n) => {
                state.fail_after = Some(n - 1);
                Ok(state.query_delay)
            }
            None => Ok(state.query_delay),
        }
    }

    async fn pace(&self) -> Result<()> {
        if let Some(delay) = self.begin_query()? {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }
}

impl SourceSession for MemorySession {
    async fn key_bounds(&mut self) -> Result<Option<(Key, Key)>> {
        self.pace().await?;
        let state = lock(&self.state)?;
        let Some(records) = state.collections.get(&self.namespace) else {
            return Ok(None);
        };
        Ok(records
            .first()
            .zip(records.last())
            .map(|(lo, hi)| (lo.key.clone(), hi.key.clone())))
    }

    async fn fetch_range(&mut self, range: &KeyRange, limit: Option<usize>) -> Result<Vec<Record>> {
        self.pace().await?;
        let state = lock(&self.state)?;
        let Some(records) = state.collections.get(&self.namespace) else {
            return Ok(Vec::new());
        };
        let start = match &range.lower {
            std::ops::Bound::Included(k) => records.partition_point(|r| r.key < *k),
            std::ops::Bound::Excluded(k) => records.partition_point(|r| r.key <= *k),
            std::ops::Bound::Unbounded => 0,
        };
        Ok(records[start..]
            .iter()
            .take_while(|r| range.contains(&r.key))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::ops::Bound;

    use super::*;

    fn ns() -> Namespace {
        Namespace::new("test", "test")
    }

    #[tokio::test]
    async fn fetch_respects_bounds_and_limit() {
        let source = MemorySource::default();
        source.insert_keys(&ns(), [5_i64, 1, 3, 9, 7]);
        let mut session = source.open_session(&ns()).await.unwrap();

        let range = KeyRange {
            lower: Bound::Excluded(Key::Int64(1)),
            upper: Bound::Included(Key::Int64(7)),
        };
        let keys: Vec<Key> = session
            .fetch_range(&range, Some(2))
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.key)
            .collect();
        assert_eq!(keys, vec![Key::Int64(3), Key::Int64(5)]);
    }

    #[tokio::test]
    async fn duplicates_keep_insertion_order() {
        let source = MemorySource::default();
        for tag in ["a", "b", "c"] {
            let mut record = Record::from_key("_id", Key::Int64(4));
            record.fields.insert("tag".into(), tag.into());
            source.insert(&ns(), record);
        }
        let mut session = source.open_session(&ns()).await.unwrap();
        let tags: Vec<_> = session
            .fetch_range(&KeyRange::point(Key::Int64(4)), None)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.fields["tag"].clone())
            .collect();
        assert_eq!(tags, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn key_bounds_of_empty_collection() {
        let source = MemorySource::default();
        source.create_collection(&ns());
        let mut session = source.open_session(&ns()).await.unwrap();
        assert!(session.key_bounds().await.unwrap().is_none());
        assert_eq!(source.list_namespaces().await.unwrap(), vec![ns()]);
    }

    #[tokio::test]
    async fn injected_failure_after_n_queries() {
        let source = MemorySource::default();
        source.insert_keys(&ns(), [1_i64]);
        source.fail_queries_after(1);
        let mut session = source.open_session(&ns()).await.unwrap();
        assert!(session.fetch_range(&KeyRange::full(), None).await.is_ok());
        let err = session.fetch_range(&KeyRange::full(), None).await.unwrap_err();
        assert_eq!(err.kind(), "query");
        assert_eq!(source.query_log().len(), 2);
    }

    #[tokio::test]
    async fn unreachable_source_is_connection_error() {
        let source = MemorySource::default();
        source.set_unreachable(true);
        let err = source.list_namespaces().await.unwrap_err();
        assert_eq!(err.kind(), "connection");
    }
}
