//! Adaptive keyset pagination.
//!
//! A [`RangeWalker`] turns one key range of one namespace into a sequence
//! of [`Chunk`]s. Each round fetches `chunk_threshold + 1` rows; the extra
//! row is a probe that tells whether the range continues and where the
//! next chunk starts. Rows sharing a key never straddle two chunks.

use std::ops::Bound;

use keyscan_types::{Key, KeyRange, Record};

use crate::errors::Result;
use crate::source::SourceSession;

/// Lifecycle of a chunk inside a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    Pending,
    InProgress,
    Done,
}

/// A contiguous slice of a namespace's key domain together with its rows.
#[derive(Debug)]
pub struct Chunk {
    /// Position of this chunk in the walker's output, starting at 0.
    pub seq: u64,
    /// Range this chunk covers. Successive chunks' ranges never overlap.
    pub range: KeyRange,
    /// Rows in ascending key order.
    pub records: Vec<Record>,
    /// Whether this is the walker's final chunk.
    pub last: bool,
    state: ChunkState,
}

impl Chunk {
    #[must_use]
    pub fn state(&self) -> ChunkState {
        self.state
    }

    pub fn begin(&mut self) {
        self.state = ChunkState::InProgress;
    }

    pub fn complete(&mut self) {
        self.state = ChunkState::Done;
    }

    /// Key of the final row, i.e. the position reached once the whole
    /// chunk is acknowledged.
    #[must_use]
    pub fn last_key(&self) -> Option<&Key> {
        self.records.last().map(|r| &r.key)
    }
}

/// Walks `range` of one session in chunks of at most `chunk_threshold` rows.
///
/// The one exception to the size bound is a run of equal keys longer than
/// the threshold, which is returned whole as a single chunk.
pub struct RangeWalker<S> {
    session: S,
    remaining: KeyRange,
    chunk_threshold: usize,
    next_seq: u64,
    exhausted: bool,
}

impl<S: SourceSession> RangeWalker<S> {
    #[must_use]
    pub fn new(session: S, range: KeyRange, chunk_threshold: usize) -> Self {
        Self {
            session,
            exhausted: range.is_empty(),
            remaining: range,
            chunk_threshold: chunk_threshold.max(1),
            next_seq: 0,
        }
    }

    /// Fetch the next chunk, or `None` once the range is exhausted.
    ///
    /// # Errors
    ///
    /// Propagates the session's query errors. The walker state is left
    /// untouched, so the same chunk would be fetched again.
    pub async fn next_chunk(&mut self) -> Result<Option<Chunk>> {
        if self.exhausted {
            return Ok(None);
        }

        let threshold = self.chunk_threshold;
        let mut rows = self
            .session
            .fetch_range(&self.remaining, Some(threshold.saturating_add(1)))
            .await?;

        if rows.len() <= threshold {
            self.exhausted = true;
            if rows.is_empty() {
                return Ok(None);
            }
            let range = self.remaining.clone();
            return Ok(Some(self.chunk(range, rows, true)));
        }

        let probe = rows[threshold].key.clone();
        rows.truncate(threshold);
        let cut = rows
            .iter()
            .rposition(|r| r.key != probe)
            .map_or(0, |i| i + 1);

        let lower = self.remaining.lower.clone();
        if cut > 0 {
            // Rows equal to the probe move to the next chunk.
            rows.truncate(cut);
            self.remaining.lower = Bound::Included(probe.clone());
            let range = KeyRange {
                lower,
                upper: Bound::Excluded(probe),
            };
            return Ok(Some(self.chunk(range, rows, false)));
        }

        // The whole window shares one key: take the complete group.
        let group = self
            .session
            .fetch_range(&KeyRange::point(probe.clone()), None)
            .await?;
        tracing::debug!(
            key = %probe,
            rows = group.len(),
            "Equal-key group exceeds chunk threshold"
        );
        self.remaining.lower = Bound::Excluded(probe.clone());
        if self.remaining.is_empty() {
            self.exhausted = true;
        }
        let range = KeyRange {
            lower,
            upper: Bound::Included(probe),
        };
        let last = self.exhausted;
        Ok(Some(self.chunk(range, group, last)))
    }

    fn chunk(&mut self, range: KeyRange, records: Vec<Record>, last: bool) -> Chunk {
        let seq = self.next_seq;
        self.next_seq += 1;
        Chunk {
            seq,
            range,
            records,
            last,
            state: ChunkState::Pending,
        }
    }
}
