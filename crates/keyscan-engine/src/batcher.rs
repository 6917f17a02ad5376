//! Groups consecutive rows of a chunk into fixed-size batches.

use keyscan_types::Record;

/// Accumulates rows and releases them in groups of `batch_size`.
///
/// Order is preserved. Callers flush at every chunk boundary, so a batch
/// never mixes rows of two chunks.
#[derive(Debug)]
pub struct Batcher {
    batch_size: usize,
    pending: Vec<Record>,
}

impl Batcher {
    #[must_use]
    pub fn new(batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            batch_size,
            pending: Vec::with_capacity(batch_size),
        }
    }

    /// Add one row; returns a full batch when `batch_size` is reached.
    pub fn push(&mut self, record: Record) -> Option<Vec<Record>> {
        self.pending.push(record);
        if self.pending.len() >= self.batch_size {
            Some(std::mem::replace(
                &mut self.pending,
                Vec::with_capacity(self.batch_size),
            ))
        } else {
            None
        }
    }

    /// Release the partial batch, if any.
    pub fn flush(&mut self) -> Option<Vec<Record>> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }

    /// Split a whole chunk into batches, flushing the remainder.
    pub fn split(&mut self, records: Vec<Record>) -> Vec<Vec<Record>> {
        let mut batches: Vec<Vec<Record>> = records
            .into_iter()
            .filter_map(|record| self.push(record))
            .collect();
        batches.extend(self.flush());
        batches
    }
}
