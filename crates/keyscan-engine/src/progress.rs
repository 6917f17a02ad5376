//! Contiguous progress of a namespace scanned by several workers.

use std::sync::{Mutex, PoisonError};

use keyscan_types::Key;

#[derive(Debug, Default, Clone)]
struct Slot {
    acked: Option<Key>,
    done: bool,
}

/// Tracks acknowledged keys per partition and derives the namespace
/// position as their contiguous low watermark.
///
/// Walking partitions in key order, a finished partition contributes its
/// last acknowledged key and lets the walk continue; the first unfinished
/// one contributes its own progress and stops it. Everything at or below
/// the watermark has therefore been acknowledged.
#[derive(Debug)]
pub(crate) struct NamespaceProgress {
    slots: Mutex<Vec<Slot>>,
    base: Option<Key>,
    reported: Mutex<Option<Key>>,
}

impl NamespaceProgress {
    pub(crate) fn new(partitions: usize, base: Option<Key>) -> Self {
        Self {
            slots: Mutex::new(vec![Slot::default(); partitions]),
            reported: Mutex::new(base.clone()),
            base,
        }
    }

    /// Record progress of one partition. Returns the new watermark if it
    /// moved past every previously returned one.
    pub(crate) fn record(&self, partition: usize, acked: Option<&Key>, done: bool) -> Option<Key> {
        // Slots only hold plain values, so a poisoned lock is still usable.
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = slots.get_mut(partition)?;
        if let Some(key) = acked {
            slot.acked = Some(key.clone());
        }
        slot.done |= done;

        let mut watermark = self.base.clone();
        for slot in slots.iter() {
            if let Some(key) = &slot.acked {
                watermark = Some(key.clone());
            }
            if !slot.done {
                break;
            }
        }

        let mut reported = self.reported.lock().unwrap_or_else(PoisonError::into_inner);
        match watermark {
            Some(key) if reported.as_ref().map_or(true, |r| key > *r) => {
                *reported = Some(key.clone());
                Some(key)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn k(v: i64) -> Key {
        Key::Int64(v)
    }

    #[test]
    fn single_partition_follows_acks() {
        let progress = NamespaceProgress::new(1, None);
        assert_eq!(progress.record(0, Some(&k(3)), false), Some(k(3)));
        assert_eq!(progress.record(0, Some(&k(7)), false), Some(k(7)));
        assert_eq!(progress.record(0, None, true), None);
    }

    #[test]
    fn later_partition_waits_for_earlier() {
        let progress = NamespaceProgress::new(2, None);
        assert_eq!(progress.record(1, Some(&k(60)), false), None);
        assert_eq!(progress.record(0, Some(&k(10)), false), Some(k(10)));
        assert_eq!(progress.record(1, Some(&k(70)), true), None);
        assert_eq!(progress.record(0, Some(&k(49)), true), Some(k(70)));
    }

    #[test]
    fn empty_finished_partition_passes_through() {
        let progress = NamespaceProgress::new(3, Some(k(5)));
        assert_eq!(progress.record(0, None, true), None);
        assert_eq!(progress.record(1, Some(&k(40)), false), Some(k(40)));
    }

    #[test]
    fn never_regresses_below_base() {
        let progress = NamespaceProgress::new(2, Some(k(100)));
        assert_eq!(progress.record(0, Some(&k(50)), false), None);
    }

    #[test]
    fn unknown_partition_is_ignored() {
        let progress = NamespaceProgress::new(1, None);
        assert_eq!(progress.record(4, Some(&k(1)), true), None);
    }
}
