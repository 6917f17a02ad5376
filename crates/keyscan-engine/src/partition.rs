//! Key-domain partitioning across workers.

use std::ops::Bound;

use keyscan_types::{Key, KeyRange};

/// A worker's share of a namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub index: usize,
    pub count: usize,
    pub range: KeyRange,
}

fn single(range: &KeyRange) -> Vec<Partition> {
    vec![Partition {
        index: 0,
        count: 1,
        range: range.clone(),
    }]
}

/// Split `range` into at most `worker_cnt` consecutive partitions.
///
/// Integer keys are split into equal-width slices of `[min, max]` taken
/// from `bounds`. The first partition keeps the lower bound of `range`
/// and the last keeps its upper bound, so the union is exactly `range`
/// even for keys inserted outside `bounds` during the scan. String keys
/// and empty domains yield a single partition.
#[must_use]
pub fn plan_partitions(
    range: &KeyRange,
    bounds: Option<&(Key, Key)>,
    worker_cnt: usize,
) -> Vec<Partition> {
    if worker_cnt <= 1 {
        return single(range);
    }
    let Some((Key::Int64(min), Key::Int64(max))) = bounds else {
        if bounds.is_some() {
            tracing::info!("String keys are not range-partitioned, using one worker");
        }
        return single(range);
    };

    let lo = match &range.lower {
        Bound::Included(Key::Int64(k)) => i128::from(*k),
        Bound::Excluded(Key::Int64(k)) => i128::from(*k) + 1,
        Bound::Unbounded => i128::MIN,
        _ => return single(range),
    }
    .max(i128::from(*min));
    let hi = match &range.upper {
        Bound::Included(Key::Int64(k)) => i128::from(*k),
        Bound::Excluded(Key::Int64(k)) => i128::from(*k) - 1,
        Bound::Unbounded => i128::MAX,
        _ => return single(range),
    }
    .min(i128::from(*max));
    if lo >= hi {
        return single(range);
    }

    let span = hi - lo + 1;
    let workers = i128::try_from(worker_cnt).unwrap_or(i128::MAX).min(span);
    let width = (span + workers - 1) / workers;
    let count = (span + width - 1) / width;

    // Every boundary lies in (lo, hi], so it fits in i64.
    let boundaries: Vec<Key> = (1..count)
        .filter_map(|i| i64::try_from(lo + i * width).ok())
        .map(Key::Int64)
        .collect();

    let count = boundaries.len() + 1;
    (0..count)
        .map(|index| {
            let lower = if index == 0 {
                range.lower.clone()
            } else {
                Bound::Included(boundaries[index - 1].clone())
            };
            let upper = if index + 1 == count {
                range.upper.clone()
            } else {
                Bound::Excluded(boundaries[index].clone())
            };
            Partition {
                index,
                count,
                range: KeyRange { lower, upper },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn int_bounds(min: i64, max: i64) -> (Key, Key) {
        (Key::Int64(min), Key::Int64(max))
    }

    #[test]
    fn single_worker_keeps_range() {
        let range = KeyRange::after(Key::Int64(5));
        let parts = plan_partitions(&range, Some(&int_bounds(0, 100)), 1);
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].range, range);
    }

    #[test]
    fn equal_width_split() {
        let parts = plan_partitions(&KeyRange::full(), Some(&int_bounds(0, 99)), 4);
        let ranges: Vec<_> = parts.iter().map(|p| p.range.to_string()).collect();
        assert_eq!(
            ranges,
            vec!["(-inf, 25)", "[25, 50)", "[50, 75)", "[75, +inf)"]
        );
        assert!(parts.iter().all(|p| p.count == 4));
    }

    #[test]
    fn resume_point_narrows_split() {
        let range = KeyRange::after(Key::Int64(49));
        let parts = plan_partitions(&range, Some(&int_bounds(0, 99)), 2);
        let ranges: Vec<_> = parts.iter().map(|p| p.range.to_string()).collect();
        assert_eq!(ranges, vec!["(49, 75)", "[75, +inf)"]);
    }

    #[test]
    fn small_domain_uses_fewer_partitions() {
        let parts = plan_partitions(&KeyRange::full(), Some(&int_bounds(10, 12)), 8);
        assert_eq!(parts.len(), 3);
    }

    #[test]
    fn string_keys_and_empty_domains_are_single() {
        let strings = (Key::from("a"), Key::from("z"));
        assert_eq!(plan_partitions(&KeyRange::full(), Some(&strings), 4).len(), 1);
        assert_eq!(plan_partitions(&KeyRange::full(), None, 4).len(), 1);
        let past_end = KeyRange::after(Key::Int64(100));
        assert_eq!(plan_partitions(&past_end, Some(&int_bounds(0, 99)), 4).len(), 1);
    }

    #[test]
    fn extreme_bounds_do_not_overflow() {
        let parts = plan_partitions(&KeyRange::full(), Some(&int_bounds(i64::MIN, i64::MAX)), 3);
        assert_eq!(parts.len(), 3);
    }

    proptest! {
        #[test]
        fn partitions_cover_range_exactly(
            min in -1_000i64..1_000,
            len in 0i64..2_000,
            workers in 1usize..16,
            resume in proptest::option::of(-1_200i64..3_200),
            probe in -1_500i64..3_500,
        ) {
            let range = resume.map_or_else(KeyRange::full, |k| KeyRange::after(Key::Int64(k)));
            let parts = plan_partitions(&range, Some(&int_bounds(min, min + len)), workers);
            prop_assert!(parts.len() <= workers.max(1));
            let key = Key::Int64(probe);
            let owners = parts.iter().filter(|p| p.range.contains(&key)).count();
            prop_assert_eq!(owners, usize::from(range.contains(&key)));
        }
    }
}
