//! Property tests for coverage, ordering, boundary dedup and resumption.

mod common;

use std::collections::BTreeSet;
use std::sync::Arc;

use common::*;
use keyscan_engine::source::MemorySource;
use keyscan_state::prelude::*;
use proptest::prelude::*;

fn source_with(keys: &[i64]) -> MemorySource {
    let source = MemorySource::default();
    source.create_collection(&ns());
    source.insert_keys(&ns(), keys.iter().copied());
    source
}

fn as_keys(keys: &[i64]) -> Vec<Key> {
    sorted(keys.iter().copied().map(Key::Int64).collect())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn single_worker_covers_every_key_in_order(
        keys in prop::collection::hash_set(any::<i64>(), 0..300),
        threshold in 1usize..40,
        batch_size in 1usize..9,
    ) {
        let keys: Vec<i64> = keys.into_iter().collect();
        let emitter = RecordingEmitter::new();
        block_on(run_scan(
            source_with(&keys),
            scan_config(batch_size, 1, threshold, 0),
            &accept_all(),
            memory_state(),
            Arc::clone(&emitter),
        ))
        .unwrap();

        let emitted = emitter.keys();
        prop_assert!(emitted.windows(2).all(|w| w[0] < w[1]));
        prop_assert_eq!(emitted, as_keys(&keys));
        prop_assert!(emitter.batches().iter().all(|b| !b.keys.is_empty() && b.keys.len() <= batch_size));
    }

    #[test]
    fn duplicate_keys_across_probe_boundaries(
        keys in prop::collection::vec(0i64..25, 0..250),
        threshold in 1usize..12,
        batch_size in 1usize..6,
    ) {
        let emitter = RecordingEmitter::new();
        block_on(run_scan(
            source_with(&keys),
            scan_config(batch_size, 1, threshold, 0),
            &accept_all(),
            memory_state(),
            Arc::clone(&emitter),
        ))
        .unwrap();

        let emitted = emitter.keys();
        prop_assert!(emitted.windows(2).all(|w| w[0] <= w[1]));
        prop_assert_eq!(emitted, as_keys(&keys));
    }

    #[test]
    fn resumed_run_emits_exactly_the_rest(
        keys in prop::collection::vec(-500i64..500, 1..200),
        threshold in 1usize..20,
        batch_size in 1usize..6,
        reject_at in 1usize..40,
    ) {
        let backend = memory_state();
        let failing = RecordingEmitter::rejecting_at(reject_at);
        let first = block_on(run_scan(
            source_with(&keys),
            scan_config(batch_size, 1, threshold, 0),
            &accept_all(),
            Arc::clone(&backend),
            Arc::clone(&failing),
        ));

        let position = stored_position(&backend, &ns());
        let all = as_keys(&keys);
        let (done, rest): (Vec<Key>, Vec<Key>) = all
            .iter()
            .cloned()
            .partition(|k| position.as_ref().is_some_and(|p| k <= p));

        if first.is_ok() {
            prop_assert!(rest.is_empty());
        }
        let acked_done: Vec<Key> = failing
            .acked_keys()
            .into_iter()
            .filter(|k| position.as_ref().is_some_and(|p| k <= p))
            .collect();
        prop_assert_eq!(acked_done, done);

        let emitter = RecordingEmitter::new();
        block_on(run_scan(
            source_with(&keys),
            scan_config(batch_size, 1, threshold, 0),
            &accept_all(),
            Arc::clone(&backend),
            Arc::clone(&emitter),
        ))
        .unwrap();
        prop_assert_eq!(emitter.keys(), rest);
    }

    #[test]
    fn multi_worker_covers_every_key_once(
        keys in prop::collection::vec(any::<i64>(), 0..300),
        workers in 2usize..8,
        threshold in 1usize..30,
        batch_size in 1usize..8,
    ) {
        let backend = memory_state();
        let emitter = RecordingEmitter::new();
        block_on(run_scan(
            source_with(&keys),
            scan_config(batch_size, workers, threshold, 0),
            &accept_all(),
            Arc::clone(&backend),
            Arc::clone(&emitter),
        ))
        .unwrap();

        let all = as_keys(&keys);
        prop_assert_eq!(sorted(emitter.keys()), all.clone());
        prop_assert_eq!(stored_position(&backend, &ns()), all.last().cloned());
    }

    #[test]
    fn multi_worker_resume_never_skips(
        keys in prop::collection::hash_set(-2_000i64..2_000, 1..250),
        workers in 2usize..6,
        threshold in 1usize..20,
        batch_size in 1usize..6,
        reject_at in 1usize..30,
    ) {
        let keys: Vec<i64> = keys.into_iter().collect();
        let backend = memory_state();
        let failing = RecordingEmitter::rejecting_at(reject_at);
        let _ = block_on(run_scan(
            source_with(&keys),
            scan_config(batch_size, workers, threshold, 0),
            &accept_all(),
            Arc::clone(&backend),
            Arc::clone(&failing),
        ));

        let position = stored_position(&backend, &ns());
        let all = as_keys(&keys);
        let acked: BTreeSet<Key> = failing.acked_keys().into_iter().collect();
        for key in all.iter().filter(|k| position.as_ref().is_some_and(|p| *k <= p)) {
            prop_assert!(acked.contains(key), "{key} is at or below the position but was never acked");
        }

        let emitter = RecordingEmitter::new();
        block_on(run_scan(
            source_with(&keys),
            scan_config(batch_size, workers, threshold, 0),
            &accept_all(),
            Arc::clone(&backend),
            Arc::clone(&emitter),
        ))
        .unwrap();

        let rest: Vec<Key> = all
            .iter()
            .filter(|k| position.as_ref().map_or(true, |p| *k > p))
            .cloned()
            .collect();
        prop_assert_eq!(sorted(emitter.keys()), rest);

        let covered: BTreeSet<Key> = acked.into_iter().chain(emitter.keys()).collect();
        prop_assert_eq!(covered, all.into_iter().collect::<BTreeSet<Key>>());
    }
}
