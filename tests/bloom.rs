//! Bloom filter behavior and the alternating-filter refresh protocol.
//!
//! The oracle is driven synchronously here (it is dispatcher-private state,
//! so a single thread exercises it exactly the way the dispatcher does),
//! plus one end-to-end test showing a refresh un-blocking a candidate that
//! only conflicted with retired bits.

use puppetmaster::{
    ActiveSet, BloomFilter, BloomOracle, ConflictOracle, ExactOracle, PuppetPort, Scheduler,
    SchedulerConfig, Transaction, TxnId,
};
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_filter_has_no_false_negatives() {
    let mut filter = BloomFilter::with_default_geometry();
    for id in [0u64, 1, 7, 12345, u64::MAX >> 1] {
        assert!(!filter.contains(id));
        filter.insert(id);
        assert!(filter.contains(id));
    }
    // Earlier inserts stay present.
    for id in [0u64, 1, 7, 12345, u64::MAX >> 1] {
        assert!(filter.contains(id));
    }
}

#[test]
fn test_filter_clear_forgets_everything() {
    let mut filter = BloomFilter::with_default_geometry();
    for id in 0..100u64 {
        filter.insert(id);
    }
    assert!(filter.density() > 0);

    filter.clear();
    assert_eq!(filter.density(), 0);
    for id in 0..100u64 {
        assert!(!filter.contains(id));
    }
}

#[test]
fn test_filter_distinct_ids_stay_distinct() {
    // With the reference geometry, a handful of ids cannot saturate the
    // filter; unrelated ids must keep probing negative.
    let mut filter = BloomFilter::with_default_geometry();
    for id in 0..8u64 {
        filter.insert(id);
    }
    for id in 1000..1008u64 {
        assert!(!filter.contains(id));
    }
}

#[test]
#[should_panic(expected = "partition count")]
fn test_filter_rejects_too_many_partitions() {
    let _ = BloomFilter::new(10, 5);
}

#[test]
fn test_oracle_masks_write_intent() {
    // The filter stores object ids only, so a read admission blocks a
    // later reader too: the Bloom oracle is deliberately conservative.
    let mut oracle = BloomOracle::new();
    let active = ActiveSet::new(1, 8);

    let reader = Transaction::new(TxnId(1), 0).read(5);
    oracle.admit(&reader);

    let other_reader = Transaction::new(TxnId(2), 0).read(5);
    let writer = Transaction::new(TxnId(3), 0).write(5);
    assert!(oracle.conflicts(&other_reader, &active));
    assert!(oracle.conflicts(&writer, &active));

    // The exact oracle lets the reader pair through.
    let mut exact_active = ActiveSet::new(1, 8);
    exact_active.push(0, reader);
    let exact = ExactOracle::new();
    assert!(!exact.conflicts(&other_reader, &exact_active));
    assert!(exact.conflicts(&writer, &exact_active));
}

#[test]
fn test_saturated_filter_recovers_after_one_refresh() {
    // Tiny geometry: 2 partitions of 4 bits saturate after a few admits
    // and then falsely reject everything, including `target`.
    let mut oracle = BloomOracle::with_geometry(2, 2);
    let active = ActiveSet::new(1, 128);
    let target = Transaction::new(TxnId(9999), 0).write(777_777);

    let mut admitted = 0u32;
    for id in 0..10_000u64 {
        if oracle.conflicts(&target, &active) {
            break;
        }
        let txn = Transaction::new(TxnId(id), 0).write(id);
        if oracle.conflicts(&txn, &active) {
            // The dispatcher would refuse this candidate; so do we.
            continue;
        }
        oracle.admit(&txn);
        oracle.retire(&txn);
        admitted += 1;
    }

    // Everything admitted has retired, yet the stale bits still reject the
    // unrelated transaction.
    assert!(admitted > 0);
    assert!(active.is_empty());
    assert!(oracle.conflicts(&target, &active));

    // One completed switch rebuilds from the (empty) active set.
    while !oracle.refresh(&active) {}
    assert!(!oracle.conflicts(&target, &active));
}

#[test]
fn test_refresh_keeps_active_and_sheds_retired() {
    let mut oracle = BloomOracle::new();
    let mut active = ActiveSet::new(1, 128);

    // More in-flight transactions than one refresh step folds in, so the
    // switch takes several steps.
    let mut in_flight = Vec::new();
    for id in 0..40u64 {
        let txn = Transaction::new(TxnId(id), 0).write(id);
        oracle.admit(&txn);
        active.push(0, txn);
        in_flight.push(txn);
    }

    let ghost = Transaction::new(TxnId(100), 0).write(100_000);
    oracle.admit(&ghost);
    oracle.retire(&ghost);
    assert!(oracle.conflicts(&ghost, &active));

    let mut steps = 0;
    assert!(!oracle.refresh(&active), "40 entries cannot fold in one step");
    assert!(oracle.switching());

    // A transaction admitted mid-switch must land in both filters.
    let late = Transaction::new(TxnId(200), 0).write(200_000);
    oracle.admit(&late);
    active.push(0, late);

    while !oracle.refresh(&active) {
        steps += 1;
        assert!(steps < 100, "refresh never completed");
    }
    assert!(!oracle.switching());

    // Every in-flight transaction still probes positive.
    for txn in &in_flight {
        assert!(oracle.conflicts(txn, &active));
    }
    assert!(oracle.conflicts(&late, &active));
    // The retired one is gone.
    assert!(!oracle.conflicts(&ghost, &active));
}

#[test]
fn test_refresh_is_noop_for_exact_oracle() {
    let mut exact = ExactOracle::new();
    let active = ActiveSet::new(1, 8);
    assert!(exact.refresh(&active));
    assert!(exact.refresh(&active));
}

fn poll_until(puppets: &mut [PuppetPort], timeout: Duration) -> Option<(usize, TxnId)> {
    let deadline = Instant::now() + timeout;
    loop {
        for (i, p) in puppets.iter_mut().enumerate() {
            if let Some(id) = p.poll() {
                return Some((i, id));
            }
        }
        if Instant::now() >= deadline {
            return None;
        }
        thread::yield_now();
    }
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_ghost_conflict_clears_after_refresh() {
    // A retired writer's bits keep blocking a successor until unrelated
    // traffic drives the admission counter over the refresh period.
    let mut cfg = SchedulerConfig::new(2, 2);
    cfg.refresh_period = 1;
    let mut scheduler = Scheduler::new(cfg, BloomOracle::new()).unwrap();
    let mut blocked_client = scheduler.client(0);
    let mut other_client = scheduler.client(1);
    let mut puppets = [scheduler.puppet(0), scheduler.puppet(1)];

    blocked_client.submit(&Transaction::new(TxnId(1), 0).write(7));
    blocked_client.submit(&Transaction::new(TxnId(2), 0).write(7));

    let (holder, id) = poll_until(&mut puppets, Duration::from_secs(2)).expect("A dispatches");
    assert_eq!(id, TxnId(1));
    puppets[holder].report_done(id);

    // A is retired but its bits are still live; B stays blocked.
    assert_eq!(poll_until(&mut puppets, Duration::from_millis(50)), None);

    // Unrelated traffic triggers a switch, which sheds A's bits.
    other_client.submit(&Transaction::new(TxnId(10), 0).write(8));
    let mut got = Vec::new();
    while got.len() < 2 {
        let (holder, id) =
            poll_until(&mut puppets, Duration::from_secs(2)).expect("B unblocks after refresh");
        puppets[holder].report_done(id);
        got.push(id);
    }
    assert!(got.contains(&TxnId(2)));
    assert!(got.contains(&TxnId(10)));

    scheduler.shutdown();
}
