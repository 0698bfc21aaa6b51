//! Multi-thread tests for the work backlog
//!
//! These tests pin down the concurrency contract: concurrent claims are
//! pairwise disjoint, batches commit and roll back atomically, and no item
//! is ever lost or duplicated across any interleaving.

use file_courier::backlog::{Backlog, Lease};
use std::collections::HashSet;
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

fn names(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Run `todo` in `threads` threads, all released through one barrier
fn run_concurrently<F>(threads: usize, todo: F)
where
    F: Fn(usize) + Send + Sync + 'static,
{
    let barrier = Arc::new(Barrier::new(threads));
    let todo = Arc::new(todo);

    let handles: Vec<_> = (0..threads)
        .map(|i| {
            let barrier = Arc::clone(&barrier);
            let todo = Arc::clone(&todo);
            thread::spawn(move || {
                barrier.wait();
                todo(i);
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("test thread panicked");
    }
}

#[test]
fn simultaneous_claims_are_disjoint() {
    let backlog = Backlog::new();
    backlog.process_snapshot(names(&["a.dat", "b.dat", "c.dat", "d.dat"]));

    // 5 threads race for 4 items; leases are parked so nothing rolls back
    // before the assertions run
    let leases: Arc<Mutex<Vec<Lease<String>>>> = Arc::new(Mutex::new(Vec::new()));
    let backlog_clone = backlog.clone();
    let leases_clone = Arc::clone(&leases);

    run_concurrently(5, move |_| {
        let mut claimant = backlog_clone.claimant();
        let lease = claimant.prepare_for_processing(1).unwrap();
        leases_clone.lock().unwrap().push(lease);
    });

    assert!(backlog.is_empty());
    assert_eq!(backlog.in_flight_len(), 4);

    let leases = Arc::try_unwrap(leases).ok().unwrap().into_inner().unwrap();
    let batches: Vec<Vec<String>> = leases.iter().map(|l| l.items().to_vec()).collect();

    // Exactly one empty batch, four singletons
    assert_eq!(batches.iter().filter(|b| b.is_empty()).count(), 1);
    assert_eq!(batches.iter().filter(|b| b.len() == 1).count(), 4);

    // Pairwise disjoint and collectively exhaustive
    let claimed: HashSet<String> = batches.iter().flatten().cloned().collect();
    assert_eq!(claimed.len(), 4);
    assert_eq!(
        claimed,
        names(&["a.dat", "b.dat", "c.dat", "d.dat"]).into_iter().collect()
    );

    for lease in leases {
        lease.processed();
    }
    assert!(backlog.is_drained());
    assert_eq!(backlog.done_len(), 4);
}

#[test]
fn concurrent_commits_absorb_everything() {
    let backlog = Backlog::new();
    let items = names(&["a.dat", "b.dat", "c.dat", "d.dat", "e.dat", "f.dat"]);
    backlog.process_snapshot(items.clone());

    let backlog_clone = backlog.clone();
    run_concurrently(3, move |_| {
        let mut claimant = backlog_clone.claimant();
        let lease = claimant.prepare_for_processing(2).unwrap();
        lease.processed();
    });

    assert!(backlog.is_empty());
    assert_eq!(backlog.in_flight_len(), 0);
    assert_eq!(backlog.done_len(), 6);
    for item in &items {
        assert!(backlog.is_done(item));
    }
}

#[test]
fn concurrent_rollbacks_restore_everything() {
    let backlog = Backlog::new();
    let items = names(&["a.dat", "b.dat", "c.dat", "d.dat", "e.dat", "f.dat"]);
    backlog.process_snapshot(items.clone());

    let backlog_clone = backlog.clone();
    run_concurrently(3, move |_| {
        let mut claimant = backlog_clone.claimant();
        let lease = claimant.prepare_for_processing(2).unwrap();
        lease.processing_failed();
    });

    assert_eq!(backlog.in_flight_len(), 0);
    assert_eq!(backlog.done_len(), 0);
    assert_eq!(backlog.pending_len(), 6);

    // Every original item is claimable again
    let mut claimant = backlog.claimant();
    let lease = claimant.prepare_for_processing(6).unwrap();
    let restored: HashSet<String> = lease.items().iter().cloned().collect();
    assert_eq!(restored, items.into_iter().collect());
    lease.processing_failed();
}

#[test]
fn mixed_commit_and_rollback_partition_the_items() {
    let backlog = Backlog::new();
    backlog.process_snapshot(names(&["a.dat", "b.dat", "c.dat", "d.dat"]));

    // 2 committers and 3 rollers race over 4 items. Claim loops retry on
    // an empty batch so every thread resolves exactly one non-empty lease.
    let backlog_clone = backlog.clone();
    run_concurrently(5, move |i| {
        let mut claimant = backlog_clone.claimant();
        loop {
            let lease = claimant.prepare_for_processing(1).unwrap();
            if lease.is_empty() {
                drop(lease);
                thread::yield_now();
                continue;
            }
            if i < 2 {
                lease.processed();
            } else {
                lease.processing_failed();
            }
            break;
        }
    });

    assert_eq!(backlog.in_flight_len(), 0);
    assert_eq!(backlog.done_len(), 2);
    assert_eq!(backlog.pending_len(), 2);

    // What is still pending is exactly what is not done
    let mut claimant = backlog.claimant();
    let lease = claimant.prepare_for_processing(4).unwrap();
    assert_eq!(lease.len(), 2);
    for item in lease.items() {
        assert!(!backlog.is_done(item));
    }
    lease.processing_failed();
}

#[test]
fn batches_claimed_in_bulk_stay_disjoint() {
    let backlog = Backlog::new();
    let universe: Vec<String> = (0..40).map(|i| format!("file-{:03}.dat", i)).collect();
    backlog.process_snapshot(universe.clone());

    let leases: Arc<Mutex<Vec<Lease<String>>>> = Arc::new(Mutex::new(Vec::new()));
    let backlog_clone = backlog.clone();
    let leases_clone = Arc::clone(&leases);

    run_concurrently(8, move |_| {
        let mut claimant = backlog_clone.claimant();
        let lease = claimant.prepare_for_processing(5).unwrap();
        leases_clone.lock().unwrap().push(lease);
    });

    // 8 claimants x 5 items == 40 available: everything distributed once
    assert!(backlog.is_empty());
    assert_eq!(backlog.in_flight_len(), 40);

    let leases = Arc::try_unwrap(leases).ok().unwrap().into_inner().unwrap();
    let mut seen: HashSet<String> = HashSet::new();
    for lease in &leases {
        assert_eq!(lease.len(), 5);
        for item in lease.items() {
            assert!(seen.insert(item.clone()), "item {} claimed twice", item);
        }
    }
    assert_eq!(seen, universe.into_iter().collect());

    for lease in leases {
        lease.processing_failed();
    }
    assert_eq!(backlog.pending_len(), 40);
}

#[test]
fn no_item_is_lost_or_duplicated_under_churn() {
    let backlog = Backlog::new();
    let universe: Vec<String> = (0..100).map(|i| format!("file-{:03}.dat", i)).collect();
    backlog.process_snapshot(universe.clone());

    // Workers alternate commit and rollback; the poller keeps re-feeding
    // the same snapshot; a sampler checks conservation the whole time
    let sampler_backlog = backlog.clone();
    let sampler = thread::spawn(move || {
        for _ in 0..500 {
            let counts = sampler_backlog.counts();
            let total = counts.pending + counts.in_flight + counts.done;
            assert_eq!(total, 100, "conservation violated: {:?}", counts);
            thread::yield_now();
        }
    });

    let snapshot_backlog = backlog.clone();
    let snapshot_universe = universe.clone();
    let feeder = thread::spawn(move || {
        for _ in 0..50 {
            snapshot_backlog.process_snapshot(snapshot_universe.clone());
            thread::yield_now();
        }
    });

    let backlog_clone = backlog.clone();
    run_concurrently(4, move |i| {
        let mut claimant = backlog_clone.claimant();
        for round in 0..200 {
            let lease = claimant.prepare_for_processing(3).unwrap();
            if lease.is_empty() {
                drop(lease);
                thread::yield_now();
                continue;
            }
            if (round + i) % 2 == 0 {
                lease.processed();
            } else {
                lease.processing_failed();
            }
        }
    });

    sampler.join().unwrap();
    feeder.join().unwrap();

    // Drain whatever survived the churn; the final state must partition
    // the universe between pending-turned-done and already-done
    let mut claimant = backlog.claimant();
    loop {
        let lease = claimant.prepare_for_processing(10).unwrap();
        if lease.is_empty() {
            break;
        }
        lease.processed();
    }

    assert!(backlog.is_drained());
    assert_eq!(backlog.done_len(), 100);
    for item in &universe {
        assert!(backlog.is_done(item));
    }
}

#[test]
fn rolled_back_items_outrank_fresh_discoveries() {
    let backlog = Backlog::new();
    backlog.process_snapshot(names(&["a.dat", "b.dat"]));

    let mut claimant = backlog.claimant();
    let lease = claimant.prepare_for_processing(2).unwrap();

    // A new snapshot lands while the batch is in flight, then the batch
    // fails
    backlog.process_snapshot(names(&["y.dat", "z.dat"]));
    lease.processing_failed();

    // The next claim sees the failed items first
    let lease = claimant.prepare_for_processing(2).unwrap();
    assert_eq!(lease.items(), names(&["a.dat", "b.dat"]));
    lease.processed();

    let lease = claimant.prepare_for_processing(2).unwrap();
    assert_eq!(lease.items(), names(&["y.dat", "z.dat"]));
    lease.processed();
}

#[test]
fn done_items_survive_concurrent_resnapshots() {
    let backlog = Backlog::new();
    let items: Vec<String> = (0..20).map(|i| format!("file-{:02}.dat", i)).collect();
    backlog.process_snapshot(items.clone());

    // One thread re-feeds the snapshot while others drain it
    let feeder_backlog = backlog.clone();
    let feeder_items = items.clone();
    let feeder = thread::spawn(move || {
        for _ in 0..100 {
            feeder_backlog.process_snapshot(feeder_items.clone());
            thread::yield_now();
        }
    });

    let backlog_clone = backlog.clone();
    run_concurrently(4, move |_| {
        let mut claimant = backlog_clone.claimant();
        loop {
            let lease = claimant.prepare_for_processing(4).unwrap();
            if lease.is_empty() {
                break;
            }
            lease.processed();
        }
    });

    feeder.join().unwrap();

    // Late snapshots must not resurrect finished items
    backlog.process_snapshot(items.clone());
    assert!(backlog.is_empty());
    assert_eq!(backlog.done_len(), 20);
}
