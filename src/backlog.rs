//! Concurrent work backlog with batch checkout
//!
//! The backlog hands batches of discovered items to worker threads and lets
//! each worker commit its batch as done or roll it back for retry. Three
//! containers live behind a single lock so every operation observes and
//! mutates them as one atomic unit:
//!
//! - pending: ordered, duplicate-free queue of unclaimed items
//! - checked out: items currently leased to some worker
//! - done: items that completed successfully at least once (absorbing)
//!
//! Workers claim through a per-worker [`Claimant`] handle, which returns a
//! [`Lease`] owning the claimed batch. A lease must be resolved exactly once
//! with [`Lease::processed`] or [`Lease::processing_failed`]; dropping an
//! unresolved lease rolls its items back, so a panicking worker cannot
//! strand work. Rolled-back items go to the head of the queue and are
//! retried before anything discovered later.

use crate::error::BacklogError;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared backlog state, guarded by one mutex
///
/// The cross-container invariants (an item is in at most one of pending /
/// checked-out, done is absorbing) change jointly, so a single critical
/// section per operation covers all three containers.
struct State<T> {
    /// Unclaimed items in discovery order
    pending: VecDeque<T>,

    /// Membership mirror of `pending` for O(1) duplicate checks
    pending_set: HashSet<T>,

    /// Items currently out with some worker
    checked_out: HashSet<T>,

    /// Items that have completed successfully
    done: HashSet<T>,
}

impl<T> State<T> {
    fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            pending_set: HashSet::new(),
            checked_out: HashSet::new(),
            done: HashSet::new(),
        }
    }
}

/// Snapshot of container sizes, for progress reporting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BacklogCounts {
    /// Items waiting to be claimed
    pub pending: usize,

    /// Items leased to workers
    pub in_flight: usize,

    /// Items completed successfully
    pub done: usize,
}

/// Concurrent work backlog shared between a producer and worker threads
///
/// Cloning is cheap and yields another handle to the same backlog.
pub struct Backlog<T> {
    shared: Arc<Mutex<State<T>>>,
}

impl<T> Clone for Backlog<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Default for Backlog<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Backlog<T> {
    /// Create an empty backlog
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(State::new())),
        }
    }

    /// Create a claim handle for one worker
    ///
    /// Each worker thread gets its own claimant; a claimant refuses a new
    /// claim while its previous non-empty lease is unresolved.
    pub fn claimant(&self) -> Claimant<T> {
        Claimant {
            shared: Arc::clone(&self.shared),
            outstanding: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl<T: Clone + Eq + Hash> Backlog<T> {
    /// Merge a freshly discovered snapshot into the pending queue
    ///
    /// Items already pending, checked out, or done are skipped, so a
    /// completed item is never rediscovered and an in-flight item is never
    /// duplicated. Relative input order is preserved among newly added
    /// items.
    pub fn process_snapshot<I>(&self, items: I)
    where
        I: IntoIterator<Item = T>,
    {
        let mut state = self.shared.lock();
        let mut added = 0usize;
        let mut seen_again = 0usize;

        for item in items {
            if state.pending_set.contains(&item)
                || state.checked_out.contains(&item)
                || state.done.contains(&item)
            {
                seen_again += 1;
                continue;
            }
            state.pending_set.insert(item.clone());
            state.pending.push_back(item);
            added += 1;
        }

        drop(state);

        if added > 0 || seen_again > 0 {
            tracing::trace!(added, seen_again, "snapshot merged");
        }
    }

    /// True iff no unclaimed work remains
    ///
    /// Items out with workers are no longer considered backlog, so this
    /// ignores the checked-out and done sets.
    pub fn is_empty(&self) -> bool {
        self.shared.lock().pending.is_empty()
    }

    /// True iff nothing is pending and nothing is out with a worker
    ///
    /// This is the completion signal for a drain: every discovered item is
    /// either done or was never discovered.
    pub fn is_drained(&self) -> bool {
        let state = self.shared.lock();
        state.pending.is_empty() && state.checked_out.is_empty()
    }

    /// Number of unclaimed items
    pub fn pending_len(&self) -> usize {
        self.shared.lock().pending.len()
    }

    /// Number of items currently leased to workers
    pub fn in_flight_len(&self) -> usize {
        self.shared.lock().checked_out.len()
    }

    /// Number of items completed successfully
    pub fn done_len(&self) -> usize {
        self.shared.lock().done.len()
    }

    /// True iff the item has completed successfully
    pub fn is_done(&self, item: &T) -> bool {
        self.shared.lock().done.contains(item)
    }

    /// Sizes of all three containers in one lock acquisition
    pub fn counts(&self) -> BacklogCounts {
        let state = self.shared.lock();
        BacklogCounts {
            pending: state.pending.len(),
            in_flight: state.checked_out.len(),
            done: state.done.len(),
        }
    }
}

/// Per-worker claim handle
///
/// Owned exclusively by one worker thread. Claims race with other claimants
/// for head items; batches handed to concurrent claimants are pairwise
/// disjoint.
pub struct Claimant<T> {
    shared: Arc<Mutex<State<T>>>,

    /// Item count of this claimant's unresolved lease, 0 when free
    outstanding: Arc<AtomicUsize>,
}

impl<T: Clone + Eq + Hash> Claimant<T> {
    /// Atomically claim up to `n` items from the head of the pending queue
    ///
    /// Returns fewer items when fewer are available and an empty lease when
    /// the queue is empty; never blocks waiting for work. Claiming while a
    /// previous non-empty lease from this claimant is unresolved is a usage
    /// error, as is `n == 0`.
    pub fn prepare_for_processing(&mut self, n: usize) -> Result<Lease<T>, BacklogError> {
        if n == 0 {
            return Err(BacklogError::InvalidBatchSize { size: n });
        }

        let held = self.outstanding.load(Ordering::Acquire);
        if held > 0 {
            return Err(BacklogError::LeaseOutstanding { held });
        }

        let mut state = self.shared.lock();
        let mut items = Vec::with_capacity(n.min(state.pending.len()));

        while items.len() < n {
            match state.pending.pop_front() {
                Some(item) => {
                    state.pending_set.remove(&item);
                    state.checked_out.insert(item.clone());
                    items.push(item);
                }
                None => break,
            }
        }
        drop(state);

        if !items.is_empty() {
            self.outstanding.store(items.len(), Ordering::Release);
        }

        Ok(Lease {
            items,
            shared: Arc::clone(&self.shared),
            outstanding: Arc::clone(&self.outstanding),
        })
    }
}

/// A claimed batch, owned by the worker that claimed it
///
/// The lease is the worker's processing buffer: the items stay checked out
/// until the lease is resolved. Resolution consumes the lease; an
/// unresolved lease rolls back on drop.
#[must_use = "unresolved leases roll their items back on drop"]
pub struct Lease<T: Clone + Eq + Hash> {
    items: Vec<T>,
    shared: Arc<Mutex<State<T>>>,
    outstanding: Arc<AtomicUsize>,
}

impl<T: Clone + Eq + Hash> Lease<T> {
    /// Read-only view of the claimed batch
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Number of items in the batch
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True iff the claim came back empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Commit the batch: every item moves to the done set
    ///
    /// Done is absorbing - committed items are never re-added by a future
    /// snapshot. No-op for an empty lease.
    pub fn processed(mut self) {
        self.settle(true);
    }

    /// Roll the batch back to the head of the pending queue
    ///
    /// Failed items keep their relative order and are retried before any
    /// item that was already pending at the time of failure. No-op for an
    /// empty lease.
    pub fn processing_failed(mut self) {
        self.settle(false);
    }

    /// Resolve the lease, leaving it empty so the drop handler is a no-op
    fn settle(&mut self, commit: bool) {
        let items = std::mem::take(&mut self.items);
        if items.is_empty() {
            return;
        }

        let mut state = self.shared.lock();
        if commit {
            for item in items {
                state.checked_out.remove(&item);
                state.done.insert(item);
            }
        } else {
            // Reverse push_front keeps the batch's original relative order
            for item in items.into_iter().rev() {
                state.checked_out.remove(&item);
                let inserted = state.pending_set.insert(item.clone());
                debug_assert!(inserted, "rolled-back item was already pending");
                state.pending.push_front(item);
            }
        }
        drop(state);

        self.outstanding.store(0, Ordering::Release);
    }
}

impl<T: Clone + Eq + Hash> Drop for Lease<T> {
    fn drop(&mut self) {
        self.settle(false);
    }
}
