//! Delivery worker threads
//!
//! Each worker:
//! - Claims a batch of file names from the shared backlog
//! - Delivers every file through the delivery agent
//! - Commits the batch as done, or rolls the whole batch back on failure
//! - Records each outcome in the journal
//!
//! Failure granularity is the batch: one failed item rolls every item of
//! the batch back to the head of the backlog. Files already moved before
//! the failure are restored first, so a retried batch starts from the same
//! on-disk state it was claimed in.

use crate::backlog::Backlog;
use crate::config::CourierConfig;
use crate::delivery::DeliveryAgent;
use crate::error::{DeliveryError, DeliveryOutcome, WorkerError};
use crate::journal::{JournalHandle, JournalRecord};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{error, info, trace, warn};

/// Sleep when a claim comes back empty
const IDLE_BACKOFF: Duration = Duration::from_millis(50);

/// Sleep after a rolled-back batch before claiming again
const FAILURE_BACKOFF: Duration = Duration::from_millis(200);

/// Statistics collected by a worker
#[derive(Debug, Default)]
pub struct WorkerStats {
    /// Batches committed as done
    pub batches_committed: AtomicU64,

    /// Batches rolled back to the backlog
    pub batches_rolled_back: AtomicU64,

    /// Files delivered
    pub files_delivered: AtomicU64,

    /// Bytes delivered (sum of file sizes)
    pub bytes_delivered: AtomicU64,

    /// Delivery errors encountered
    pub errors: AtomicU64,
}

impl WorkerStats {
    fn record_commit(&self) {
        self.batches_committed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_rollback(&self) {
        self.batches_rolled_back.fetch_add(1, Ordering::Relaxed);
    }

    fn record_delivered(&self, bytes: u64) {
        self.files_delivered.fetch_add(1, Ordering::Relaxed);
        self.bytes_delivered.fetch_add(bytes, Ordering::Relaxed);
    }

    fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }
}

/// A worker thread that delivers claimed batches
pub struct Worker {
    /// Worker ID
    id: usize,

    /// Thread handle
    handle: Option<JoinHandle<()>>,

    /// Worker statistics
    stats: Arc<WorkerStats>,
}

impl Worker {
    /// Spawn a new worker thread
    pub fn spawn(
        id: usize,
        config: Arc<CourierConfig>,
        backlog: Backlog<String>,
        agent: Arc<dyn DeliveryAgent>,
        journal: JournalHandle,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self, WorkerError> {
        let stats = Arc::new(WorkerStats::default());
        let stats_clone = Arc::clone(&stats);

        let handle = thread::Builder::new()
            .name(format!("courier-{}", id))
            .spawn(move || {
                worker_loop(id, config, backlog, agent, journal, shutdown, stats_clone)
            })
            .map_err(|e| WorkerError::InitFailed {
                id,
                reason: e.to_string(),
            })?;

        Ok(Self {
            id,
            handle: Some(handle),
            stats,
        })
    }

    /// Get worker ID
    pub fn id(&self) -> usize {
        self.id
    }

    /// Get worker statistics
    pub fn stats(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.stats)
    }

    /// Wait for the worker to finish
    pub fn join(mut self) -> Result<(), WorkerError> {
        if let Some(handle) = self.handle.take() {
            handle.join().map_err(|_| WorkerError::Panicked {
                id: self.id,
                message: "Worker thread panicked".into(),
            })?;
        }
        Ok(())
    }
}

/// Main worker loop
fn worker_loop(
    id: usize,
    config: Arc<CourierConfig>,
    backlog: Backlog<String>,
    agent: Arc<dyn DeliveryAgent>,
    journal: JournalHandle,
    shutdown: Arc<AtomicBool>,
    stats: Arc<WorkerStats>,
) {
    info!(worker = id, "Worker starting");

    let mut claimant = backlog.claimant();

    while !shutdown.load(Ordering::Relaxed) {
        let lease = match claimant.prepare_for_processing(config.batch_size) {
            Ok(lease) => lease,
            Err(e) => {
                // Only reachable through a claim-protocol bug in this loop
                error!(worker = id, error = %e, "Claim refused, stopping worker");
                break;
            }
        };

        if lease.is_empty() {
            drop(lease);
            thread::sleep(IDLE_BACKOFF);
            continue;
        }

        trace!(worker = id, batch = lease.len(), "Batch claimed");

        let mut delivered: Vec<(String, u64)> = Vec::with_capacity(lease.len());
        let mut failure: Option<(String, DeliveryError)> = None;

        for item in lease.items() {
            match agent.deliver(item) {
                Ok(bytes) => delivered.push((item.clone(), bytes)),
                Err(e) => {
                    failure = Some((item.clone(), e));
                    break;
                }
            }
        }

        match failure {
            None => {
                for (item, bytes) in &delivered {
                    stats.record_delivered(*bytes);
                    if config.verbose {
                        info!(worker = id, item = %item, bytes, "Delivered");
                    }
                    let record = JournalRecord::from_outcome(
                        id,
                        &DeliveryOutcome::Delivered {
                            item: item.clone(),
                            bytes: *bytes,
                        },
                    );
                    if let Err(e) = journal.record(record) {
                        error!(worker = id, error = %e, "Failed to journal delivery");
                    }
                }
                let batch = lease.len();
                lease.processed();
                stats.record_commit();
                trace!(worker = id, batch, "Batch committed");
            }
            Some((item, e)) => {
                stats.record_error();
                warn!(
                    worker = id,
                    item = %item,
                    error = %e,
                    "Delivery failed, rolling batch back"
                );

                // Undo the partial delivery so the retried batch starts
                // from the state it was claimed in
                for (name, _) in delivered.iter().rev() {
                    if let Err(restore_err) = agent.restore(name) {
                        error!(
                            worker = id,
                            item = %name,
                            error = %restore_err,
                            "Restore failed after batch failure"
                        );
                    }
                }

                let record = JournalRecord::from_outcome(
                    id,
                    &DeliveryOutcome::Failed {
                        item,
                        error: e,
                    },
                );
                if let Err(journal_err) = journal.record(record) {
                    error!(worker = id, error = %journal_err, "Failed to journal failure");
                }

                lease.processing_failed();
                stats.record_rollback();
                thread::sleep(FAILURE_BACKOFF);
            }
        }
    }

    info!(
        worker = id,
        delivered = stats.files_delivered.load(Ordering::Relaxed),
        rollbacks = stats.batches_rolled_back.load(Ordering::Relaxed),
        "Worker shutting down"
    );
}

/// Aggregate statistics from multiple workers
pub fn aggregate_stats(workers: &[Worker]) -> (u64, u64, u64, u64, u64) {
    let mut files = 0u64;
    let mut bytes = 0u64;
    let mut commits = 0u64;
    let mut rollbacks = 0u64;
    let mut errors = 0u64;

    for worker in workers {
        files += worker.stats.files_delivered.load(Ordering::Relaxed);
        bytes += worker.stats.bytes_delivered.load(Ordering::Relaxed);
        commits += worker.stats.batches_committed.load(Ordering::Relaxed);
        rollbacks += worker.stats.batches_rolled_back.load(Ordering::Relaxed);
        errors += worker.stats.errors.load(Ordering::Relaxed);
    }

    (files, bytes, commits, rollbacks, errors)
}
