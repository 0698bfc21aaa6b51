//! Courier coordinator - orchestrates the polling session
//!
//! The coordinator is responsible for:
//! - Wiring the backlog between the poller and the workers
//! - Starting the journal, poller, and worker threads
//! - Waiting for drain (`--once`) or shutdown (continuous mode)
//! - Final statistics and cleanup
//!
//! A file that fails on every attempt is reclaimed and retried
//! indefinitely; in `--once` mode such a file keeps the drain from
//! completing until the session is interrupted.

use crate::backlog::Backlog;
use crate::config::CourierConfig;
use crate::delivery::{DeliveryAgent, MoveDelivery};
use crate::error::Result;
use crate::journal::Journal;
use crate::poller::Poller;
use crate::progress::ProgressReporter;
use crate::worker::{aggregate_stats, Worker, WorkerStats};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Interval between completion checks
const CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Consecutive drained checks required before declaring completion
const STABLE_CHECKS_REQUIRED: u32 = 3;

/// Result of a completed courier session
#[derive(Debug)]
pub struct CourierResult {
    /// Files delivered to the destination
    pub files_delivered: u64,

    /// Bytes delivered (sum of file sizes)
    pub bytes_delivered: u64,

    /// Batches committed
    pub batches_committed: u64,

    /// Batches rolled back for retry
    pub batches_rolled_back: u64,

    /// Delivery errors encountered
    pub errors: u64,

    /// Records written to the journal
    pub records_journaled: u64,

    /// Poll cycles completed
    pub poll_cycles: u64,

    /// Session duration
    pub duration: Duration,

    /// Whether the backlog was fully drained at stop time
    pub completed: bool,
}

/// Live progress information for display
#[derive(Debug, Clone)]
pub struct CourierProgress {
    /// Items waiting in the backlog
    pub pending: usize,

    /// Items out with workers
    pub in_flight: usize,

    /// Files delivered so far
    pub delivered: u64,

    /// Bytes delivered so far
    pub bytes: u64,

    /// Batches rolled back so far
    pub rollbacks: u64,

    /// Total worker threads
    pub workers: usize,

    /// Elapsed session time
    pub elapsed: Duration,
}

impl CourierProgress {
    /// Calculate deliveries per second
    pub fn files_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.delivered as f64 / secs
        } else {
            0.0
        }
    }
}

/// Coordinates the polling session
pub struct Coordinator {
    /// Configuration
    config: Arc<CourierConfig>,

    /// Shared work backlog
    backlog: Backlog<String>,

    /// Delivery agent handed to every worker
    agent: Arc<dyn DeliveryAgent>,

    /// Worker threads
    workers: Vec<Worker>,

    /// Worker stats handles for progress reporting
    worker_stats: Vec<Arc<WorkerStats>>,

    /// Shutdown signal
    shutdown: Arc<AtomicBool>,
}

impl Coordinator {
    /// Create a coordinator with the standard move-delivery agent
    pub fn new(config: CourierConfig) -> Self {
        let agent = Arc::new(MoveDelivery::new(&config.source_dir, &config.dest_dir));
        Self::with_agent(config, agent)
    }

    /// Create a coordinator with a custom delivery agent
    pub fn with_agent(config: CourierConfig, agent: Arc<dyn DeliveryAgent>) -> Self {
        Self {
            config: Arc::new(config),
            backlog: Backlog::new(),
            agent,
            workers: Vec::new(),
            worker_stats: Vec::new(),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get a clone of the shutdown flag (for signal handlers)
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Get a handle to the shared backlog (for monitoring)
    pub fn backlog(&self) -> Backlog<String> {
        self.backlog.clone()
    }

    /// Run the courier session
    pub fn run(mut self) -> Result<CourierResult> {
        let start = Instant::now();

        info!(
            source = %self.config.source_dir.display(),
            dest = %self.config.dest_dir.display(),
            workers = self.config.worker_count,
            once = self.config.run_once,
            "Starting courier session"
        );

        let journal = Journal::create(&self.config.journal_path)?;

        let poller = Poller::spawn(
            Arc::clone(&self.config),
            self.backlog.clone(),
            Arc::clone(&self.shutdown),
        )?;

        self.spawn_workers(&journal)?;

        let progress = self.spawn_progress(start);

        // Wait for completion
        let completed = if self.config.run_once {
            self.wait_for_drain(&poller)
        } else {
            self.wait_for_shutdown()
        };

        // Signal shutdown
        self.shutdown.store(true, Ordering::SeqCst);

        let poll_cycles = poller.stats().cycles.load(Ordering::Relaxed);
        poller.join();
        if let Some(handle) = progress {
            let _ = handle.join();
        }

        let (files, bytes, commits, rollbacks, errors) = self.join_workers();

        let records_journaled = journal.finish()?.records_written();

        let duration = start.elapsed();

        info!(
            delivered = files,
            bytes,
            rollbacks,
            errors,
            duration_secs = duration.as_secs(),
            "Courier session finished"
        );

        Ok(CourierResult {
            files_delivered: files,
            bytes_delivered: bytes,
            batches_committed: commits,
            batches_rolled_back: rollbacks,
            errors,
            records_journaled,
            poll_cycles,
            duration,
            completed,
        })
    }

    /// Spawn worker threads
    fn spawn_workers(&mut self, journal: &Journal) -> Result<()> {
        for id in 0..self.config.worker_count {
            let worker = Worker::spawn(
                id,
                Arc::clone(&self.config),
                self.backlog.clone(),
                Arc::clone(&self.agent),
                journal.handle(),
                Arc::clone(&self.shutdown),
            )?;

            self.worker_stats.push(worker.stats());
            self.workers.push(worker);
        }

        info!(count = self.workers.len(), "Workers spawned");
        Ok(())
    }

    /// Spawn the progress display thread, if enabled
    fn spawn_progress(&self, start: Instant) -> Option<JoinHandle<()>> {
        if !self.config.show_progress {
            return None;
        }

        let backlog = self.backlog.clone();
        let worker_stats = self.worker_stats.clone();
        let shutdown = Arc::clone(&self.shutdown);
        let workers = self.config.worker_count;

        thread::Builder::new()
            .name("courier-progress".to_string())
            .spawn(move || {
                let reporter = ProgressReporter::new();
                while !shutdown.load(Ordering::Relaxed) {
                    let counts = backlog.counts();
                    let mut delivered = 0u64;
                    let mut bytes = 0u64;
                    let mut rollbacks = 0u64;
                    for stats in &worker_stats {
                        delivered += stats.files_delivered.load(Ordering::Relaxed);
                        bytes += stats.bytes_delivered.load(Ordering::Relaxed);
                        rollbacks += stats.batches_rolled_back.load(Ordering::Relaxed);
                    }
                    reporter.update(&CourierProgress {
                        pending: counts.pending,
                        in_flight: counts.in_flight,
                        delivered,
                        bytes,
                        rollbacks,
                        workers,
                        elapsed: start.elapsed(),
                    });
                    thread::sleep(CHECK_INTERVAL);
                }
                reporter.finish_and_clear();
            })
            .ok()
    }

    /// Wait until the single snapshot has been taken and fully drained
    fn wait_for_drain(&self, poller: &Poller) -> bool {
        let mut stable_count = 0u32;

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                info!("Shutdown signal received during drain");
                return false;
            }

            // The backlog starts empty; only count drained checks once the
            // first snapshot has been merged
            let snapshot_taken = poller.stats().cycles.load(Ordering::Relaxed) > 0;

            if snapshot_taken && self.backlog.is_drained() {
                stable_count += 1;
                if stable_count >= STABLE_CHECKS_REQUIRED {
                    return true;
                }
            } else {
                stable_count = 0;
            }

            thread::sleep(CHECK_INTERVAL);
        }
    }

    /// Wait for the shutdown signal in continuous mode
    fn wait_for_shutdown(&self) -> bool {
        while !self.shutdown.load(Ordering::Relaxed) {
            thread::sleep(CHECK_INTERVAL);
        }
        info!("Shutdown signal received");
        self.backlog.is_drained()
    }

    /// Join all worker threads and collect final stats
    fn join_workers(&mut self) -> (u64, u64, u64, u64, u64) {
        let stats = aggregate_stats(&self.workers);

        let workers = std::mem::take(&mut self.workers);
        for worker in workers {
            if let Err(e) = worker.join() {
                warn!(error = %e, "Worker failed to join cleanly");
            }
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    fn drain_config(source: &Path, dest: &Path, journal: &Path) -> CourierConfig {
        CourierConfig {
            source_dir: source.to_path_buf(),
            dest_dir: dest.to_path_buf(),
            journal_path: journal.to_path_buf(),
            worker_count: 2,
            batch_size: 2,
            poll_interval: Duration::from_millis(100),
            min_age: Duration::ZERO,
            exclude_patterns: Vec::new(),
            run_once: true,
            show_progress: false,
            verbose: false,
        }
    }

    #[test]
    fn test_once_mode_drains_the_spool() {
        let source = tempdir().unwrap();
        let dest = tempdir().unwrap();
        let journal_dir = tempdir().unwrap();
        let journal_path = journal_dir.path().join("journal.jsonl");

        for i in 0..5 {
            fs::write(source.path().join(format!("f{}.dat", i)), b"data").unwrap();
        }

        let config = drain_config(source.path(), dest.path(), &journal_path);
        let result = Coordinator::new(config).run().unwrap();

        assert!(result.completed);
        assert_eq!(result.files_delivered, 5);
        assert_eq!(result.bytes_delivered, 20);
        assert_eq!(result.errors, 0);
        assert_eq!(result.records_journaled, 5);
        assert!(result.poll_cycles >= 1);

        for i in 0..5 {
            assert!(dest.path().join(format!("f{}.dat", i)).exists());
        }
        assert_eq!(fs::read_dir(source.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_once_mode_on_empty_spool_completes() {
        let source = tempdir().unwrap();
        let dest = tempdir().unwrap();
        let journal_dir = tempdir().unwrap();
        let journal_path = journal_dir.path().join("journal.jsonl");

        let config = drain_config(source.path(), dest.path(), &journal_path);
        let result = Coordinator::new(config).run().unwrap();

        assert!(result.completed);
        assert_eq!(result.files_delivered, 0);
    }
}
