//! Directory poller - the snapshot producer
//!
//! On every cycle the poller lists the source directory, reduces it to a
//! snapshot of deliverable file names, and merges the snapshot into the
//! shared backlog. The file name is the work-item identifier, so the same
//! file maps to the same identifier on every cycle; the backlog takes care
//! of skipping anything already pending, in flight, or delivered.

use crate::backlog::Backlog;
use crate::config::CourierConfig;
use crate::error::{PollError, Result};
use std::fs;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, trace, warn};

/// Granularity of the shutdown check while sleeping between polls
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Statistics collected by the poller
#[derive(Debug, Default)]
pub struct PollerStats {
    /// Poll cycles completed
    pub cycles: AtomicU64,

    /// File names seen across all snapshots (including repeats)
    pub files_seen: AtomicU64,

    /// Scan errors encountered
    pub errors: AtomicU64,
}

impl PollerStats {
    fn record_cycle(&self, seen: u64) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.files_seen.fetch_add(seen, Ordering::Relaxed);
    }

    fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }
}

/// Polls the source directory on an interval and feeds the backlog
pub struct Poller {
    /// Thread handle
    handle: Option<JoinHandle<()>>,

    /// Poller statistics
    stats: Arc<PollerStats>,
}

impl Poller {
    /// Spawn the poller thread
    pub fn spawn(
        config: Arc<CourierConfig>,
        backlog: Backlog<String>,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self> {
        let stats = Arc::new(PollerStats::default());
        let stats_clone = Arc::clone(&stats);

        let handle = thread::Builder::new()
            .name("courier-poller".to_string())
            .spawn(move || poll_loop(config, backlog, shutdown, stats_clone))?;

        Ok(Self {
            handle: Some(handle),
            stats,
        })
    }

    /// Get poller statistics
    pub fn stats(&self) -> &PollerStats {
        &self.stats
    }

    /// Wait for the poller thread to finish
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Main poller loop
fn poll_loop(
    config: Arc<CourierConfig>,
    backlog: Backlog<String>,
    shutdown: Arc<AtomicBool>,
    stats: Arc<PollerStats>,
) {
    info!(
        source = %config.source_dir.display(),
        interval_ms = config.poll_interval.as_millis() as u64,
        "Poller starting"
    );

    while !shutdown.load(Ordering::Relaxed) {
        match snapshot(&config) {
            Ok(names) => {
                stats.record_cycle(names.len() as u64);
                trace!(files = names.len(), "Snapshot taken");
                backlog.process_snapshot(names);
            }
            Err(e) => {
                // Scan failures are transient; retry on the next cycle
                stats.record_error();
                warn!(error = %e, "Directory scan failed");
            }
        }

        if config.run_once {
            debug!("Single poll complete");
            break;
        }

        sleep_until_shutdown(config.poll_interval, &shutdown);
    }

    info!(
        cycles = stats.cycles.load(Ordering::Relaxed),
        "Poller shutting down"
    );
}

/// Sleep for the poll interval, waking early on shutdown
fn sleep_until_shutdown(interval: Duration, shutdown: &AtomicBool) {
    let mut remaining = interval;
    while !remaining.is_zero() && !shutdown.load(Ordering::Relaxed) {
        let slice = remaining.min(SLEEP_SLICE);
        thread::sleep(slice);
        remaining = remaining.saturating_sub(slice);
    }
}

/// Take one snapshot of deliverable file names in the source directory
///
/// Only regular files with UTF-8 names are deliverable. Excluded names and
/// files younger than the settle age are skipped. The result is sorted so
/// discovery order is deterministic.
pub fn snapshot(config: &CourierConfig) -> std::result::Result<Vec<String>, PollError> {
    let entries = fs::read_dir(&config.source_dir).map_err(|e| PollError::ReadDirFailed {
        path: config.source_dir.clone(),
        reason: e.to_string(),
    })?;

    let now = SystemTime::now();
    let mut names = Vec::new();

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                trace!(error = %e, "Skipping unreadable directory entry");
                continue;
            }
        };

        // The name is the stable item identifier; non-UTF-8 names are skipped
        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(raw) => {
                warn!(name = ?raw, "Skipping file with non-UTF-8 name");
                continue;
            }
        };

        if config.is_excluded(&name) {
            trace!(item = %name, "Excluded by pattern");
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                trace!(item = %name, error = %e, "Skipping unstatable entry");
                continue;
            }
        };

        if !metadata.is_file() {
            continue;
        }

        // Settle age: leave files alone while a producer may still be writing
        if !config.min_age.is_zero() {
            if let Ok(mtime) = metadata.modified() {
                let age = now.duration_since(mtime).unwrap_or_default();
                if age < config.min_age {
                    trace!(item = %name, "Too young, waiting for settle age");
                    continue;
                }
            }
        }

        names.push(name);
    }

    names.sort_unstable();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CourierConfig;
    use std::path::Path;
    use tempfile::tempdir;

    fn test_config(source: &Path, dest: &Path) -> CourierConfig {
        CourierConfig {
            source_dir: source.to_path_buf(),
            dest_dir: dest.to_path_buf(),
            journal_path: dest.join("journal.jsonl"),
            worker_count: 1,
            batch_size: 8,
            poll_interval: Duration::from_millis(100),
            min_age: Duration::ZERO,
            exclude_patterns: Vec::new(),
            run_once: true,
            show_progress: false,
            verbose: false,
        }
    }

    #[test]
    fn test_snapshot_lists_regular_files_sorted() {
        let source = tempdir().unwrap();
        let dest = tempdir().unwrap();

        fs::write(source.path().join("b.dat"), b"b").unwrap();
        fs::write(source.path().join("a.dat"), b"a").unwrap();
        fs::create_dir(source.path().join("subdir")).unwrap();

        let config = test_config(source.path(), dest.path());
        let names = snapshot(&config).unwrap();
        assert_eq!(names, vec!["a.dat".to_string(), "b.dat".to_string()]);
    }

    #[test]
    fn test_snapshot_applies_excludes() {
        let source = tempdir().unwrap();
        let dest = tempdir().unwrap();

        fs::write(source.path().join("keep.csv"), b"x").unwrap();
        fs::write(source.path().join("skip.tmp"), b"x").unwrap();

        let mut config = test_config(source.path(), dest.path());
        config.exclude_patterns = vec![regex::Regex::new(r"\.tmp$").unwrap()];

        let names = snapshot(&config).unwrap();
        assert_eq!(names, vec!["keep.csv".to_string()]);
    }

    #[test]
    fn test_snapshot_respects_settle_age() {
        let source = tempdir().unwrap();
        let dest = tempdir().unwrap();

        fs::write(source.path().join("fresh.dat"), b"x").unwrap();

        let mut config = test_config(source.path(), dest.path());
        config.min_age = Duration::from_secs(3600);

        let names = snapshot(&config).unwrap();
        assert!(names.is_empty());
    }

    #[test]
    fn test_snapshot_missing_dir_errors() {
        let source = tempdir().unwrap();
        let dest = tempdir().unwrap();
        let mut config = test_config(source.path(), dest.path());
        config.source_dir = source.path().join("nope");

        assert!(matches!(
            snapshot(&config),
            Err(PollError::ReadDirFailed { .. })
        ));
    }

    #[test]
    fn test_poller_feeds_backlog_and_stops_in_once_mode() {
        let source = tempdir().unwrap();
        let dest = tempdir().unwrap();
        fs::write(source.path().join("a.dat"), b"a").unwrap();
        fs::write(source.path().join("b.dat"), b"b").unwrap();

        let config = Arc::new(test_config(source.path(), dest.path()));
        let backlog = Backlog::new();
        let shutdown = Arc::new(AtomicBool::new(false));

        let poller = Poller::spawn(config, backlog.clone(), shutdown).unwrap();
        poller.join();

        assert_eq!(backlog.pending_len(), 2);
    }
}
