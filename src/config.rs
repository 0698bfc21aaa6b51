//! Configuration types for file-courier
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation

use crate::error::ConfigError;
use clap::Parser;
use regex::Regex;
use std::path::PathBuf;
use std::time::Duration;

/// Maximum reasonable worker count
const MAX_WORKERS: usize = 256;

/// Batch size limits
const MIN_BATCH_SIZE: usize = 1;
const MAX_BATCH_SIZE: usize = 10_000;

/// Minimum poll interval in milliseconds
const MIN_POLL_INTERVAL_MS: u64 = 50;

/// Directory spool courier
#[derive(Parser, Debug, Clone)]
#[command(
    name = "file-courier",
    version,
    about = "Polls a spool directory and delivers files using a pool of workers",
    long_about = "Polls a source directory on an interval and delivers every regular file to a \
                  destination directory.\n\n\
                  Discovered files feed a shared work backlog; worker threads claim batches, move \
                  the files, and commit each batch as done or roll it back for retry on failure. \
                  Every delivery and rollback is recorded in a JSON-lines journal.",
    after_help = "EXAMPLES:\n    \
        file-courier /var/spool/inbox /var/spool/outbox\n    \
        file-courier ./inbox ./outbox -w 8 -b 16 --poll-interval 500\n    \
        file-courier ./inbox ./outbox --exclude '\\.tmp$' --min-age 2\n    \
        file-courier ./inbox ./outbox --once -q  # drain the spool and exit"
)]
pub struct CliArgs {
    /// Source (spool) directory to poll
    #[arg(value_name = "SOURCE_DIR")]
    pub source: PathBuf,

    /// Destination directory for delivered files
    #[arg(value_name = "DEST_DIR")]
    pub dest: PathBuf,

    /// Journal file recording every delivery outcome
    #[arg(short = 'j', long, default_value = "courier-journal.jsonl", value_name = "FILE")]
    pub journal: PathBuf,

    /// Number of delivery worker threads
    #[arg(
        short = 'w',
        long,
        default_value_t = default_workers(),
        value_name = "NUM"
    )]
    pub workers: usize,

    /// Items claimed per worker batch
    #[arg(short = 'b', long, default_value = "8", value_name = "NUM")]
    pub batch_size: usize,

    /// Poll interval in milliseconds
    #[arg(long, default_value = "1000", value_name = "MILLIS")]
    pub poll_interval: u64,

    /// Skip files modified less than this many seconds ago
    ///
    /// Gives producers time to finish writing before a file is picked up.
    #[arg(long, default_value = "0", value_name = "SECS")]
    pub min_age: u64,

    /// Exclude file names matching pattern (can be repeated)
    #[arg(long = "exclude", value_name = "PATTERN", action = clap::ArgAction::Append)]
    pub exclude_patterns: Vec<String>,

    /// Poll once, drain the backlog, and exit
    #[arg(long)]
    pub once: bool,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose output (show per-item delivery logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

fn default_workers() -> usize {
    // File moves are I/O bound but cheap; one worker per core is plenty
    num_cpus::get().max(1)
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct CourierConfig {
    /// Source (spool) directory
    pub source_dir: PathBuf,

    /// Destination directory
    pub dest_dir: PathBuf,

    /// Journal file path
    pub journal_path: PathBuf,

    /// Number of delivery worker threads
    pub worker_count: usize,

    /// Items claimed per worker batch
    pub batch_size: usize,

    /// Time between directory polls
    pub poll_interval: Duration,

    /// Minimum file age before pickup
    pub min_age: Duration,

    /// Compiled exclude patterns, matched against file names
    pub exclude_patterns: Vec<Regex>,

    /// Poll once and drain instead of running continuously
    pub run_once: bool,

    /// Show progress indicator
    pub show_progress: bool,

    /// Verbose logging
    pub verbose: bool,
}

impl CourierConfig {
    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        // Source must be an existing directory
        if !args.source.is_dir() {
            return Err(ConfigError::InvalidSourceDir {
                path: args.source.clone(),
                reason: "not an existing directory".into(),
            });
        }

        // Destination must be an existing directory
        if !args.dest.is_dir() {
            return Err(ConfigError::InvalidDestDir {
                path: args.dest.clone(),
                reason: "not an existing directory".into(),
            });
        }

        // Delivering a file onto itself would loop forever
        if same_dir(&args.source, &args.dest) {
            return Err(ConfigError::InvalidDestDir {
                path: args.dest.clone(),
                reason: "destination must differ from source".into(),
            });
        }

        // Validate worker count
        if args.workers == 0 || args.workers > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkerCount {
                count: args.workers,
                max: MAX_WORKERS,
            });
        }

        // Validate batch size
        if args.batch_size < MIN_BATCH_SIZE || args.batch_size > MAX_BATCH_SIZE {
            return Err(ConfigError::InvalidBatchSize {
                size: args.batch_size,
                min: MIN_BATCH_SIZE,
                max: MAX_BATCH_SIZE,
            });
        }

        // Validate poll interval
        if args.poll_interval < MIN_POLL_INTERVAL_MS {
            return Err(ConfigError::InvalidPollInterval {
                millis: args.poll_interval,
                min: MIN_POLL_INTERVAL_MS,
            });
        }

        // Compile exclude patterns
        let exclude_patterns = args
            .exclude_patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| ConfigError::InvalidExcludePattern {
                    pattern: p.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        // Validate journal parent directory
        if let Some(parent) = args.journal.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                return Err(ConfigError::InvalidJournalPath {
                    path: args.journal.clone(),
                    reason: format!("parent directory '{}' does not exist", parent.display()),
                });
            }
        }

        Ok(Self {
            source_dir: args.source,
            dest_dir: args.dest,
            journal_path: args.journal,
            worker_count: args.workers,
            batch_size: args.batch_size,
            poll_interval: Duration::from_millis(args.poll_interval),
            min_age: Duration::from_secs(args.min_age),
            exclude_patterns,
            run_once: args.once,
            show_progress: !args.quiet,
            verbose: args.verbose,
        })
    }

    /// Check if a file name should be excluded from delivery
    pub fn is_excluded(&self, name: &str) -> bool {
        self.exclude_patterns.iter().any(|re| re.is_match(name))
    }
}

/// Best-effort check that two paths name the same directory
fn same_dir(a: &PathBuf, b: &PathBuf) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn base_args(source: PathBuf, dest: PathBuf) -> CliArgs {
        CliArgs {
            source,
            dest,
            journal: PathBuf::from("courier-journal.jsonl"),
            workers: 4,
            batch_size: 8,
            poll_interval: 1000,
            min_age: 0,
            exclude_patterns: Vec::new(),
            once: false,
            quiet: true,
            verbose: false,
        }
    }

    #[test]
    fn test_valid_config() {
        let source = tempdir().unwrap();
        let dest = tempdir().unwrap();
        let config = CourierConfig::from_args(base_args(
            source.path().to_path_buf(),
            dest.path().to_path_buf(),
        ))
        .unwrap();

        assert_eq!(config.worker_count, 4);
        assert_eq!(config.poll_interval, Duration::from_millis(1000));
        assert!(!config.show_progress);
    }

    #[test]
    fn test_missing_source_rejected() {
        let dest = tempdir().unwrap();
        let args = base_args(PathBuf::from("/no/such/dir"), dest.path().to_path_buf());
        assert!(matches!(
            CourierConfig::from_args(args),
            Err(ConfigError::InvalidSourceDir { .. })
        ));
    }

    #[test]
    fn test_source_equals_dest_rejected() {
        let dir = tempdir().unwrap();
        let args = base_args(dir.path().to_path_buf(), dir.path().to_path_buf());
        assert!(matches!(
            CourierConfig::from_args(args),
            Err(ConfigError::InvalidDestDir { .. })
        ));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let source = tempdir().unwrap();
        let dest = tempdir().unwrap();
        let mut args = base_args(source.path().to_path_buf(), dest.path().to_path_buf());
        args.workers = 0;
        assert!(matches!(
            CourierConfig::from_args(args),
            Err(ConfigError::InvalidWorkerCount { .. })
        ));
    }

    #[test]
    fn test_batch_size_bounds() {
        let source = tempdir().unwrap();
        let dest = tempdir().unwrap();
        let mut args = base_args(source.path().to_path_buf(), dest.path().to_path_buf());
        args.batch_size = 0;
        assert!(matches!(
            CourierConfig::from_args(args),
            Err(ConfigError::InvalidBatchSize { .. })
        ));
    }

    #[test]
    fn test_bad_exclude_pattern_rejected() {
        let source = tempdir().unwrap();
        let dest = tempdir().unwrap();
        let mut args = base_args(source.path().to_path_buf(), dest.path().to_path_buf());
        args.exclude_patterns = vec!["[unclosed".into()];
        assert!(matches!(
            CourierConfig::from_args(args),
            Err(ConfigError::InvalidExcludePattern { .. })
        ));
    }

    #[test]
    fn test_exclude_matching() {
        let source = tempdir().unwrap();
        let dest = tempdir().unwrap();
        let mut args = base_args(source.path().to_path_buf(), dest.path().to_path_buf());
        args.exclude_patterns = vec![r"\.tmp$".into(), r"^\.".into()];
        let config = CourierConfig::from_args(args).unwrap();

        assert!(config.is_excluded("upload.tmp"));
        assert!(config.is_excluded(".hidden"));
        assert!(!config.is_excluded("report.csv"));
    }
}
