//! Delivery journal - JSON-lines audit trail of every outcome
//!
//! The journal runs in a dedicated thread and receives records via a
//! bounded channel, so workers never block on disk I/O. Each record is one
//! JSON object per line, append-only, making the journal greppable and
//! safe to tail while the courier runs.

use crate::error::{DeliveryOutcome, JournalError};
use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// Channel capacity between workers and the journal thread
const CHANNEL_CAPACITY: usize = 1024;

/// Message types sent to the journal thread
#[derive(Debug)]
enum JournalMessage {
    /// Append one record
    Record(JournalRecord),

    /// Flush buffered records to disk
    Flush,

    /// Flush and stop the journal thread
    Shutdown,
}

/// One journal line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalRecord {
    /// Wall-clock time of the outcome
    pub time: DateTime<Utc>,

    /// Worker that handled the item
    pub worker: usize,

    /// Item identifier (file name)
    pub item: String,

    /// "delivered" or "failed"
    pub outcome: String,

    /// Bytes handled (0 for failures)
    pub bytes: u64,

    /// Error text for failures
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl JournalRecord {
    /// Build a record from a worker's delivery outcome
    pub fn from_outcome(worker: usize, outcome: &DeliveryOutcome) -> Self {
        match outcome {
            DeliveryOutcome::Delivered { item, bytes } => Self {
                time: Utc::now(),
                worker,
                item: item.clone(),
                outcome: "delivered".to_string(),
                bytes: *bytes,
                error: None,
            },
            DeliveryOutcome::Failed { item, error } => Self {
                time: Utc::now(),
                worker,
                item: item.clone(),
                outcome: "failed".to_string(),
                bytes: 0,
                error: Some(error.to_string()),
            },
        }
    }
}

/// Statistics about journal writes
#[derive(Debug, Default)]
pub struct JournalStats {
    /// Total records written
    pub records_written: AtomicU64,

    /// Delivered records
    pub delivered: AtomicU64,

    /// Failed records
    pub failed: AtomicU64,
}

impl JournalStats {
    /// Get total records written
    pub fn records_written(&self) -> u64 {
        self.records_written.load(Ordering::Relaxed)
    }
}

/// Handle for sending records to the journal (clone for each worker)
#[derive(Clone)]
pub struct JournalHandle {
    sender: Sender<JournalMessage>,
    stats: Arc<JournalStats>,
}

impl JournalHandle {
    /// Append a record
    pub fn record(&self, record: JournalRecord) -> Result<(), JournalError> {
        self.sender
            .send(JournalMessage::Record(record))
            .map_err(|_| JournalError::ChannelClosed)
    }

    /// Request a flush of buffered records
    pub fn flush(&self) -> Result<(), JournalError> {
        self.sender
            .send(JournalMessage::Flush)
            .map_err(|_| JournalError::ChannelClosed)
    }

    /// Get journal statistics
    pub fn stats(&self) -> &JournalStats {
        &self.stats
    }
}

/// Journal writer that runs in its own thread
pub struct Journal {
    /// Thread handle
    handle: Option<JoinHandle<()>>,

    /// Sender kept for the shutdown message
    sender: Sender<JournalMessage>,

    /// Shared statistics
    stats: Arc<JournalStats>,
}

impl Journal {
    /// Open the journal file (append mode) and start the writer thread
    pub fn create(path: &Path) -> Result<Self, JournalError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| JournalError::CreateFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let (sender, receiver) = bounded(CHANNEL_CAPACITY);
        let stats = Arc::new(JournalStats::default());
        let stats_clone = Arc::clone(&stats);
        let journal_path = path.to_path_buf();

        let handle = thread::Builder::new()
            .name("courier-journal".to_string())
            .spawn(move || journal_loop(journal_path, BufWriter::new(file), receiver, stats_clone))
            .map_err(|e| JournalError::WriteFailed(e.to_string()))?;

        Ok(Self {
            handle: Some(handle),
            sender,
            stats,
        })
    }

    /// Get a handle for submitting records
    pub fn handle(&self) -> JournalHandle {
        JournalHandle {
            sender: self.sender.clone(),
            stats: Arc::clone(&self.stats),
        }
    }

    /// Get journal statistics
    pub fn stats(&self) -> &JournalStats {
        &self.stats
    }

    /// Flush remaining records, stop the writer thread, and return the
    /// final statistics
    ///
    /// Counters are only final once the writer thread has drained its
    /// channel, so they are handed back here rather than read live.
    pub fn finish(mut self) -> Result<Arc<JournalStats>, JournalError> {
        self.sender
            .send(JournalMessage::Shutdown)
            .map_err(|_| JournalError::ChannelClosed)?;
        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| JournalError::WriteFailed("journal thread panicked".to_string()))?;
        }
        Ok(Arc::clone(&self.stats))
    }
}

/// Main journal writer loop
fn journal_loop(
    path: PathBuf,
    mut writer: BufWriter<std::fs::File>,
    receiver: Receiver<JournalMessage>,
    stats: Arc<JournalStats>,
) {
    debug!(journal = %path.display(), "Journal writer starting");

    while let Ok(message) = receiver.recv() {
        match message {
            JournalMessage::Record(record) => match serde_json::to_string(&record) {
                Ok(line) => {
                    if let Err(e) = writeln!(writer, "{}", line) {
                        warn!(error = %e, "Journal write failed");
                        continue;
                    }
                    stats.records_written.fetch_add(1, Ordering::Relaxed);
                    if record.outcome == "delivered" {
                        stats.delivered.fetch_add(1, Ordering::Relaxed);
                    } else {
                        stats.failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
                Err(e) => warn!(error = %e, "Journal record serialization failed"),
            },
            JournalMessage::Flush => {
                if let Err(e) = writer.flush() {
                    warn!(error = %e, "Journal flush failed");
                }
            }
            JournalMessage::Shutdown => break,
        }
    }

    if let Err(e) = writer.flush() {
        warn!(error = %e, "Final journal flush failed");
    }

    debug!(
        records = stats.records_written.load(Ordering::Relaxed),
        "Journal writer shutting down"
    );
}
