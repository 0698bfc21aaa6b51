//! Error types for file-courier
//!
//! This module defines the error hierarchy covering:
//! - Backlog usage-contract violations
//! - Directory polling errors
//! - Delivery (file move) errors
//! - Configuration and CLI errors
//! - Worker thread and journal errors
//!
//! Design philosophy:
//! - Use thiserror for structured error types in library code
//! - Errors should be actionable - include context about what to do
//! - Preserve error chains for debugging

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the file-courier application
#[derive(Error, Debug)]
pub enum CourierError {
    /// Backlog usage-contract violations
    #[error("Backlog error: {0}")]
    Backlog(#[from] BacklogError),

    /// Directory polling errors
    #[error("Poll error: {0}")]
    Poll(#[from] PollError),

    /// Delivery errors
    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Worker/concurrency errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    /// Journal writer errors
    #[error("Journal error: {0}")]
    Journal(#[from] JournalError),

    /// I/O errors (file operations, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Interrupted by signal
    #[error("Operation interrupted by signal")]
    Interrupted,
}

/// Backlog usage-contract violations
///
/// The backlog itself has no internal failure mode - these errors are raised
/// only when a caller breaks the claim protocol.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BacklogError {
    /// Batch size of zero requested
    #[error("Invalid batch size {size}: must be greater than zero")]
    InvalidBatchSize { size: usize },

    /// Claimant still holds an unresolved lease
    #[error("Previous lease of {held} item(s) is still unresolved - commit or roll it back before claiming again")]
    LeaseOutstanding { held: usize },
}

/// Directory polling errors
#[derive(Error, Debug)]
pub enum PollError {
    /// Failed to list the source directory
    #[error("Failed to read directory '{path}': {reason}")]
    ReadDirFailed { path: PathBuf, reason: String },

    /// Failed to stat an entry during the scan
    #[error("Failed to stat '{path}': {reason}")]
    StatFailed { path: PathBuf, reason: String },
}

/// Delivery errors
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// Source file disappeared between snapshot and delivery
    #[error("File not found: '{path}'")]
    NotFound { path: PathBuf },

    /// Move/copy operation failed
    #[error("Failed to deliver '{path}': {reason}")]
    TransferFailed { path: PathBuf, reason: String },
}

impl DeliveryError {
    /// Check if this error is recoverable (the item is worth retrying)
    ///
    /// A missing source file will not come back by retrying; everything
    /// else is treated as transient.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, DeliveryError::NotFound { .. })
    }
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid worker count
    #[error("Invalid worker count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Invalid batch size
    #[error("Invalid batch size {size}: must be between {min} and {max}")]
    InvalidBatchSize { size: usize, min: usize, max: usize },

    /// Invalid poll interval
    #[error("Invalid poll interval {millis}ms: must be at least {min}ms")]
    InvalidPollInterval { millis: u64, min: u64 },

    /// Invalid exclude pattern
    #[error("Invalid exclude pattern '{pattern}': {reason}")]
    InvalidExcludePattern { pattern: String, reason: String },

    /// Source directory error
    #[error("Invalid source directory '{path}': {reason}")]
    InvalidSourceDir { path: PathBuf, reason: String },

    /// Destination directory error
    #[error("Invalid destination directory '{path}': {reason}")]
    InvalidDestDir { path: PathBuf, reason: String },

    /// Journal path error
    #[error("Invalid journal path '{path}': {reason}")]
    InvalidJournalPath { path: PathBuf, reason: String },
}

/// Worker thread errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Worker panicked
    #[error("Worker {id} panicked: {message}")]
    Panicked { id: usize, message: String },

    /// Worker initialization failed
    #[error("Failed to initialize worker {id}: {reason}")]
    InitFailed { id: usize, reason: String },
}

/// Journal writer errors
#[derive(Error, Debug)]
pub enum JournalError {
    /// Failed to create the journal file
    #[error("Failed to create journal at '{path}': {reason}")]
    CreateFailed { path: PathBuf, reason: String },

    /// Journal channel closed unexpectedly
    #[error("Journal writer channel closed unexpectedly")]
    ChannelClosed,

    /// Write failed
    #[error("Journal write failed: {0}")]
    WriteFailed(String),
}

/// Result type alias for CourierError
pub type Result<T> = std::result::Result<T, CourierError>;

/// Represents the outcome of delivering a single item
#[derive(Debug)]
pub enum DeliveryOutcome {
    /// Item was delivered successfully
    Delivered { item: String, bytes: u64 },

    /// Delivery failed; the whole batch will be rolled back
    Failed { item: String, error: DeliveryError },
}

impl DeliveryOutcome {
    /// Returns true if this outcome represents a successful delivery
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }

    /// Returns the item associated with this outcome
    pub fn item(&self) -> &str {
        match self {
            DeliveryOutcome::Delivered { item, .. } => item,
            DeliveryOutcome::Failed { item, .. } => item,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_error_recoverable() {
        let not_found = DeliveryError::NotFound {
            path: "/spool/gone.dat".into(),
        };
        assert!(!not_found.is_recoverable());

        let transfer = DeliveryError::TransferFailed {
            path: "/spool/busy.dat".into(),
            reason: "resource busy".into(),
        };
        assert!(transfer.is_recoverable());
    }

    #[test]
    fn test_error_conversion() {
        let backlog_err = BacklogError::InvalidBatchSize { size: 0 };
        let courier_err: CourierError = backlog_err.into();
        assert!(matches!(courier_err, CourierError::Backlog(_)));
    }

    #[test]
    fn test_outcome_accessors() {
        let ok = DeliveryOutcome::Delivered {
            item: "a.dat".into(),
            bytes: 42,
        };
        assert!(ok.is_delivered());
        assert_eq!(ok.item(), "a.dat");

        let failed = DeliveryOutcome::Failed {
            item: "b.dat".into(),
            error: DeliveryError::NotFound {
                path: "/spool/b.dat".into(),
            },
        };
        assert!(!failed.is_delivered());
        assert_eq!(failed.item(), "b.dat");
    }
}
