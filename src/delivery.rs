//! Delivery agents - how claimed files leave the spool
//!
//! Workers hand each claimed item to a [`DeliveryAgent`]. The production
//! agent moves the file from the source directory to the destination
//! directory; tests substitute their own agents to exercise failure paths.

use crate::error::DeliveryError;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::trace;

/// Performs the actual processing of one claimed item
///
/// `deliver` returns the number of bytes handled. Any error rolls the whole
/// batch back to the backlog.
pub trait DeliveryAgent: Send + Sync + 'static {
    /// Deliver one item, identified by its file name
    fn deliver(&self, name: &str) -> Result<u64, DeliveryError>;

    /// Undo a completed delivery
    ///
    /// Called for the already-delivered items of a batch that failed
    /// partway, before the batch is rolled back. Agents whose `deliver` is
    /// non-destructive can leave the default no-op.
    fn restore(&self, _name: &str) -> Result<(), DeliveryError> {
        Ok(())
    }
}

/// Moves files from the source directory to the destination directory
///
/// Uses `rename` when source and destination share a filesystem and falls
/// back to copy-then-remove otherwise. An existing file of the same name in
/// the destination is overwritten.
pub struct MoveDelivery {
    source_dir: PathBuf,
    dest_dir: PathBuf,
}

impl MoveDelivery {
    /// Create a move agent between two directories
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(source_dir: P, dest_dir: Q) -> Self {
        Self {
            source_dir: source_dir.as_ref().to_path_buf(),
            dest_dir: dest_dir.as_ref().to_path_buf(),
        }
    }

    fn transfer_failed(path: &Path, e: &io::Error) -> DeliveryError {
        DeliveryError::TransferFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
    }
}

impl DeliveryAgent for MoveDelivery {
    fn deliver(&self, name: &str) -> Result<u64, DeliveryError> {
        let from = self.source_dir.join(name);
        let to = self.dest_dir.join(name);

        let metadata = fs::metadata(&from).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                DeliveryError::NotFound { path: from.clone() }
            } else {
                Self::transfer_failed(&from, &e)
            }
        })?;
        let bytes = metadata.len();

        match fs::rename(&from, &to) {
            Ok(()) => {
                trace!(item = %name, bytes, "Moved");
                Ok(bytes)
            }
            Err(rename_err) => {
                // Rename fails across filesystems; copy then remove
                fs::copy(&from, &to).map_err(|_| Self::transfer_failed(&from, &rename_err))?;
                fs::remove_file(&from).map_err(|e| Self::transfer_failed(&from, &e))?;
                trace!(item = %name, bytes, "Copied across filesystems");
                Ok(bytes)
            }
        }
    }

    fn restore(&self, name: &str) -> Result<(), DeliveryError> {
        let from = self.dest_dir.join(name);
        let to = self.source_dir.join(name);

        match fs::rename(&from, &to) {
            Ok(()) => {
                trace!(item = %name, "Restored to spool");
                Ok(())
            }
            Err(rename_err) => {
                fs::copy(&from, &to).map_err(|_| Self::transfer_failed(&from, &rename_err))?;
                fs::remove_file(&from).map_err(|e| Self::transfer_failed(&from, &e))?;
                trace!(item = %name, "Restored to spool across filesystems");
                Ok(())
            }
        }
    }
}
