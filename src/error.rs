//! Error types for AtlasWAL
//!
//! Provides a unified error type for all log operations.

use std::io;

use thiserror::Error;

/// Result type alias using WalError
pub type Result<T> = std::result::Result<T, WalError>;

/// Unified error type for AtlasWAL operations
#[derive(Debug, Error)]
pub enum WalError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // -------------------------------------------------------------------------
    // Record Errors
    // -------------------------------------------------------------------------
    #[error("Record too large: {size} bytes (max {max})")]
    OversizedRecord { size: usize, max: usize },

    #[error("WAL corruption detected at position {position}: {reason}")]
    CorruptRecord { position: u64, reason: String },

    #[error("Invalid position {position}: log spans [{base}, {end}]")]
    InvalidPosition { position: u64, base: u64, end: u64 },

    // -------------------------------------------------------------------------
    // Backup Errors
    // -------------------------------------------------------------------------
    #[error("Backup size mismatch: expected {expected} bytes, copied {copied}")]
    BackupSizeMismatch { expected: u64, copied: u64 },

    #[error("Invalid backup id: {0:?}")]
    InvalidBackupId(String),

    /// The log could not be put back after a failed truncation. The on-disk
    /// state is indeterminate and the handle refuses further work.
    #[error("Rollback failed, log state is indeterminate: {source}")]
    RollbackFailed {
        #[source]
        source: Box<WalError>,
    },

    // -------------------------------------------------------------------------
    // Metadata Errors
    // -------------------------------------------------------------------------
    #[error("Metadata error: {0}")]
    Metadata(String),

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("WAL is closed")]
    Closed,

    #[error("WAL is poisoned by an earlier rollback failure")]
    Poisoned,
}

impl WalError {
    /// Whether this error leaves the on-disk log in an unknown state
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, WalError::RollbackFailed { .. } | WalError::Poisoned)
    }

    /// Duplicate an I/O failure so it can be handed to every request of a batch
    pub(crate) fn duplicate_io(err: &io::Error) -> Self {
        WalError::Io(io::Error::new(err.kind(), err.to_string()))
    }
}
