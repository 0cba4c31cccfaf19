//! WAL Recovery
//!
//! Runs once during open, before the committer starts:
//! 1. Settle any swap or cut the sidecar says was in flight
//! 2. Cut off everything after the last sync marker that is reachable
//!    through valid records

use std::fs::{self, File};
use std::io;
use std::path::Path;

use tracing::{info, warn};

use crate::config::Config;
use crate::error::Result;

use super::fileio;
use super::meta::{self, LogMeta, Pending};
use super::reader::{read_record_at, Parsed};
use super::truncate::{ROLLBACK_SUFFIX, TEMP_SUFFIX};

/// Result of a recovery (or verification) scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Data records before the last sync marker
    pub records_recovered: u64,

    /// Sync markers before the durable boundary
    pub sync_markers: u64,

    /// Physical length of the durable prefix
    pub valid_len: u64,

    /// Bytes after the durable prefix
    pub bytes_discarded: u64,

    /// Whether the file was (or would be) shortened
    pub was_truncated: bool,
}

/// Scan a log file without modifying it
pub(crate) fn scan(file: &File) -> io::Result<RecoveryReport> {
    let len = fileio::file_len(file)?;
    let mut report = RecoveryReport::default();
    if len == 0 {
        return Ok(report);
    }

    let mut offset = 0u64;
    let mut pending_records = 0u64;
    let mut buf = Vec::new();

    loop {
        match read_record_at(file, offset, len, &mut buf)? {
            Parsed::Record(header) => {
                offset += header.record_len();
                if header.is_sync_marker() {
                    report.sync_markers += 1;
                    report.records_recovered += pending_records;
                    report.valid_len = offset;
                    pending_records = 0;
                } else {
                    pending_records += 1;
                }
            }
            Parsed::Truncated => break,
            Parsed::Corrupt => {
                warn!(offset, "checksum mismatch during recovery scan");
                break;
            }
        }
    }

    report.bytes_discarded = len - report.valid_len;
    report.was_truncated = report.bytes_discarded > 0;
    Ok(report)
}

/// Scan the file and cut it back to the last sync boundary
pub(crate) fn recover(file: &File) -> Result<RecoveryReport> {
    let report = scan(file)?;

    if report.was_truncated {
        warn!(
            valid_len = report.valid_len,
            discarded = report.bytes_discarded,
            "discarding unsynced WAL tail"
        );
        file.set_len(report.valid_len)?;
        file.sync_all()?;
    }

    if report.valid_len > 0 || report.was_truncated {
        info!(
            records = report.records_recovered,
            sync_markers = report.sync_markers,
            valid_len = report.valid_len,
            "WAL recovery complete"
        );
    }

    Ok(report)
}

/// Scan the log at `path` read-only
pub(crate) fn verify(path: &Path) -> Result<RecoveryReport> {
    let file = File::open(path)?;
    Ok(scan(&file)?)
}

/// Finish or undo a file operation interrupted by a crash and return the
/// settled metadata for the log
///
/// - `Swap` whose source still exists: the rename never happened, keep the
///   old base. Otherwise the rename landed, adopt the new base.
/// - `Cut`: put `{path}.back` back if it is still there.
///
/// Leftover `{path}.temp` and `{path}.back` files belong to operations that
/// never got past their point of no return and are removed.
pub(crate) fn settle_pending(config: &Config) -> Result<LogMeta> {
    let path = config.path.as_path();
    let meta = LogMeta::load(path)?;
    let rollback = fileio::sibling(path, ROLLBACK_SUFFIX);

    let settled = match &meta.pending {
        None => meta.clone(),
        Some(Pending::Swap { source, base }) => {
            let source = fileio::sibling(path, source);
            if source.exists() {
                warn!(source = %source.display(), "undoing interrupted WAL swap");
                LogMeta::at(meta.base)
            } else {
                warn!(base = *base, "finishing interrupted WAL swap");
                fileio::remove_if_exists(&meta::meta_path(&source))?;
                LogMeta::at(*base)
            }
        }
        Some(Pending::Cut) => {
            if rollback.exists() {
                warn!("undoing interrupted WAL truncation");
                fs::rename(&rollback, path)?;
            }
            LogMeta::at(meta.base)
        }
    };
    if meta.pending.is_some() {
        settled.store(path, config.file_mode)?;
        if config.sync_directory {
            fileio::sync_parent_dir(path)?;
        }
    }

    // Only safe once the settled sidecar no longer points at them
    fileio::remove_if_exists(&fileio::sibling(path, TEMP_SUFFIX))?;
    fileio::remove_if_exists(&rollback)?;
    fileio::remove_if_exists(&fileio::sibling(&meta::meta_path(path), "tmp"))?;
    Ok(settled)
}
