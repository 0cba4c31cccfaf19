//! WAL Truncation
//!
//! Cutting records off either end of the log. Both operations take the
//! exclusive hold and keep a full copy of the log in `{path}.back` until they
//! know the new log is in place.
//!
//! Before the live file is touched the sidecar records what is about to
//! happen (`Pending::Swap` or `Pending::Cut`), so an interrupted truncation
//! is finished or undone the next time the log is opened.

use std::fs;
use std::path::Path;

use tracing::{error, info};

use crate::error::{Result, WalError};

use super::fileio;
use super::handle::Wal;
use super::meta::{LogMeta, Pending};
use super::reader::{read_record_at, Parsed};
use super::storage::LogFile;

pub(super) const ROLLBACK_SUFFIX: &str = "back";
pub(super) const TEMP_SUFFIX: &str = "temp";

impl Wal {
    /// Drop every record before `position`
    ///
    /// Positions are not renumbered: the record that was at `position` is
    /// still at `position` afterwards, and `position` becomes the new base.
    /// `position` must be the start of a record or the end of the log.
    pub fn truncate_before(&self, position: u64) -> Result<()> {
        let mut log = self.storage.exclusive()?;
        let end = self.storage.position();
        check_range(position, log.base, end)?;
        if position == log.base {
            return Ok(());
        }
        check_boundary(&log, position, end)?;

        let old_base = log.base;
        let rollback = self.storage.sibling(ROLLBACK_SUFFIX);
        let temp = self.storage.sibling(TEMP_SUFFIX);

        self.copy_verified(&log, old_base, end, &rollback)?;
        if let Err(e) = self.copy_verified(&log, position, end, &temp) {
            let _ = fileio::remove_if_exists(&temp);
            let _ = fileio::remove_if_exists(&rollback);
            return Err(e);
        }

        // Record the swap, move the tail in, then settle the new base
        let intent = LogMeta::pending(
            old_base,
            Pending::Swap {
                source: TEMP_SUFFIX.to_string(),
                base: position,
            },
        );
        let swapped = intent
            .store(self.path(), self.storage.file_mode())
            .and_then(|_| self.storage.sync_dir().map_err(WalError::from))
            .and_then(|_| fs::rename(&temp, self.path()).map_err(WalError::from))
            .and_then(|_| LogMeta::at(position).store(self.path(), self.storage.file_mode()));
        if let Err(e) = swapped {
            // `.temp` tells open whether the rename landed; keep it until
            // the sidecar is settled again
            self.roll_back(&mut log, &rollback, old_base)?;
            let _ = fileio::remove_if_exists(&temp);
            return Err(e);
        }

        if let Err(e) = self.storage.reopen(&mut log) {
            // The new log is on disk but this handle still points at the old one
            self.storage.poison();
            error!(error = %e, "failed to reopen WAL after truncate_before");
            return Err(e);
        }
        fileio::remove_if_exists(&rollback)?;
        self.storage.sync_dir()?;

        info!(
            base = position,
            end = self.storage.position(),
            "truncated WAL front"
        );
        Ok(())
    }

    /// Drop every record at or after `position`
    ///
    /// A fresh sync marker is written at `position`, so the log is
    /// immediately readable and survives a reopen. `position` must be the
    /// start of a record or the end of the log.
    pub fn truncate_after(&self, position: u64) -> Result<()> {
        let mut log = self.storage.exclusive()?;
        let end = self.storage.position();
        check_range(position, log.base, end)?;
        check_boundary(&log, position, end)?;

        let base = log.base;
        let rollback = self.storage.sibling(ROLLBACK_SUFFIX);
        self.copy_verified(&log, base, end, &rollback)?;

        let intent = LogMeta::pending(base, Pending::Cut)
            .store(self.path(), self.storage.file_mode())
            .and_then(|_| self.storage.sync_dir().map_err(WalError::from));
        if let Err(e) = intent {
            let _ = fileio::remove_if_exists(&rollback);
            let _ = LogMeta::at(base).store(self.path(), self.storage.file_mode());
            return Err(e);
        }

        let cut = log
            .file
            .set_len(log.physical(position))
            .and_then(|_| self.storage.write_sync_marker_at(&log, position));
        match cut {
            Ok(committed) => self.storage.set_position(committed),
            Err(e) => {
                self.roll_back(&mut log, &rollback, base)?;
                return Err(e.into());
            }
        }

        fileio::remove_if_exists(&rollback)?;
        LogMeta::at(base).store(self.path(), self.storage.file_mode())?;
        self.storage.sync_dir()?;

        info!(end = self.storage.position(), "truncated WAL back");
        Ok(())
    }

    /// Copy the logical range `[from, to)` to `dest` and check nothing was lost
    pub(super) fn copy_verified(
        &self,
        log: &LogFile,
        from: u64,
        to: u64,
        dest: &Path,
    ) -> Result<()> {
        let expected = to - from;
        let copied = self.storage.copy_to(log, from, to, dest)?;
        if copied != expected {
            let _ = fileio::remove_if_exists(dest);
            return Err(WalError::BackupSizeMismatch { expected, copied });
        }
        Ok(())
    }

    /// Put the rollback copy back as the live log
    ///
    /// If that fails too the handle is poisoned: nobody can tell which
    /// version of the log is on disk.
    pub(super) fn roll_back(&self, log: &mut LogFile, rollback: &Path, base: u64) -> Result<()> {
        let restored = fs::rename(rollback, self.path())
            .map_err(WalError::from)
            .and_then(|_| LogMeta::at(base).store(self.path(), self.storage.file_mode()))
            .and_then(|_| self.storage.reopen(log))
            .and_then(|_| self.storage.sync_dir().map_err(WalError::from));

        match restored {
            Ok(()) => {
                info!(position = self.storage.position(), "WAL rolled back");
                Ok(())
            }
            Err(e) => {
                self.storage.poison();
                error!(error = %e, "WAL rollback failed, handle poisoned");
                Err(WalError::RollbackFailed {
                    source: Box::new(e),
                })
            }
        }
    }
}

fn check_range(position: u64, base: u64, end: u64) -> Result<()> {
    if position < base || position > end {
        return Err(WalError::InvalidPosition { position, base, end });
    }
    Ok(())
}

/// Walk the log from its base and make sure `position` starts a record,
/// a sync marker, or is the end of the log
fn check_boundary(log: &LogFile, position: u64, end: u64) -> Result<()> {
    let target = log.physical(position);
    let limit = log.physical(end);
    let mut offset = 0u64;
    let mut buf = Vec::new();

    while offset < target {
        match read_record_at(&log.file, offset, limit, &mut buf)? {
            Parsed::Record(header) => offset += header.record_len(),
            Parsed::Truncated | Parsed::Corrupt => {
                return Err(WalError::CorruptRecord {
                    position: log.base + offset,
                    reason: "unreadable record before truncation point".to_string(),
                })
            }
        }
    }

    if offset != target {
        return Err(WalError::InvalidPosition {
            position,
            base: log.base,
            end,
        });
    }
    Ok(())
}
