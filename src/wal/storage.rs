//! Storage Handle
//!
//! Owns the log file, its base offset and the logical write cursor.
//!
//! ## Concurrency:
//! - `log`: RwLock. Appenders and readers hold it shared for the whole call
//!   (or reader lifetime); truncation, backup, restore and close hold it
//!   exclusively.
//! - `pos`: atomic cursor. Only moves to a flushed commit boundary. The
//!   committer advances it while shared holds exist; exclusive holders may
//!   move it anywhere.
//! - `poisoned`: set once a rollback fails, never cleared.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::Config;
use crate::error::{Result, WalError};

use super::fileio;
use super::meta::LogMeta;
use super::record::{RecordHeader, HEADER_SIZE};

/// The open log file and the logical offset of its first byte
#[derive(Debug)]
pub(crate) struct LogFile {
    pub file: File,
    pub base: u64,
}

impl LogFile {
    /// Translate a logical position into an offset within the file
    pub(crate) fn physical(&self, position: u64) -> u64 {
        position - self.base
    }
}

#[derive(Debug)]
pub(crate) struct Storage {
    config: Config,
    log: RwLock<LogFile>,
    pos: AtomicU64,
    poisoned: AtomicBool,
}

impl Storage {
    pub(crate) fn new(config: Config, file: File, base: u64, pos: u64) -> Self {
        Self {
            config,
            log: RwLock::new(LogFile { file, base }),
            pos: AtomicU64::new(pos),
            poisoned: AtomicBool::new(false),
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.config.path
    }

    pub(crate) fn file_mode(&self) -> u32 {
        self.config.file_mode
    }

    /// `{path}.{suffix}`
    pub(crate) fn sibling(&self, suffix: &str) -> PathBuf {
        fileio::sibling(&self.config.path, suffix)
    }

    // =========================================================================
    // Holds
    // =========================================================================

    /// Shared hold for appends and readers
    pub(crate) fn shared(&self) -> Result<RwLockReadGuard<'_, LogFile>> {
        let guard = self.log.read();
        self.check_poisoned()?;
        Ok(guard)
    }

    /// Shared hold for the committer
    ///
    /// Every queued request belongs to an appender that is holding a shared
    /// hold, so a recursive read never waits behind a pending exclusive hold.
    pub(crate) fn committer_hold(&self) -> RwLockReadGuard<'_, LogFile> {
        self.log.read_recursive()
    }

    /// Exclusive hold for truncation, backup and restore
    pub(crate) fn exclusive(&self) -> Result<RwLockWriteGuard<'_, LogFile>> {
        let guard = self.log.write();
        self.check_poisoned()?;
        Ok(guard)
    }

    /// Exclusive hold that ignores poisoning (used on close)
    pub(crate) fn exclusive_unchecked(&self) -> RwLockWriteGuard<'_, LogFile> {
        self.log.write()
    }

    // =========================================================================
    // Cursor
    // =========================================================================

    /// Logical position at which the next record will be written
    pub(crate) fn position(&self) -> u64 {
        self.pos.load(Ordering::Acquire)
    }

    /// Logical position of the first byte in the file
    pub(crate) fn base(&self) -> u64 {
        self.log.read_recursive().base
    }

    pub(crate) fn set_position(&self, pos: u64) {
        self.pos.store(pos, Ordering::Release);
    }

    // =========================================================================
    // Poisoning
    // =========================================================================

    pub(crate) fn poison(&self) {
        self.poisoned.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::SeqCst)
    }

    fn check_poisoned(&self) -> Result<()> {
        if self.is_poisoned() {
            Err(WalError::Poisoned)
        } else {
            Ok(())
        }
    }

    // =========================================================================
    // Writes (committer or exclusive holders only)
    // =========================================================================
    //
    // These never move the cursor. The caller publishes a new position once
    // the bytes behind it are flushed, so readers only snapshot at commit
    // boundaries.

    /// Write one record at logical `pos`, returning the position just past it
    pub(crate) fn write_record_at(&self, log: &LogFile, pos: u64, payload: &[u8]) -> io::Result<u64> {
        let offset = log.physical(pos);
        let header = RecordHeader::for_payload(payload);
        fileio::write_all_at(&log.file, &header.encode(), offset)?;
        fileio::write_all_at(&log.file, payload, offset + HEADER_SIZE as u64)?;
        Ok(pos + header.record_len())
    }

    /// Write a sync marker at logical `pos` and flush the file, returning the
    /// position just past the marker
    pub(crate) fn write_sync_marker_at(&self, log: &LogFile, pos: u64) -> io::Result<u64> {
        let marker = RecordHeader::sync_marker().encode();
        fileio::write_all_at(&log.file, &marker, log.physical(pos))?;
        log.file.sync_data()?;
        Ok(pos + HEADER_SIZE as u64)
    }

    // =========================================================================
    // File swapping (exclusive holders only)
    // =========================================================================

    /// Reopen the log file from disk, reload its base offset and recompute
    /// the cursor from the file size
    pub(crate) fn reopen(&self, log: &mut LogFile) -> Result<()> {
        let meta = LogMeta::load(self.path())?;
        let file = fileio::open_rw(self.path(), self.config.file_mode)?;
        let len = fileio::file_len(&file)?;
        log.file = file;
        log.base = meta.base;
        self.set_position(meta.base + len);
        Ok(())
    }

    /// Make renames and removals in the log directory durable
    pub(crate) fn sync_dir(&self) -> io::Result<()> {
        if self.config.sync_directory {
            fileio::sync_parent_dir(self.path())?;
        }
        Ok(())
    }

    /// Copy the logical range `[from, to)` of the live file into a new file
    /// at `dest`, returning the number of bytes copied
    pub(crate) fn copy_to(&self, log: &LogFile, from: u64, to: u64, dest: &Path) -> io::Result<u64> {
        let mut out = fileio::create_new(dest, self.config.file_mode)?;
        fileio::copy_range(&log.file, log.physical(from), to - from, &mut out)
    }
}
