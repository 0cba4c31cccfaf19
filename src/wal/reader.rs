//! WAL Reader
//!
//! Snapshot-bounded sequential scan over committed records.

use std::fs::File;
use std::io;

use bytes::Bytes;
use parking_lot::RwLockReadGuard;
use tracing::debug;

use crate::error::{Result, WalError};

use super::fileio;
use super::record::{Record, RecordHeader, HEADER_SIZE};
use super::storage::{LogFile, Storage};

/// Outcome of parsing one record from the file
#[derive(Debug)]
pub(crate) enum Parsed {
    /// A well-formed record (or sync marker); its payload is in the buffer
    Record(RecordHeader),
    /// Not enough bytes left for the header or the payload
    Truncated,
    /// Checksum mismatch
    Corrupt,
}

/// Parse the record starting at physical `offset`, never reading past `end`
pub(crate) fn read_record_at(
    file: &File,
    offset: u64,
    end: u64,
    buf: &mut Vec<u8>,
) -> io::Result<Parsed> {
    let remaining = end.saturating_sub(offset);
    if remaining < HEADER_SIZE as u64 {
        return Ok(Parsed::Truncated);
    }

    let mut raw = [0u8; HEADER_SIZE];
    if fileio::read_full_at(file, &mut raw, offset)? < HEADER_SIZE {
        return Ok(Parsed::Truncated);
    }
    let header = RecordHeader::decode(&raw);
    if header.record_len() > remaining {
        return Ok(Parsed::Truncated);
    }

    buf.clear();
    buf.resize(header.length as usize, 0);
    if fileio::read_full_at(file, buf, offset + HEADER_SIZE as u64)? < buf.len() {
        return Ok(Parsed::Truncated);
    }
    if !header.verify(buf) {
        return Ok(Parsed::Corrupt);
    }
    Ok(Parsed::Record(header))
}

/// Reads records from a snapshot of the log
///
/// Holds a shared lock for its whole lifetime, which keeps truncation,
/// backup and restore out until the reader is closed or dropped.
pub struct WalReader<'a> {
    log: RwLockReadGuard<'a, LogFile>,
    /// Logical position of the next record to parse
    pos: u64,
    /// Cursor captured at creation; nothing at or past it is visible
    size: u64,
}

impl<'a> WalReader<'a> {
    pub(crate) fn open(storage: &'a Storage, start: u64) -> Result<Self> {
        let log = storage.shared()?;
        let size = storage.position();
        if start > size {
            return Err(WalError::InvalidPosition {
                position: start,
                base: log.base,
                end: size,
            });
        }
        let pos = start.max(log.base);
        debug!(start = pos, size, "opened reader");
        Ok(Self { log, pos, size })
    }

    /// Read the next record
    ///
    /// Returns `Ok(None)` once the snapshot is exhausted. Sync markers are
    /// skipped. A checksum mismatch or a record running past the snapshot is
    /// reported as `CorruptRecord`.
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        loop {
            if self.pos >= self.size {
                return Ok(None);
            }

            let offset = self.log.physical(self.pos);
            let end = self.log.physical(self.size);
            let mut buf = Vec::new();
            let header = match read_record_at(&self.log.file, offset, end, &mut buf)? {
                Parsed::Record(header) => header,
                Parsed::Truncated => {
                    return Err(WalError::CorruptRecord {
                        position: self.pos,
                        reason: "record extends past end of log".to_string(),
                    })
                }
                Parsed::Corrupt => {
                    return Err(WalError::CorruptRecord {
                        position: self.pos,
                        reason: "checksum mismatch".to_string(),
                    })
                }
            };

            let position = self.pos;
            self.pos += header.record_len();
            if header.is_sync_marker() {
                continue;
            }
            return Ok(Some(Record {
                position,
                data: Bytes::from(buf),
            }));
        }
    }

    /// Logical position of the next record to parse
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Snapshot bound captured when the reader was opened
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Release the shared hold
    pub fn close(self) {}
}

impl Iterator for WalReader<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(e) => {
                // Stop after the first error instead of hitting it forever
                self.pos = self.size;
                Some(Err(e))
            }
        }
    }
}
