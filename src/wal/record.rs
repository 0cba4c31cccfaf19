//! WAL Record codec
//!
//! Fixed 8-byte header followed by the payload. Pure, no I/O.

use bytes::Bytes;

/// Size of an encoded record header: checksum (4) + length (4)
pub const HEADER_SIZE: usize = 8;

/// Largest payload a single record can carry
pub const MAX_RECORD_SIZE: usize = u32::MAX as usize;

/// Compute the CRC32 (IEEE) of a payload
pub fn checksum(payload: &[u8]) -> u32 {
    crc32fast::hash(payload)
}

/// On-disk size of a record carrying `payload_len` bytes
pub fn encoded_len(payload_len: usize) -> u64 {
    (HEADER_SIZE + payload_len) as u64
}

/// Header preceding every record
///
/// A header with `length == 0` is a sync marker. CRC32 of the empty input is
/// zero, so a sync marker encodes as eight zero bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordHeader {
    /// CRC32 of the payload bytes (header excluded)
    pub checksum: u32,
    /// Payload length in bytes
    pub length: u32,
}

impl RecordHeader {
    /// Build the header for a payload
    ///
    /// Callers must have rejected payloads above `MAX_RECORD_SIZE`.
    pub fn for_payload(payload: &[u8]) -> Self {
        debug_assert!(payload.len() <= MAX_RECORD_SIZE);
        Self {
            checksum: checksum(payload),
            length: payload.len() as u32,
        }
    }

    /// Header of a commit-boundary sentinel
    pub fn sync_marker() -> Self {
        Self::default()
    }

    pub fn is_sync_marker(&self) -> bool {
        self.length == 0
    }

    /// Size of header plus payload
    pub fn record_len(&self) -> u64 {
        encoded_len(self.length as usize)
    }

    /// Check a payload against the stored checksum
    pub fn verify(&self, payload: &[u8]) -> bool {
        payload.len() == self.length as usize && checksum(payload) == self.checksum
    }

    /// Encode as `checksum (u32 LE) | length (u32 LE)`
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.checksum.to_le_bytes());
        buf[4..8].copy_from_slice(&self.length.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8; HEADER_SIZE]) -> Self {
        Self {
            checksum: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            length: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
        }
    }
}

/// A record read back from the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Logical offset of the record header
    pub position: u64,
    /// Payload bytes
    pub data: Bytes,
}
