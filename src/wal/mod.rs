//! Write-Ahead Log (WAL) Module
//!
//! Durable, ordered storage of opaque records in a single file.
//!
//! ## Responsibilities
//! - Append records with group commit (one flush per batch of writers)
//! - CRC32 checksums for corruption detection
//! - Crash recovery back to the last sync marker
//! - Snapshot readers, truncation from either end, backup/restore
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────┐
//! │ Record                          │
//! │ ┌─────────┬─────────┬────────┐  │
//! │ │ CRC (4) │ Len (4) │ Data   │  │
//! │ └─────────┴─────────┴────────┘  │
//! ├─────────────────────────────────┤
//! │ ... more records ...            │
//! ├─────────────────────────────────┤
//! │ Sync marker (end of a batch)    │
//! │ ┌─────────┬─────────┐           │
//! │ │ 0 (4)   │ 0 (4)   │           │
//! │ └─────────┴─────────┘           │
//! └─────────────────────────────────┘
//! ```
//! Both header fields are little-endian `u32`. The CRC covers the payload
//! only. There is no file header; any sequence of valid records is a log.

mod backup;
mod fileio;
mod handle;
mod meta;
mod reader;
mod record;
mod recovery;
mod storage;
mod truncate;
mod writer;

pub use handle::Wal;
pub use reader::WalReader;
pub use record::{checksum, encoded_len, Record, RecordHeader, HEADER_SIZE, MAX_RECORD_SIZE};
pub use recovery::RecoveryReport;
