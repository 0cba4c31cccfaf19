//! # AtlasWAL
//!
//! A single-file, append-only write-ahead log with:
//! - Group commit: concurrent writers share one flush per batch
//! - Crash recovery that cuts the log back to the last sync marker
//! - Snapshot readers that never see records appended after they open
//! - Truncation from either end, guarded by a rollback copy
//! - Whole-log backup and restore
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              Callers (many threads, Arc<Wal>)                │
//! └──────────┬──────────────────────┬───────────────────┬───────┘
//!            │ write (shared)       │ new_reader        │ truncate / backup
//!            ▼                      │ (shared)          │ (exclusive)
//!   ┌─────────────────┐             │                   │
//!   │  Append Queue   │             │                   │
//!   │ (bounded chan)  │             │                   │
//!   └────────┬────────┘             │                   │
//!            ▼                      ▼                   ▼
//!   ┌─────────────────┐     ┌─────────────────────────────────┐
//!   │   Committer     │────▶│         Storage Handle          │
//!   │ (one thread)    │     │  (RwLock<file>, atomic cursor)  │
//!   └─────────────────┘     └─────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use atlaswal::Wal;
//!
//! let wal = Wal::open("data.wal", 0o664)?;
//! let pos = wal.write(b"hello")?;
//!
//! let mut reader = wal.new_reader(0)?;
//! while let Some(record) = reader.next_record()? {
//!     println!("{} => {:?}", record.position, record.data);
//! }
//! reader.close();
//!
//! wal.close()?;
//! # let _ = pos;
//! # Ok::<(), atlaswal::WalError>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;

pub mod wal;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::Config;
pub use error::{Result, WalError};
pub use wal::{Record, RecoveryReport, Wal, WalReader};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of AtlasWAL
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
