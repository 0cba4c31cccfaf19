//! Base-offset sidecar
//!
//! Front truncation keeps record positions stable by remembering the logical
//! offset of the first byte still in the file. That offset lives in
//! `{path}.meta`; a missing sidecar means the log starts at offset 0.
//!
//! Operations that replace or cut the log file record their intent here
//! before touching it, so open can finish or undo them after a crash.
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────┬──────────┐
//! │ bincode(LogMeta)         │ CRC (4)  │
//! └──────────────────────────┴──────────┘
//! ```

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, WalError};

use super::fileio;

const META_SUFFIX: &str = "meta";

/// A file operation that was in flight when the sidecar was written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum Pending {
    /// `{path}.{source}` is being renamed over the log. Once the rename has
    /// happened the log starts at `base`.
    Swap { source: String, base: u64 },
    /// The log is being cut in place; `{path}.back` holds the previous file
    Cut,
}

/// Persistent metadata for a log file
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub(crate) struct LogMeta {
    /// Logical position of physical offset 0
    pub base: u64,
    pub pending: Option<Pending>,
}

/// Sidecar path for a log (or backup) file
pub(crate) fn meta_path(log_path: &Path) -> PathBuf {
    fileio::sibling(log_path, META_SUFFIX)
}

impl LogMeta {
    /// Settled metadata for a log starting at `base`
    pub(crate) fn at(base: u64) -> Self {
        Self {
            base,
            pending: None,
        }
    }

    /// Metadata for a log starting at `base` with `pending` in flight
    pub(crate) fn pending(base: u64, pending: Pending) -> Self {
        Self {
            base,
            pending: Some(pending),
        }
    }

    /// Load the sidecar for `log_path`, defaulting to base 0 when absent
    pub(crate) fn load(log_path: &Path) -> Result<Self> {
        let bytes = match fs::read(meta_path(log_path)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        Self::decode(&bytes)
    }

    /// Persist the sidecar for `log_path`
    ///
    /// A settled base 0 is stored by removing the sidecar. Otherwise the
    /// sidecar is written to a temporary file and renamed into place.
    pub(crate) fn store(&self, log_path: &Path, mode: u32) -> Result<()> {
        let path = meta_path(log_path);
        if self.base == 0 && self.pending.is_none() {
            fileio::remove_if_exists(&path)?;
            return Ok(());
        }
        let tmp = fileio::sibling(&path, "tmp");
        let mut file = fileio::create_new(&tmp, mode)?;
        file.write_all(&self.encode()?)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn encode(&self) -> Result<Vec<u8>> {
        let mut bytes =
            bincode::serialize(self).map_err(|e| WalError::Metadata(e.to_string()))?;
        let crc = crc32fast::hash(&bytes);
        bytes.extend_from_slice(&crc.to_le_bytes());
        Ok(bytes)
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 4 {
            return Err(WalError::Metadata(format!(
                "sidecar too short: {} bytes",
                bytes.len()
            )));
        }
        let (body, crc) = bytes.split_at(bytes.len() - 4);
        let stored = u32::from_le_bytes([crc[0], crc[1], crc[2], crc[3]]);
        if crc32fast::hash(body) != stored {
            return Err(WalError::Metadata("sidecar checksum mismatch".to_string()));
        }
        bincode::deserialize(body).map_err(|e| WalError::Metadata(e.to_string()))
    }
}
