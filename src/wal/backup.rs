//! WAL Backup and Restore
//!
//! A backup is a byte-for-byte copy of the log stored next to it as
//! `{path}.{id}`, plus `{path}.{id}.meta` when the log has a non-zero base.
//! Restoring moves the backup into place; the backup is consumed.

use std::fs;

use tracing::{error, info};
use uuid::Uuid;

use crate::error::{Result, WalError};

use super::fileio;
use super::handle::Wal;
use super::meta::{self, LogMeta, Pending};

/// Length of a backup id (simple-form UUID)
const BACKUP_ID_LEN: usize = 32;

fn validate_id(id: &str) -> Result<()> {
    let valid = id.len() == BACKUP_ID_LEN
        && id.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
    if !valid {
        return Err(WalError::InvalidBackupId(id.to_string()));
    }
    Ok(())
}

impl Wal {
    /// Copy the whole log to a new backup and return its id
    pub fn backup(&self) -> Result<String> {
        let log = self.storage.exclusive()?;
        let id = Uuid::new_v4().simple().to_string();
        let dest = self.storage.sibling(&id);

        let end = self.storage.position();
        self.copy_verified(&log, log.base, end, &dest)?;
        if let Err(e) = LogMeta::at(log.base).store(&dest, self.storage.file_mode()) {
            let _ = fileio::remove_if_exists(&dest);
            return Err(e);
        }

        info!(id = %id, bytes = end - log.base, "WAL backup created");
        Ok(id)
    }

    /// Replace the live log with the backup `id`
    ///
    /// The backup file is moved over the live log, not copied, so it cannot
    /// be restored twice.
    pub fn restore(&self, id: &str) -> Result<()> {
        validate_id(id)?;
        let mut log = self.storage.exclusive()?;
        let source = self.storage.sibling(id);
        if !source.exists() {
            return Err(WalError::InvalidBackupId(id.to_string()));
        }
        let backup_meta = LogMeta::load(&source)?;

        // Record the swap first so an interrupted restore is settled on open
        let intent = LogMeta::pending(
            log.base,
            Pending::Swap {
                source: id.to_string(),
                base: backup_meta.base,
            },
        );
        let recorded = intent
            .store(self.path(), self.storage.file_mode())
            .and_then(|_| self.storage.sync_dir().map_err(WalError::from));
        if let Err(e) = recorded {
            let _ = LogMeta::at(log.base).store(self.path(), self.storage.file_mode());
            return Err(e);
        }

        // rename replaces the live file in one step; past this point the
        // handle must either finish the swap or stop serving
        let swapped = fs::rename(&source, self.path())
            .map_err(WalError::from)
            .and_then(|_| LogMeta::at(backup_meta.base).store(self.path(), self.storage.file_mode()))
            .and_then(|_| self.storage.reopen(&mut log));
        if let Err(e) = swapped {
            self.storage.poison();
            error!(error = %e, id = %id, "WAL restore left the handle unusable");
            return Err(e);
        }
        fileio::remove_if_exists(&meta::meta_path(&source))?;
        self.storage.sync_dir()?;

        info!(id = %id, position = self.storage.position(), "WAL restored from backup");
        Ok(())
    }

    /// Delete the backup `id` without restoring it
    pub fn discard_backup(&self, id: &str) -> Result<()> {
        validate_id(id)?;
        let source = self.storage.sibling(id);
        fs::remove_file(&source)?;
        fileio::remove_if_exists(&meta::meta_path(&source))?;
        Ok(())
    }
}
