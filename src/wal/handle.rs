//! The public WAL handle
//!
//! Ties the storage handle, the append queue and the committer thread
//! together and owns their lifecycle.

use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam::channel::{self, Sender};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{Result, WalError};

use super::fileio;
use super::reader::WalReader;
use super::recovery::{self, RecoveryReport};
use super::storage::Storage;
use super::writer::{Committer, Request, RequestPool};

/// A single-file write-ahead log
///
/// ## Concurrency Model
///
/// - **Appends** (`write`/`write_batch`): any number of threads. Each caller
///   blocks until its record is flushed; concurrent callers share flushes.
/// - **Readers** (`new_reader`): any number, each over its own snapshot.
/// - **Administrative** (`truncate_*`, `backup`, `restore`): exclusive. They
///   wait for in-flight appends and open readers, and hold off new ones.
///
/// Share between threads with `Arc<Wal>`.
pub struct Wal {
    pub(super) config: Config,
    pub(super) storage: Arc<Storage>,
    pub(super) queue: Option<Sender<Request>>,
    pub(super) pool: RequestPool,
    committer: Option<JoinHandle<()>>,
    recovery: RecoveryReport,
}

impl Wal {
    /// Open or create the log at `path`, creating files with `file_mode`
    pub fn open(path: impl AsRef<Path>, file_mode: u32) -> Result<Self> {
        let config = Config::builder()
            .path(path.as_ref())
            .file_mode(file_mode)
            .build();
        Self::open_with_config(config)
    }

    /// Open or create a log with full configuration
    ///
    /// On startup:
    /// 1. Settle any interrupted truncation or restore, load the base offset
    /// 2. Open/create the log file
    /// 3. Cut off anything after the last sync marker
    /// 4. Start the committer
    pub fn open_with_config(config: Config) -> Result<Self> {
        let meta = recovery::settle_pending(&config)?;
        let file = fileio::open_rw(&config.path, config.file_mode)?;
        let report = recovery::recover(&file)?;

        let position = meta.base + report.valid_len;
        let storage = Arc::new(Storage::new(config.clone(), file, meta.base, position));

        let (tx, rx) = channel::bounded(config.queue_capacity);
        let committer = Committer::spawn(Arc::clone(&storage), rx, config.max_batch_size)?;

        info!(
            path = %config.path.display(),
            base = meta.base,
            position,
            "WAL opened"
        );

        Ok(Self {
            pool: RequestPool::new(config.queue_capacity),
            config,
            storage,
            queue: Some(tx),
            committer: Some(committer),
            recovery: report,
        })
    }

    /// Open a reader over everything committed so far, starting at `start`
    ///
    /// Positions below the base offset start at the first record still in
    /// the log.
    ///
    /// The reader keeps a shared hold until it is closed or dropped, which
    /// holds off truncation, backup and restore. The same thread must not
    /// open a second reader or call `write` while an exclusive operation is
    /// waiting; see [`Wal::write`].
    pub fn new_reader(&self, start: u64) -> Result<WalReader<'_>> {
        WalReader::open(&self.storage, start)
    }

    /// Scan the log at `path` without opening or modifying it
    pub fn verify(path: impl AsRef<Path>) -> Result<RecoveryReport> {
        recovery::verify(path.as_ref())
    }

    /// Stop the committer and sync the file
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        // Dropping the sender ends the committer loop once the queue drains
        drop(self.queue.take());
        if let Some(handle) = self.committer.take() {
            if handle.join().is_err() {
                error!("WAL committer panicked");
            }
        }

        let log = self.storage.exclusive_unchecked();
        if self.storage.is_poisoned() {
            return Err(WalError::Poisoned);
        }
        log.file.sync_all()?;
        info!(path = %self.config.path.display(), position = self.storage.position(), "WAL closed");
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Path of the log file
    pub fn path(&self) -> &Path {
        self.storage.path()
    }

    /// Position at which the next record will be written
    pub fn position(&self) -> u64 {
        self.storage.position()
    }

    /// Position of the first byte still in the log
    pub fn base(&self) -> u64 {
        self.storage.base()
    }

    /// What recovery found when the log was opened
    pub fn recovery_report(&self) -> &RecoveryReport {
        &self.recovery
    }

    /// Whether a failed rollback has disabled this handle
    pub fn is_poisoned(&self) -> bool {
        self.storage.is_poisoned()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for Wal {
    fn drop(&mut self) {
        if self.committer.is_some() {
            if let Err(e) = self.shutdown() {
                warn!(error = %e, "WAL shutdown on drop failed");
            }
        }
    }
}
