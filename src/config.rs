//! Configuration for AtlasWAL
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

/// Default permission bits for the log file and its sidecars
pub const DEFAULT_FILE_MODE: u32 = 0o664;

/// Default number of append requests that may be queued for the committer
pub const DEFAULT_QUEUE_CAPACITY: usize = 1 << 10;

/// Main configuration for a WAL instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // File Configuration
    // -------------------------------------------------------------------------
    /// Path of the log file. Sidecar files live next to it:
    ///   {path}          (records)
    ///   {path}.meta     (base offset, only after a front truncation)
    ///   {path}.back     (rollback copy during truncation)
    ///   {path}.temp     (new log being built by truncate_before)
    ///   {path}.{id}     (backups)
    pub path: PathBuf,

    /// Permission bits used when creating files (ignored off Unix)
    pub file_mode: u32,

    /// fsync the parent directory after renames and removals
    pub sync_directory: bool,

    // -------------------------------------------------------------------------
    // Group Commit Configuration
    // -------------------------------------------------------------------------
    /// Capacity of the append queue between writers and the committer
    pub queue_capacity: usize,

    /// Upper bound on requests folded into a single commit
    pub max_batch_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./atlaswal.log"),
            file_mode: DEFAULT_FILE_MODE,
            sync_directory: true,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_batch_size: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the log file path
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.path = path.into();
        self
    }

    /// Set the permission bits for created files
    pub fn file_mode(mut self, mode: u32) -> Self {
        self.config.file_mode = mode;
        self
    }

    /// Enable or disable directory fsync after renames
    pub fn sync_directory(mut self, enabled: bool) -> Self {
        self.config.sync_directory = enabled;
        self
    }

    /// Set the append queue capacity (at least 1)
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity.max(1);
        self
    }

    /// Set the maximum number of requests per commit (at least 1)
    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.config.max_batch_size = size.max(1);
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
