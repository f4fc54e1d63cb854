//! Configuration for SparseKV
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{KvError, Result};

/// Main configuration for a SparseKV instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── wal/             (one log per memtable generation)
    ///     └── segments/        (segment files, named by decimal id)
    pub data_dir: PathBuf,

    /// Distance in bytes between sparse index breakpoints
    pub index_block_size: u64,

    /// Read granularity for key scans and sequential cursors
    pub scan_chunk_size: usize,

    // -------------------------------------------------------------------------
    // WAL Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: how often to fsync WAL
    pub wal_sync_strategy: WalSyncStrategy,

    // -------------------------------------------------------------------------
    // MemTable Configuration
    // -------------------------------------------------------------------------
    /// Number of distinct keys that triggers a flush
    pub memtable_threshold: usize,

    /// Detached memtables that may wait for the flush worker before
    /// writers block
    pub flush_queue_capacity: usize,
}

/// WAL sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalSyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N uncommitted entries (balanced durability/performance)
    EveryNEntries { count: usize },
}

/// Knobs shared by every segment a manager opens
#[derive(Debug, Clone, Copy)]
pub struct SegmentOptions {
    pub block_size: u64,
    pub chunk_size: usize,
}

impl Default for SegmentOptions {
    fn default() -> Self {
        Self {
            block_size: 4096,
            chunk_size: 512,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let segment = SegmentOptions::default();
        Self {
            data_dir: PathBuf::from("./sparsekv_data"),
            index_block_size: segment.block_size,
            scan_chunk_size: segment.chunk_size,
            wal_sync_strategy: WalSyncStrategy::EveryNEntries { count: 100 },
            memtable_threshold: 4096,
            flush_queue_capacity: 4,
        }
    }
}

impl Config {
    const SEGMENT_DIR: &'static str = "segments";
    const WAL_DIR: &'static str = "wal";

    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.memtable_threshold == 0 {
            return Err(KvError::Config("memtable_threshold must be at least 1".into()));
        }
        if self.index_block_size == 0 {
            return Err(KvError::Config("index_block_size must be at least 1".into()));
        }
        if self.scan_chunk_size == 0 {
            return Err(KvError::Config("scan_chunk_size must be at least 1".into()));
        }
        if self.flush_queue_capacity == 0 {
            return Err(KvError::Config("flush_queue_capacity must be at least 1".into()));
        }
        if let WalSyncStrategy::EveryNEntries { count: 0 } = self.wal_sync_strategy {
            return Err(KvError::Config("WAL sync interval must be at least 1".into()));
        }
        Ok(())
    }

    /// Directory owned by the segment manager
    pub fn segment_dir(&self) -> PathBuf {
        self.data_dir.join(Self::SEGMENT_DIR)
    }

    /// Directory holding the write-ahead logs
    pub fn wal_dir(&self) -> PathBuf {
        self.data_dir.join(Self::WAL_DIR)
    }

    pub fn segment_options(&self) -> SegmentOptions {
        SegmentOptions {
            block_size: self.index_block_size,
            chunk_size: self.scan_chunk_size,
        }
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the WAL sync strategy
    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.config.wal_sync_strategy = strategy;
        self
    }

    /// Set the number of distinct keys that triggers a flush
    pub fn memtable_threshold(mut self, keys: usize) -> Self {
        self.config.memtable_threshold = keys;
        self
    }

    /// Set the sparse index block size (in bytes)
    pub fn index_block_size(mut self, bytes: u64) -> Self {
        self.config.index_block_size = bytes;
        self
    }

    /// Set the scan chunk size (in bytes)
    pub fn scan_chunk_size(mut self, bytes: usize) -> Self {
        self.config.scan_chunk_size = bytes;
        self
    }

    /// Set how many detached memtables may queue for flushing
    pub fn flush_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.flush_queue_capacity = capacity;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
