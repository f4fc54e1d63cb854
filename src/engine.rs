//! Engine Module
//!
//! The write path and read path over WAL, memtable and segments.
//!
//! ## Responsibilities
//! - Log every write before it becomes visible
//! - Detach a full memtable and hand it to the flush worker
//! - Serve reads from memtables first, then segments newest → oldest
//! - Recover unflushed writes on startup

use std::fs;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::Config;
use crate::error::{KvError, Result};
use crate::flush::{FlushJob, FlushWorker};
use crate::memtable::MemTable;
use crate::storage::SegmentManager;
use crate::wal::{self, WalRecovery, WalWriter};

/// State guarded by the engine's single reader/writer lock
struct WriteState {
    /// Memtable receiving writes
    active: MemTable,

    /// Log of the active memtable
    wal: WalWriter,

    /// Generation number of `wal`
    generation: u64,
}

/// The main storage engine
///
/// ## Concurrency Model
///
/// - **Writes** (`set`): exclusive `state` lock for WAL append + memtable
///   insert + (at the threshold) detach and hand-off. Segment I/O never
///   happens under this lock; it runs on the flush worker.
///
/// - **Reads** (`get`): shared `state` lock for the memtables, released
///   before the segment manager is queried.
///
/// - **Sealed memtables**: detached tables stay readable in `sealed` until
///   their segment is registered, so a key is always visible somewhere
///   while it moves to disk. Lock order is `state` → `sealed`; the flush
///   worker only takes `sealed`.
pub struct Engine {
    /// Engine configuration
    config: Config,

    state: RwLock<WriteState>,

    /// Detached memtables waiting for their segment, oldest first
    sealed: Arc<RwLock<Vec<Arc<MemTable>>>>,

    /// Persistent segment layer, shared with the flush worker
    segments: Arc<SegmentManager>,

    worker: FlushWorker,
}

impl Engine {
    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Create the data, segment and WAL directories
    /// 2. Open the segment manager (indexes existing segments)
    /// 3. Flush every sealed WAL left behind by an unfinished flush
    /// 4. Replay the newest WAL into the active memtable
    /// 5. Start the flush worker
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        fs::create_dir_all(&config.data_dir)?;
        let wal_dir = config.wal_dir();
        fs::create_dir_all(&wal_dir)?;

        let segments = Arc::new(SegmentManager::open(
            &config.segment_dir(),
            config.segment_options(),
        )?);

        let mut generations = wal::list_generations(&wal_dir)?;
        let generation = generations.pop().unwrap_or(0);

        for sealed in generations {
            Self::recover_sealed(&config, &segments, sealed)?;
        }

        let active_path = wal::wal_path(&wal_dir, generation);
        let mut active = MemTable::new();
        if active_path.exists() {
            let stats = WalRecovery::replay(&active_path, config.scan_chunk_size, |record| {
                active.insert(record.key.to_vec(), record.value.to_vec());
            })?;
            tracing::info!(
                generation,
                records = stats.records,
                keys = active.len(),
                truncated_tail = stats.truncated_tail,
                "Replayed WAL"
            );
        }
        let wal = WalWriter::open(&active_path, config.wal_sync_strategy)?;

        let sealed: Arc<RwLock<Vec<Arc<MemTable>>>> = Arc::default();
        let retire = Arc::clone(&sealed);
        let worker = FlushWorker::spawn(
            Arc::clone(&segments),
            config.flush_queue_capacity,
            move |flushed| {
                retire.write().retain(|m| !Arc::ptr_eq(m, flushed));
            },
        )?;

        tracing::info!(
            data_dir = %config.data_dir.display(),
            segments = segments.segment_count(),
            generation,
            "Engine opened"
        );

        Ok(Self {
            config,
            state: RwLock::new(WriteState {
                active,
                wal,
                generation,
            }),
            sealed,
            segments,
            worker,
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    /// Get a value by key
    ///
    /// Search order:
    /// 1. Active memtable (most recent writes)
    /// 2. Sealed memtables awaiting flush (newest first)
    /// 3. Segments (newest to oldest)
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        {
            let state = self.state.read();
            if let Some(value) = state.active.get(key) {
                return Ok(Some(value.to_vec()));
            }

            let sealed = self.sealed.read();
            for memtable in sealed.iter().rev() {
                if let Some(value) = memtable.get(key) {
                    return Ok(Some(value.to_vec()));
                }
            }
        }

        Ok(self.segments.get(key)?.map(|value| value.to_vec()))
    }

    /// Set a key-value pair
    ///
    /// Steps:
    /// 1. Acquire the write lock
    /// 2. Write to WAL (durability)
    /// 3. Write to the memtable
    /// 4. At the threshold, detach the memtable and queue it for flushing
    ///
    /// Once a flush has failed, writes are refused with `FlushPipeline`
    /// until the engine is reopened and recovers the held-back memtables.
    pub fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut state = self.state.write();
        self.ensure_pipeline_healthy()?;

        state.wal.append(key, value)?;
        let keys = state.active.insert(key.to_vec(), value.to_vec());

        if keys >= self.config.memtable_threshold {
            self.rotate(&mut state)?;
        }

        Ok(())
    }

    /// Flush the active memtable (if any) and wait for the flush worker
    ///
    /// Reports the first flush failure since the last call.
    pub fn flush(&self) -> Result<()> {
        if !self.worker.is_poisoned() {
            let mut state = self.state.write();
            if !state.active.is_empty() {
                self.rotate(&mut state)?;
            }
        }

        self.wait_for_flushes()?;

        if let Some(e) = self.worker.take_errors().into_iter().next() {
            return Err(e);
        }
        self.ensure_pipeline_healthy()
    }

    /// Block until every memtable queued so far has been processed
    pub fn wait_for_flushes(&self) -> Result<()> {
        self.worker.wait_idle()
    }

    /// Errors reported by the flush worker since the last call
    pub fn take_flush_errors(&self) -> Vec<KvError> {
        self.worker.take_errors()
    }

    /// Merge the two oldest segments (see [`SegmentManager::compact`])
    pub fn compact(&self) -> Result<bool> {
        self.segments.compact()
    }

    /// Merge segments until at most one remains
    pub fn compact_all(&self) -> Result<usize> {
        self.segments.compact_all()
    }

    /// Close the engine gracefully
    ///
    /// Stops accepting flushes, lets queued flushes finish and syncs the
    /// active WAL. Unflushed writes stay in the WAL for the next open.
    pub fn close(mut self) -> Result<()> {
        self.worker.shutdown()?;
        self.state.write().wal.sync()?;
        tracing::info!(data_dir = %self.config.data_dir.display(), "Engine closed");
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Get the segment directory path
    pub fn segment_dir(&self) -> PathBuf {
        self.config.segment_dir()
    }

    /// Distinct keys in the active memtable
    pub fn memtable_len(&self) -> usize {
        self.state.read().active.len()
    }

    /// Detached memtables not yet in a segment
    pub fn sealed_count(&self) -> usize {
        self.sealed.read().len()
    }

    /// Generation of the active WAL
    pub fn wal_generation(&self) -> u64 {
        self.state.read().generation
    }

    /// Get the number of segments
    pub fn segment_count(&self) -> usize {
        self.segments.segment_count()
    }

    /// The segment layer
    pub fn segments(&self) -> &SegmentManager {
        &self.segments
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Swap in an empty memtable and a fresh WAL, queue the old pair
    ///
    /// Called with the write lock held. Nothing changes if the new WAL
    /// cannot be opened.
    fn rotate(&self, state: &mut WriteState) -> Result<()> {
        self.ensure_pipeline_healthy()?;

        let next = state.generation + 1;
        let next_wal = WalWriter::open(
            &wal::wal_path(&self.config.wal_dir(), next),
            self.config.wal_sync_strategy,
        )?;

        let sealed_wal = mem::replace(&mut state.wal, next_wal);
        let generation = mem::replace(&mut state.generation, next);
        let memtable = Arc::new(state.active.detach());

        self.sealed.write().push(Arc::clone(&memtable));
        tracing::debug!(generation, keys = memtable.len(), "Detached memtable for flush");

        self.worker.submit(FlushJob {
            generation,
            memtable,
            wal: sealed_wal,
        })
    }

    fn ensure_pipeline_healthy(&self) -> Result<()> {
        if self.worker.is_poisoned() {
            return Err(KvError::FlushPipeline(
                "flushes are held back after an earlier failure; reopen to recover".to_string(),
            ));
        }
        Ok(())
    }

    /// Flush a WAL whose memtable never reached a segment, then retire it
    fn recover_sealed(config: &Config, segments: &SegmentManager, generation: u64) -> Result<()> {
        let path = wal::wal_path(&config.wal_dir(), generation);

        let mut memtable = MemTable::new();
        let stats = WalRecovery::replay(&path, config.scan_chunk_size, |record| {
            memtable.insert(record.key.to_vec(), record.value.to_vec());
        })?;

        if !memtable.is_empty() {
            let segment = segments.flush(memtable.iter())?;
            tracing::info!(
                generation,
                segment,
                records = stats.records,
                "Recovered sealed WAL into segment"
            );
        }

        WalWriter::open(&path, config.wal_sync_strategy)?.discard()
    }
}
