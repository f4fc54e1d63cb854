//! Segment Manager
//!
//! Manages the ordered set of segments and coordinates reads, flushes and
//! compaction.
//!
//! ## Responsibilities
//! - Discover existing segments on startup and index each one
//! - Search segments newest → oldest for reads
//! - Create new segments from memtable snapshots
//! - Merge the two oldest segments, newer value wins

use std::cmp::Ordering as KeyOrdering;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};

use crate::config::SegmentOptions;
use crate::error::{KvError, Result};

use super::index::SparseIndex;
use super::segment::Segment;

/// Compaction output is staged here so a half-written merge is never
/// mistaken for a segment
const COMPACTION_DIR: &str = "compaction";

/// A segment paired with the index built for it
#[derive(Debug, Clone)]
pub struct IndexedSegment {
    segment: Arc<Segment>,
    index: Arc<SparseIndex>,
}

impl IndexedSegment {
    fn new(segment: Segment, index: SparseIndex) -> Self {
        Self {
            segment: Arc::new(segment),
            index: Arc::new(index),
        }
    }

    pub fn id(&self) -> u64 {
        self.segment.id()
    }

    pub fn segment(&self) -> &Segment {
        &self.segment
    }

    pub fn index(&self) -> &SparseIndex {
        &self.index
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        self.index.lookup(&self.segment, key)
    }
}

/// Outcome of one pairwise compaction step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Records written to the merged segment
    pub written: u64,
    /// Older records dropped because the newer segment overwrote them
    pub shadowed: u64,
}

/// Manages the segment layer
///
/// ## Concurrency:
/// - `segments`: Protected by RwLock (lookups share it, flush/compaction
///   swap entries under the write lock, so readers see either the old or the
///   new registry)
/// - `next_segment_id`: Atomic counter (lock-free)
/// - `compaction_lock`: at most one compaction at a time
pub struct SegmentManager {
    /// Directory where segments are stored
    dir: PathBuf,

    options: SegmentOptions,

    /// Registry, ordered oldest → newest (ascending id)
    segments: RwLock<Vec<IndexedSegment>>,

    /// Next ID for creating new segments
    next_segment_id: AtomicU64,

    compaction_lock: Mutex<()>,
}

impl SegmentManager {
    /// Open or create the segment directory
    ///
    /// On startup:
    /// 1. Create directory if it doesn't exist
    /// 2. Open every regular file as a segment (name must be a decimal id)
    /// 3. Build a sparse index for each
    /// 4. Order by ID ascending
    pub fn open(dir: &Path, options: SegmentOptions) -> Result<Self> {
        fs::create_dir_all(dir)?;

        let mut segments = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }

            let file_name = entry.file_name();
            let name = file_name
                .to_str()
                .ok_or_else(|| KvError::InvalidSegmentName(file_name.to_string_lossy().into_owned()))?;

            let segment = Segment::open(dir, name)?;
            let index = SparseIndex::build(&segment, options.block_size, options.chunk_size)?;
            segments.push(IndexedSegment::new(segment, index));
        }

        segments.sort_by_key(IndexedSegment::id);

        // Next ID = max + 1, or 0 if no segments exist
        let next_id = segments.last().map(|s| s.id() + 1).unwrap_or(0);

        tracing::info!(
            dir = %dir.display(),
            segments = segments.len(),
            next_id,
            "Opened segment manager"
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            options,
            segments: RwLock::new(segments),
            next_segment_id: AtomicU64::new(next_id),
            compaction_lock: Mutex::new(()),
        })
    }

    /// Get a value by key (searches all segments newest → oldest)
    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        let segments = self.segments.read();

        for entry in segments.iter().rev() {
            if let Some(value) = entry.get(key)? {
                return Ok(Some(value));
            }
        }

        Ok(None)
    }

    /// Write ascending records into a new segment and register it
    ///
    /// The registry only changes once the file is written, synced and
    /// indexed; an empty iterator produces an empty segment.
    pub fn flush<'a, I>(&self, records: I) -> Result<u64>
    where
        I: IntoIterator<Item = (&'a [u8], &'a [u8])>,
    {
        let id = self.next_segment_id.fetch_add(1, Ordering::SeqCst);
        let mut segment = Segment::create(&self.dir, &id.to_string())?;

        let mut count = 0u64;
        for (key, value) in records {
            segment.append(key, value)?;
            count += 1;
        }
        segment.sync()?;

        let index = SparseIndex::build(&segment, self.options.block_size, self.options.chunk_size)?;
        let size = segment.size();
        let entry = IndexedSegment::new(segment, index);

        {
            let mut segments = self.segments.write();
            let pos = segments.partition_point(|s| s.id() < id);
            segments.insert(pos, entry);
        }

        tracing::info!(segment = id, records = count, bytes = size, "Flushed segment");
        Ok(id)
    }

    /// Merge the two oldest segments into one
    ///
    /// The merged segment takes the older segment's name and id, so it keeps
    /// its place relative to every untouched segment. Returns `false` when
    /// there is nothing to merge.
    pub fn compact(&self) -> Result<bool> {
        let _guard = self.compaction_lock.lock();

        let (older, newer) = {
            let segments = self.segments.read();
            match segments.as_slice() {
                [older, newer, ..] => (older.clone(), newer.clone()),
                _ => return Ok(false),
            }
        };

        let staging = self.dir.join(COMPACTION_DIR);
        fs::create_dir_all(&staging)?;

        let mut output = Segment::create(&staging, older.segment.name())?;
        let stats = self.merge(&older.segment, &newer.segment, &mut output)?;
        output.sync()?;
        let index = SparseIndex::build(&output, self.options.block_size, self.options.chunk_size)?;

        {
            let mut segments = self.segments.write();

            // Replaces the older file in one step; the registry follows at
            // once so it never describes a file that is gone
            output.rename(&self.dir, older.segment.name())?;
            let merged = IndexedSegment::new(output, index);
            let merged_id = merged.id();
            if let Some(slot) = segments.iter_mut().find(|s| s.id() == merged_id) {
                *slot = merged;
            }

            // The merged segment already holds every winning value, so a
            // failed delete leaves a redundant but consistent newer entry
            newer.segment.delete()?;
            segments.retain(|s| s.id() != newer.id());
        }

        tracing::info!(
            older = older.id(),
            newer = newer.id(),
            written = stats.written,
            shadowed = stats.shadowed,
            "Compacted segments"
        );
        Ok(true)
    }

    /// Repeat pairwise compaction until at most one segment is left
    ///
    /// Returns the number of merges performed.
    pub fn compact_all(&self) -> Result<usize> {
        let mut merges = 0;
        while self.compact()? {
            merges += 1;
        }
        Ok(merges)
    }

    /// Get the number of segments
    pub fn segment_count(&self) -> usize {
        self.segments.read().len()
    }

    /// Segment ids, oldest first
    pub fn segment_ids(&self) -> Vec<u64> {
        self.segments.read().iter().map(IndexedSegment::id).collect()
    }

    /// Snapshot of the registry, oldest first
    pub fn segments(&self) -> Vec<IndexedSegment> {
        self.segments.read().clone()
    }

    /// Get the segment directory path
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn options(&self) -> SegmentOptions {
        self.options
    }

    /// Get the next segment ID (for testing/debugging)
    pub fn next_segment_id(&self) -> u64 {
        self.next_segment_id.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Interleave two ascending segments into `output`.
    ///
    /// On equal keys the newer record is written and the older one skipped.
    fn merge(&self, older: &Segment, newer: &Segment, output: &mut Segment) -> Result<MergeStats> {
        let chunk = self.options.chunk_size;
        let mut left = older.cursor(chunk)?;
        let mut right = newer.cursor(chunk)?;
        let mut stats = MergeStats::default();

        let mut a = left.read_sequential()?;
        let mut b = right.read_sequential()?;

        while let (Some(x), Some(y)) = (&a, &b) {
            match x.key.cmp(&y.key) {
                KeyOrdering::Less => {
                    output.append(&x.key, &x.value)?;
                    a = left.read_sequential()?;
                }
                KeyOrdering::Equal => {
                    output.append(&y.key, &y.value)?;
                    stats.shadowed += 1;
                    a = left.read_sequential()?;
                    b = right.read_sequential()?;
                }
                KeyOrdering::Greater => {
                    output.append(&y.key, &y.value)?;
                    b = right.read_sequential()?;
                }
            }
            stats.written += 1;
        }

        // At most one side still has records
        for (head, rest) in [(a, left), (b, right)] {
            if let Some(record) = head {
                output.append(&record.key, &record.value)?;
                stats.written += 1;
            }
            for record in rest {
                let record = record?;
                output.append(&record.key, &record.value)?;
                stats.written += 1;
            }
        }

        Ok(stats)
    }
}
