//! Segment Module
//!
//! One immutable, sorted, on-disk file of records.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ key ␟ value ␞ key ␟ value ␞ ... ␞ key ␟ value            │
//! └─────────────────────────────────────────────────────────┘
//! ```
//! Filename = decimal segment id. Records are strictly ascending by key
//! with no duplicates; the writer (flush or compaction) guarantees the
//! order, the segment does not check it.

mod cursor;
mod reader;

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::codec::encode_record;
use crate::error::{KvError, Result};

pub use cursor::SegmentCursor;
pub use reader::KeyHit;

/// A segment file and its open handle
///
/// Reads take `&self`: the handle sits behind a mutex and every read seeks
/// to its own offset, so lookups only need a shared borrow.
#[derive(Debug)]
pub struct Segment {
    id: u64,
    name: String,
    dir: PathBuf,
    size: u64,
    /// `None` once the segment has been deleted
    file: Mutex<Option<File>>,
}

impl Segment {
    /// Open an existing segment, creating an empty file if it is missing
    pub fn open(dir: &Path, name: &str) -> Result<Self> {
        Self::init(dir, name, false)
    }

    /// Create a fresh, empty segment, discarding any previous file content
    pub fn create(dir: &Path, name: &str) -> Result<Self> {
        Self::init(dir, name, true)
    }

    fn init(dir: &Path, name: &str, truncate: bool) -> Result<Self> {
        let id = parse_segment_id(name)?;
        let path = dir.join(name);
        let (file, size) = open_file(&path, truncate).map_err(|e| KvError::segment_io(name, e))?;

        Ok(Self {
            id,
            name: name.to_string(),
            dir: dir.to_path_buf(),
            size,
            file: Mutex::new(Some(file)),
        })
    }

    /// Append one record to the end of the file.
    ///
    /// Callers append in ascending key order.
    pub fn append(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut buf = Vec::new();
        encode_record(&mut buf, key, value, self.size > 0);

        self.with_file(|file| {
            file.seek(SeekFrom::End(0))?;
            file.write_all(&buf)
        })?;
        self.size += buf.len() as u64;

        Ok(())
    }

    /// fsync the file contents
    pub fn sync(&self) -> Result<()> {
        self.with_file(|file| file.sync_all())
    }

    /// Remove the file and close the handle
    ///
    /// The handle stays open when the removal fails.
    pub fn delete(&self) -> Result<()> {
        let mut file = self.file.lock();
        if file.is_none() {
            return Err(self.not_initialized());
        }

        fs::remove_file(self.path()).map_err(|e| KvError::segment_io(&self.name, e))?;
        file.take();
        tracing::debug!(segment = %self.name, "Deleted segment file");
        Ok(())
    }

    /// Move the file to `dir/new_name` and take over that name's id.
    ///
    /// An existing file at the destination is replaced.
    pub fn rename(&mut self, dir: &Path, new_name: &str) -> Result<()> {
        let id = parse_segment_id(new_name)?;
        if self.file.lock().take().is_none() {
            return Err(self.not_initialized());
        }

        let target = dir.join(new_name);
        fs::rename(self.path(), &target).map_err(|e| KvError::segment_io(&self.name, e))?;

        let (file, size) = open_file(&target, false).map_err(|e| KvError::segment_io(new_name, e))?;
        tracing::debug!(from = %self.name, to = new_name, "Renamed segment");

        self.id = id;
        self.name = new_name.to_string();
        self.dir = dir.to_path_buf();
        self.size = size;
        *self.file.lock() = Some(file);
        Ok(())
    }

    /// Start a sequential cursor at the first record
    pub fn cursor(&self, chunk_size: usize) -> Result<SegmentCursor<'_>> {
        if self.file.lock().is_none() {
            return Err(self.not_initialized());
        }
        Ok(SegmentCursor::new(self, chunk_size))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.name)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Read exactly `len` bytes at `offset`
    pub(crate) fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        self.with_file(|file| {
            file.seek(SeekFrom::Start(offset))?;
            let mut buf = vec![0u8; len];
            file.read_exact(&mut buf)?;
            Ok(buf)
        })
    }

    fn with_file<T>(&self, op: impl FnOnce(&mut File) -> io::Result<T>) -> Result<T> {
        let mut guard = self.file.lock();
        let file = guard.as_mut().ok_or_else(|| self.not_initialized())?;
        op(file).map_err(|e| KvError::segment_io(&self.name, e))
    }

    fn not_initialized(&self) -> KvError {
        KvError::NotInitialized {
            segment: self.name.clone(),
        }
    }
}

/// Parse a segment id from its filename.
///
/// Only the canonical decimal form is accepted: "+1", "-0" and "007" are
/// rejected, so every id has exactly one filename.
pub fn parse_segment_id(name: &str) -> Result<u64> {
    let invalid = || KvError::InvalidSegmentName(name.to_string());
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let id: u64 = name.parse().map_err(|_| invalid())?;
    if id.to_string() != name {
        return Err(invalid());
    }
    Ok(id)
}

fn open_file(path: &Path, truncate: bool) -> io::Result<(File, u64)> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(truncate)
        .open(path)?;
    let size = file.metadata()?.len();
    Ok((file, size))
}
