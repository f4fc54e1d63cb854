//! WAL Writer
//!
//! Handles appending records to a WAL file.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::codec::encode_record;
use crate::config::WalSyncStrategy;
use crate::error::Result;

/// Appends records to one WAL file
#[derive(Debug)]
pub struct WalWriter {
    path: PathBuf,
    file: File,
    /// Current file length in bytes
    len: u64,
    sync_strategy: WalSyncStrategy,
    /// Records appended since the last fsync
    unsynced: usize,
}

impl WalWriter {
    /// Open or create a WAL file; new records go after existing ones
    pub fn open(path: &Path, sync_strategy: WalSyncStrategy) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?;
        let len = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            file,
            len,
            sync_strategy,
            unsynced: 0,
        })
    }

    /// Append one record, fsyncing according to the sync strategy
    pub fn append(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut buf = Vec::new();
        encode_record(&mut buf, key, value, self.len > 0);

        // Single write per record, so a crash tears at most the tail
        self.file.write_all(&buf)?;
        self.len += buf.len() as u64;
        self.unsynced += 1;

        match self.sync_strategy {
            WalSyncStrategy::EveryWrite => self.sync()?,
            WalSyncStrategy::EveryNEntries { count } if self.unsynced >= count => self.sync()?,
            WalSyncStrategy::EveryNEntries { .. } => {}
        }

        Ok(())
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_data()?;
        self.unsynced = 0;
        Ok(())
    }

    /// Reset the log to zero length
    pub fn truncate(&mut self) -> Result<()> {
        self.file.set_len(0)?;
        self.file.sync_all()?;
        self.len = 0;
        self.unsynced = 0;
        Ok(())
    }

    /// Retire a sealed log once its memtable is safely in a segment.
    ///
    /// The file is emptied before it is unlinked: an empty log that
    /// survives a failed unlink replays as nothing.
    pub fn discard(mut self) -> Result<()> {
        self.truncate()?;
        let path = self.path.clone();
        drop(self);
        fs::remove_file(&path)?;
        tracing::debug!(wal = %path.display(), "Discarded WAL");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current length in bytes
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
