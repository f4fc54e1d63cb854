//! WAL Recovery
//!
//! Replays a WAL into a memtable after a restart.

use std::fs::OpenOptions;
use std::path::Path;

use crate::codec::{decode_record, Record};
use crate::error::{KvError, Result};

use super::WalReader;

/// Result of a replay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Number of records handed to the caller
    pub records: u64,

    /// Whether a torn tail (partial write) was cut off the file
    pub truncated_tail: bool,
}

/// Handles WAL recovery after crash
pub struct WalRecovery;

impl WalRecovery {
    /// Replay every record of the WAL at `path`, in file order.
    ///
    /// This will:
    /// 1. Read records sequentially, `chunk_size` bytes at a time
    /// 2. Hand each one to `apply`
    /// 3. Cut off a torn final record (no field delimiter) or a dangling
    ///    record delimiter left by an interrupted append
    ///
    /// Malformed records before the tail are reported as `CorruptRecord`.
    /// Replay never writes records back to the log.
    pub fn replay<F>(path: &Path, chunk_size: usize, mut apply: F) -> Result<ReplayStats>
    where
        F: FnMut(Record),
    {
        let mut reader = WalReader::open(path, chunk_size)?;
        let mut stats = ReplayStats::default();
        // End of the last complete record
        let mut valid_len = 0u64;

        while let Some(frame) = reader.next_frame()? {
            match decode_record(&frame.raw) {
                Ok(record) => {
                    apply(record);
                    stats.records += 1;
                    valid_len = frame.start + frame.raw.len() as u64;
                }
                Err(KvError::CorruptRecord { fields: 1 }) if !frame.terminated => break,
                Err(e) => return Err(e),
            }
        }

        let file_len = reader.offset();
        if valid_len < file_len {
            tracing::warn!(
                wal = %path.display(),
                valid_len,
                file_len,
                "Truncating torn WAL tail"
            );
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(valid_len)?;
            file.sync_all()?;
            stats.truncated_tail = true;
        }

        Ok(stats)
    }
}
