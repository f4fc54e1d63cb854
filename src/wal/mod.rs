//! Write-Ahead Log (WAL) Module
//!
//! Provides durability for writes that have not reached a segment yet.
//!
//! ## Responsibilities
//! - Append every record before it enters the memtable
//! - Replay records in write order after a restart
//! - Truncate and retire a log once its memtable is flushed
//!
//! ## File Format
//! Same record encoding as segments (see [`crate::codec`]), in write order
//! rather than key order:
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ x ␟ 1 ␞ y ␟ 2 ␞ x ␟ 3                        │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Generations
//! Each memtable owns one log, `wal/<generation>.log`. When a memtable is
//! detached for flushing its log is sealed with it and a log with the next
//! generation number takes over.

mod reader;
mod recovery;
mod writer;

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

pub use reader::{WalFrame, WalReader};
pub use recovery::{ReplayStats, WalRecovery};
pub use writer::WalWriter;

const WAL_EXTENSION: &str = "log";

/// Path of the log for `generation` inside `dir`
pub fn wal_path(dir: &Path, generation: u64) -> PathBuf {
    dir.join(format!("{}.{}", generation, WAL_EXTENSION))
}

/// Generations of the logs present in `dir`, ascending
///
/// Files that are not `<decimal>.log` (no leading zeros) are ignored.
pub fn list_generations(dir: &Path) -> Result<Vec<u64>> {
    let mut generations = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(generation) = parse_generation(&entry.path()) {
            generations.push(generation);
        }
    }

    generations.sort_unstable();
    Ok(generations)
}

/// "42.log" → Some(42)
fn parse_generation(path: &Path) -> Option<u64> {
    if path.extension()? != WAL_EXTENSION {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let generation: u64 = stem.parse().ok()?;
    (generation.to_string() == stem).then_some(generation)
}
