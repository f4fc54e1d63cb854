//! WAL Reader
//!
//! Handles reading raw records from the WAL file in write order.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use bytes::Bytes;

use crate::codec::RECORD_DELIM;
use crate::error::Result;

/// One undecoded record as it sits in the file
#[derive(Debug, Clone)]
pub struct WalFrame {
    /// Record bytes without the trailing delimiter
    pub raw: Bytes,
    /// Offset of the first byte of `raw`
    pub start: u64,
    /// Whether a record delimiter followed the record
    pub terminated: bool,
}

/// Reads records from the WAL file
pub struct WalReader {
    reader: BufReader<File>,
    /// Bytes consumed so far
    offset: u64,
}

impl WalReader {
    /// Open a WAL file for reading, buffering `chunk_size` bytes at a time
    pub fn open(path: &Path, chunk_size: usize) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            reader: BufReader::with_capacity(chunk_size.max(1), file),
            offset: 0,
        })
    }

    /// Read the next frame, or `None` at EOF
    pub fn next_frame(&mut self) -> Result<Option<WalFrame>> {
        let mut raw = Vec::new();
        let read = self.reader.read_until(RECORD_DELIM, &mut raw)?;
        if read == 0 {
            return Ok(None);
        }

        let start = self.offset;
        self.offset += read as u64;

        let terminated = raw.last() == Some(&RECORD_DELIM);
        if terminated {
            raw.pop();
        }

        Ok(Some(WalFrame {
            raw: Bytes::from(raw),
            start,
            terminated,
        }))
    }

    /// Bytes consumed so far
    pub fn offset(&self) -> u64 {
        self.offset
    }
}
