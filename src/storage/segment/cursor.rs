//! Segment Cursor
//!
//! Sequential forward reads over a whole segment, one record at a time.

use bytes::BytesMut;

use crate::codec::{decode_record, Record, RECORD_DELIM};
use crate::error::Result;

use super::Segment;

/// Forward-only reader over a segment's records
///
/// Reads `chunk_size` bytes at a time through the segment's own handle,
/// never past the segment's recorded size.
pub struct SegmentCursor<'a> {
    segment: &'a Segment,
    chunk_size: u64,
    /// Bytes read from the file but not yet returned
    pending: BytesMut,
    /// Next file offset to read
    read_pos: u64,
    /// Bytes handed out as records so far
    consumed: u64,
}

impl<'a> SegmentCursor<'a> {
    pub(super) fn new(segment: &'a Segment, chunk_size: usize) -> Self {
        Self {
            segment,
            chunk_size: chunk_size.max(1) as u64,
            pending: BytesMut::new(),
            read_pos: 0,
            consumed: 0,
        }
    }

    /// Return the next record, or `None` once the cursor reaches EOF
    pub fn read_sequential(&mut self) -> Result<Option<Record>> {
        let size = self.segment.size();
        let mut scanned = 0;

        loop {
            if let Some(i) = self.pending[scanned..].iter().position(|&b| b == RECORD_DELIM) {
                let end = scanned + i;
                let mut raw = self.pending.split_to(end + 1);
                raw.truncate(end);
                self.consumed += end as u64 + 1;
                return decode_record(&raw.freeze()).map(Some);
            }
            scanned = self.pending.len();

            if self.read_pos >= size {
                if self.pending.is_empty() {
                    return Ok(None);
                }
                let raw = self.pending.split();
                self.consumed += raw.len() as u64;
                return decode_record(&raw.freeze()).map(Some);
            }

            let len = self.chunk_size.min(size - self.read_pos);
            let chunk = self.segment.read_at(self.read_pos, len as usize)?;
            self.pending.extend_from_slice(&chunk);
            self.read_pos += len;
        }
    }

    /// Bytes consumed so far
    pub fn offset(&self) -> u64 {
        self.consumed
    }
}

impl Iterator for SegmentCursor<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_sequential().transpose()
    }
}
