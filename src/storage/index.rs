//! Sparse Index
//!
//! Per-segment breakpoints that bound how many bytes a lookup reads.
//!
//! ```text
//!   breakpoints:  (k0, 0)        (k1, 4107)        (k2, 8230)
//!   segment:      [ 0 ........ 4107 ........... 8230 ....... EOF ]
//!                   └─ block 0 ─┘└──── block 1 ───┘└─ block 2 ─┘
//! ```
//!
//! The index only narrows the search window: it picks the block that would
//! hold the key and leaves the exact match to [`Segment::get`].

use bytes::Bytes;

use crate::error::Result;

use super::segment::Segment;

/// A key and the offset of the record that starts with it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    pub key: Bytes,
    pub offset: u64,
}

/// Breakpoints for one segment, strictly increasing in key and offset
#[derive(Debug, Clone, Default)]
pub struct SparseIndex {
    breakpoints: Vec<Breakpoint>,
}

impl SparseIndex {
    /// Scan `segment` and record a breakpoint roughly every `block_size`
    /// bytes.
    ///
    /// An empty segment yields an empty index without touching the file.
    pub fn build(segment: &Segment, block_size: u64, chunk_size: usize) -> Result<Self> {
        let size = segment.size();
        let mut breakpoints = Vec::new();
        let mut offset = 0;

        while offset < size {
            let Some(hit) = segment.scan_first_key_from(offset, chunk_size)? else {
                break;
            };
            // A record longer than a block would otherwise be rescanned
            offset = (hit.record_start + block_size).max(hit.record_end);
            breakpoints.push(Breakpoint {
                key: hit.key,
                offset: hit.record_start,
            });
        }

        tracing::debug!(
            segment = segment.name(),
            size,
            breakpoints = breakpoints.len(),
            "Built sparse index"
        );
        Ok(Self { breakpoints })
    }

    /// Byte range that would hold `key`, as `(offset, limit)`.
    ///
    /// `limit` is zero for the last block (read to EOF). Returns `None` when
    /// `key` sorts before every breakpoint, i.e. the segment cannot hold it.
    pub fn locate(&self, key: &[u8]) -> Option<(u64, u64)> {
        let lo = self.breakpoints.partition_point(|bp| bp.key.as_ref() < key);

        let block = match self.breakpoints.get(lo) {
            Some(bp) if bp.key.as_ref() == key => lo,
            _ if lo == 0 => return None,
            _ => lo - 1,
        };

        let start = self.breakpoints[block].offset;
        let limit = self
            .breakpoints
            .get(block + 1)
            .map(|next| next.offset - start)
            .unwrap_or(0);
        Some((start, limit))
    }

    /// Look up `key` in `segment` through this index
    pub fn lookup(&self, segment: &Segment, key: &[u8]) -> Result<Option<Bytes>> {
        match self.locate(key) {
            Some((offset, limit)) => segment.get(key, offset, limit),
            None => Ok(None),
        }
    }

    pub fn breakpoints(&self) -> &[Breakpoint] {
        &self.breakpoints
    }

    pub fn len(&self) -> usize {
        self.breakpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakpoints.is_empty()
    }
}
