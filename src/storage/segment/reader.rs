//! Segment Reader
//!
//! Ranged exact-match lookups and the key scan used to build sparse indexes.

use bytes::Bytes;

use crate::codec::{decode_record, split_records, FIELD_DELIM, RECORD_DELIM};
use crate::error::{KvError, Result};

use super::Segment;

/// First key found by [`Segment::scan_first_key_from`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyHit {
    pub key: Bytes,
    /// Offset of the record's first byte
    pub record_start: u64,
    /// Offset of the delimiter ending the record's value, or EOF
    pub record_end: u64,
}

impl Segment {
    /// Look up `key` in the byte range `[offset, offset + limit)`.
    ///
    /// A `limit` of zero, or one reaching past EOF, means "to end of file".
    /// The range must start on a record boundary.
    ///
    /// Returns:
    /// - `Ok(Some(value))`: key found
    /// - `Ok(None)`: key not in the range (including an empty range)
    /// - `Err(OffsetOutOfRange)`: `offset` is past EOF
    pub fn get(&self, key: &[u8], offset: u64, limit: u64) -> Result<Option<Bytes>> {
        if offset > self.size {
            return Err(KvError::OffsetOutOfRange {
                segment: self.name.clone(),
                offset,
                size: self.size,
            });
        }

        let remaining = self.size - offset;
        let limit = if limit == 0 || limit > remaining {
            remaining
        } else {
            limit
        };
        if limit == 0 {
            return Ok(None);
        }

        let mut window = Bytes::from(self.read_at(offset, limit as usize)?);
        // A range that stops at the next breakpoint ends with that record's
        // leading delimiter
        if window.last() == Some(&RECORD_DELIM) {
            window.truncate(window.len() - 1);
        }

        let candidates = split_records(&window);

        // Lower bound: first candidate whose key is >= the search key
        let mut lo = 0;
        let mut hi = candidates.len();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let record = decode_record(&candidates[mid])?;
            if record.key.as_ref() < key {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }

        if lo < candidates.len() {
            let record = decode_record(&candidates[lo])?;
            if record.key.as_ref() == key {
                return Ok(Some(record.value));
            }
        }
        Ok(None)
    }

    /// Find the first complete key whose record begins at or after `offset`.
    ///
    /// Offset 0 is always a record boundary; any other offset is one only if
    /// the byte before it is `RECORD_DELIM`, so a scan may also start in the
    /// middle of a record. Reads `chunk_size` bytes at a time.
    ///
    /// Returns `Ok(None)` when no record starts between `offset` and EOF.
    pub fn scan_first_key_from(&self, offset: u64, chunk_size: usize) -> Result<Option<KeyHit>> {
        if offset > self.size {
            return Err(KvError::OffsetOutOfRange {
                segment: self.name.clone(),
                offset,
                size: self.size,
            });
        }

        let chunk_size = chunk_size.max(1) as u64;
        let mut in_key = offset == 0;
        let mut key_done = false;
        let mut key = Vec::new();
        let mut record_start = offset;

        let mut pos = offset.saturating_sub(1);
        while pos < self.size {
            let len = chunk_size.min(self.size - pos);
            let chunk = self.read_at(pos, len as usize)?;

            for (i, &b) in chunk.iter().enumerate() {
                let at = pos + i as u64;
                if b == RECORD_DELIM {
                    if key_done {
                        return Ok(Some(KeyHit {
                            key: Bytes::from(key),
                            record_start,
                            record_end: at,
                        }));
                    }
                    if in_key {
                        // A whole record went by without a field delimiter
                        return Err(KvError::CorruptRecord { fields: 1 });
                    }
                    in_key = true;
                    key.clear();
                    record_start = at + 1;
                } else if in_key && !key_done {
                    if b == FIELD_DELIM {
                        key_done = true;
                    } else {
                        key.push(b);
                    }
                }
            }
            pos += len;
        }

        if key_done {
            return Ok(Some(KeyHit {
                key: Bytes::from(key),
                record_start,
                record_end: self.size,
            }));
        }
        if in_key && record_start < self.size {
            return Err(KvError::TruncatedSegment {
                segment: self.name.clone(),
                offset: record_start,
            });
        }
        Ok(None)
    }
}
