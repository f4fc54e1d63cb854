//! Record Codec
//!
//! The single record format shared by segments and the write-ahead log.
//!
//! ## Layout
//! ```text
//! key ␟ value ␞ key ␟ value ␞ ... key ␟ value
//!
//! ␟ = FIELD_DELIM  (0x1F)
//! ␞ = RECORD_DELIM (0x1E)
//! ```
//!
//! No header, no length prefixes, no checksum, and no delimiter before the
//! first record or after the last one. Delimiter bytes are never escaped:
//! keys and values must not contain them.

use bytes::Bytes;

use crate::error::{KvError, Result};

/// Separates a key from its value
pub const FIELD_DELIM: u8 = 0x1F;

/// Separates consecutive records
pub const RECORD_DELIM: u8 = 0x1E;

/// A decoded key/value pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: Bytes,
    pub value: Bytes,
}

impl Record {
    pub fn new(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Append the encoding of one record to `buf`.
///
/// `leading_delim` must be true for every record except the first one in a
/// file.
pub fn encode_record(buf: &mut Vec<u8>, key: &[u8], value: &[u8], leading_delim: bool) {
    debug_assert!(!contains_delimiter(key), "key contains a reserved delimiter");
    debug_assert!(!contains_delimiter(value), "value contains a reserved delimiter");

    buf.reserve(key.len() + value.len() + 2);
    if leading_delim {
        buf.push(RECORD_DELIM);
    }
    buf.extend_from_slice(key);
    buf.push(FIELD_DELIM);
    buf.extend_from_slice(value);
}

/// Decode exactly one record (no record delimiters included).
///
/// Splits on `FIELD_DELIM`; anything other than two fields is corrupt.
pub fn decode_record(raw: &Bytes) -> Result<Record> {
    let fields = raw.iter().filter(|&&b| b == FIELD_DELIM).count() + 1;
    if fields != 2 {
        return Err(KvError::CorruptRecord { fields });
    }

    // Exactly one delimiter exists, checked above
    let split = raw.iter().position(|&b| b == FIELD_DELIM).unwrap_or(raw.len());
    Ok(Record {
        key: raw.slice(..split),
        value: raw.slice(split + 1..),
    })
}

/// Split a window of encoded records into one slice per record.
///
/// Zero-copy: every candidate shares the window's buffer.
pub fn split_records(window: &Bytes) -> Vec<Bytes> {
    let mut records = Vec::new();
    let mut start = 0;
    for (i, &b) in window.iter().enumerate() {
        if b == RECORD_DELIM {
            records.push(window.slice(start..i));
            start = i + 1;
        }
    }
    records.push(window.slice(start..));
    records
}

/// Check whether bytes would break the framing
pub fn contains_delimiter(bytes: &[u8]) -> bool {
    bytes.iter().any(|&b| b == FIELD_DELIM || b == RECORD_DELIM)
}
