//! Error types for SparseKV
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using KvError
pub type Result<T> = std::result::Result<T, KvError>;

/// Unified error type for SparseKV operations
///
/// A missing key is not an error: lookups return `Ok(None)`.
#[derive(Debug, Error)]
pub enum KvError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error on segment {segment}: {source}")]
    SegmentIo {
        segment: String,
        #[source]
        source: std::io::Error,
    },

    // -------------------------------------------------------------------------
    // Segment Errors
    // -------------------------------------------------------------------------
    #[error("Segment {segment} is not open")]
    NotInitialized { segment: String },

    #[error("Offset {offset} is past the end of segment {segment} ({size} bytes)")]
    OffsetOutOfRange {
        segment: String,
        offset: u64,
        size: u64,
    },

    #[error("Segment {segment} ends inside a key started at offset {offset}")]
    TruncatedSegment { segment: String, offset: u64 },

    #[error("Invalid segment name: {0:?}")]
    InvalidSegmentName(String),

    // -------------------------------------------------------------------------
    // Codec Errors
    // -------------------------------------------------------------------------
    #[error("Corrupt record: expected 2 fields, found {fields}")]
    CorruptRecord { fields: usize },

    // -------------------------------------------------------------------------
    // Engine Errors
    // -------------------------------------------------------------------------
    #[error("Flush pipeline error: {0}")]
    FlushPipeline(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl KvError {
    /// Attach the segment name to a bare I/O error
    pub(crate) fn segment_io(segment: &str, source: std::io::Error) -> Self {
        KvError::SegmentIo {
            segment: segment.to_string(),
            source,
        }
    }
}
