//! Storage Module
//!
//! Persistent storage layer: immutable sorted segments, their sparse
//! indexes, and the manager that flushes and compacts them.
//!
//! ## Read Path
//! ```text
//!   SegmentManager::get(key)
//!     │  newest segment first
//!     ▼
//!   SparseIndex::locate(key) ──► (offset, limit) or "cannot contain"
//!     │
//!     ▼
//!   Segment::get(key, offset, limit) ──► binary search inside the range
//! ```

pub mod index;
mod manager;
pub mod segment;

pub use index::{Breakpoint, SparseIndex};
pub use manager::{IndexedSegment, MergeStats, SegmentManager};
pub use segment::{KeyHit, Segment, SegmentCursor};
