//! # SparseKV
//!
//! An embedded log-structured key-value store with:
//! - Write-Ahead Logging (WAL) for durability
//! - Sorted in-memory memtable flushed in the background
//! - Immutable on-disk segments served through a sparse index
//! - Pairwise merge compaction (newer value wins)
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Engine                              │
//! │              (RwLock: memtable + active WAL)                │
//! └──────────┬──────────────────────────────────┬───────────────┘
//!            │ set                              │ get
//!            ▼                                  ▼
//!   ┌─────────────┐   ┌─────────────┐    memtable → sealed
//!   │     WAL     │   │  MemTable   │    memtables → segments
//!   │  (Append)   │   │ (BTreeMap)  │
//!   └─────────────┘   └──────┬──────┘
//!                            │ detach at threshold
//!                            ▼
//!                   ┌─────────────────┐
//!                   │  Flush Worker   │  (bounded queue, 1 thread)
//!                   └────────┬────────┘
//!                            ▼
//!                   ┌─────────────────┐
//!                   │ SegmentManager  │──► Segment + SparseIndex
//!                   │  (compaction)   │
//!                   └─────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod codec;
pub mod wal;
pub mod memtable;
pub mod storage;
mod flush;
pub mod engine;
pub mod store;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{KvError, Result};
pub use config::{Config, SegmentOptions, WalSyncStrategy};
pub use engine::Engine;
pub use store::{MemoryStore, Store};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of SparseKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
