//! MemTable Module
//!
//! In-memory data structure for recent writes.
//!
//! ## Responsibilities
//! - Fast reads and writes in memory
//! - Last write wins per key
//! - Track distinct key count for flush triggers
//! - Ordered iteration for segment creation
//!
//! ## Data Structure Choice
//! BTreeMap:
//! - Ordered keys (required for segment generation)
//! - Detached wholesale with `mem::take` when it is handed to a flush

mod table;

pub use table::MemTable;
