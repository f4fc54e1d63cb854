//! MemTable implementation
//!
//! BTreeMap-based sorted buffer. Not synchronized: the engine guards the
//! active table with its own lock, and a detached table is only read.

use std::collections::BTreeMap;
use std::mem;

/// In-memory table for recent writes
#[derive(Debug, Default)]
pub struct MemTable {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
    /// Approximate size in bytes (keys + values)
    size: usize,
}

impl MemTable {
    /// Create a new empty MemTable
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a value by key
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.data.get(key).map(Vec::as_slice)
    }

    /// Insert or overwrite a key; returns the distinct key count afterwards
    pub fn insert(&mut self, key: Vec<u8>, value: Vec<u8>) -> usize {
        let key_len = key.len();
        let value_len = value.len();
        match self.data.insert(key, value) {
            // The key was already counted
            Some(old) => self.size = self.size + value_len - old.len(),
            None => self.size += key_len + value_len,
        }
        self.data.len()
    }

    /// Distinct key count
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get approximate size in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    /// Entries in ascending key order
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.data.iter().map(|(k, v)| (k.as_slice(), v.as_slice()))
    }

    /// Take the contents, leaving an empty table in place
    pub fn detach(&mut self) -> MemTable {
        mem::take(self)
    }
}
