//! Store Interface
//!
//! The capability every storage backend offers. Callers depend on
//! [`Store`], never on a concrete backend.
//!
//! Backends:
//! - [`Engine`]: durable log-structured engine
//! - [`MemoryStore`]: volatile map, for demos and tests
//!
//! A proxy to an external cache service fits the same trait.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::engine::Engine;
use crate::error::Result;

/// Point reads and writes over byte keys
pub trait Store: Send + Sync {
    /// `Ok(None)` when the key was never written
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()>;
}

impl Store for Engine {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Engine::get(self, key)
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        Engine::set(self, key, value)
    }
}

/// Map-backed store that forgets everything on drop
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.data.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }
}
