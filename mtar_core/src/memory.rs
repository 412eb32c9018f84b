//! In-memory content store.

use crate::cas::{ContentStore, copy_hashing};
use crate::cid::Cid;
use crate::error::{Error, Result};
use crate::hash::Hash;
use std::collections::HashMap;
use std::io::Read;
use std::sync::{Arc, Mutex, MutexGuard};

/// A content store held in a map. Useful for tests and for round trips that
/// never need to persist anything.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: Mutex<HashMap<Hash, Arc<[u8]>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct blobs held.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True if no blobs are held.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// True if content for `cid` is held.
    pub fn contains(&self, cid: &Cid) -> bool {
        self.lock().contains_key(cid.hash())
    }

    /// Drop a blob, leaving the store incomplete. Returns whether it was held.
    pub fn remove(&self, cid: &Cid) -> bool {
        self.lock().remove(cid.hash()).is_some()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Hash, Arc<[u8]>>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.blobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ContentStore for MemoryStore {
    fn put(&self, reader: &mut dyn Read) -> Result<Cid> {
        let mut data = Vec::new();
        let (hash, _) = copy_hashing(reader, &mut data)?;
        self.lock().entry(hash).or_insert_with(|| data.into());
        Ok(Cid::new(hash))
    }

    fn get(&self, cid: &Cid) -> Result<Vec<u8>> {
        self.lock()
            .get(cid.hash())
            .map(|blob| blob.to_vec())
            .ok_or_else(|| Error::not_found(cid.to_text()))
    }
}
