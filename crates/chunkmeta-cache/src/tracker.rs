//! Fallback store for block records written to chunks that are not resident.
//!
//! Entries are grouped by chunk so a loading chunk can take all of its
//! pending writes in one step.

use std::collections::HashMap;
use std::sync::Arc;

use chunkmeta_world::{BlockLocation, XzwCoord};

use crate::record::BlockDataObject;

pub struct SingleBlockTracker<D: BlockDataObject> {
    chunks: HashMap<XzwCoord, HashMap<BlockLocation, Arc<D>>>,
}

impl<D: BlockDataObject> SingleBlockTracker<D> {
    pub fn new() -> Self {
        Self {
            chunks: HashMap::new(),
        }
    }

    /// Store `record` at its location. Returns the record it replaced.
    pub fn put_block(&mut self, record: Arc<D>) -> Option<Arc<D>> {
        let location = record.location();
        self.chunks
            .entry(location.chunk().xzw())
            .or_default()
            .insert(location, record)
    }

    pub fn get_block(&self, location: BlockLocation) -> Option<Arc<D>> {
        self.chunks
            .get(&location.chunk().xzw())?
            .get(&location)
            .cloned()
    }

    pub fn remove_block(&mut self, location: BlockLocation) -> Option<Arc<D>> {
        let key = location.chunk().xzw();
        let blocks = self.chunks.get_mut(&key)?;
        let removed = blocks.remove(&location);
        if blocks.is_empty() {
            self.chunks.remove(&key);
        }
        removed
    }

    /// Remove and return every record held for `chunk`.
    pub fn take_chunk(&mut self, chunk: XzwCoord) -> Vec<Arc<D>> {
        self.chunks
            .remove(&chunk)
            .map(|blocks| blocks.into_values().collect())
            .unwrap_or_default()
    }

    /// Remove and return every record across all chunks.
    pub fn drain_all(&mut self) -> Vec<Arc<D>> {
        self.chunks
            .drain()
            .flat_map(|(_, blocks)| blocks.into_values())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.chunks.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }
}

impl<D: BlockDataObject> Default for SingleBlockTracker<D> {
    fn default() -> Self {
        Self::new()
    }
}
