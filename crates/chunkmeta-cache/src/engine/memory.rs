//! In-memory block storage engine.
//!
//! Useful for development and testing. Data is lost on restart.

use std::collections::{BTreeMap, BTreeSet};

use chunkmeta_world::{BlockLocation, ChunkCoord, PluginId, StorageError, WorldId, XzwCoord};
use parking_lot::RwLock;

use super::BlockStorageEngine;
use crate::record::BlockDataObject;

/// Thread-safe map from `(plugin, location)` to a stored copy of the record.
pub struct MemoryBlockEngine<D> {
    records: RwLock<BTreeMap<(PluginId, BlockLocation), D>>,
}

impl<D> MemoryBlockEngine<D> {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of stored records across all plugins.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<D> Default for MemoryBlockEngine<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: BlockDataObject + Clone> BlockStorageEngine<D> for MemoryBlockEngine<D> {
    fn all_data_chunks(&self, plugin: PluginId) -> Result<Vec<XzwCoord>, StorageError> {
        let chunks: BTreeSet<XzwCoord> = self
            .records
            .read()
            .keys()
            .filter(|(p, _)| *p == plugin)
            .map(|(_, loc)| loc.chunk().xzw())
            .collect();
        Ok(chunks.into_iter().collect())
    }

    fn load_chunk(&self, plugin: PluginId, chunk: ChunkCoord) -> Result<Vec<D>, StorageError> {
        Ok(self
            .records
            .read()
            .iter()
            .filter(|((p, loc), _)| *p == plugin && loc.chunk() == chunk)
            .map(|(_, record)| record.clone())
            .collect())
    }

    fn persist(&self, record: &D, _world: WorldId, plugin: PluginId) -> Result<(), StorageError> {
        self.records
            .write()
            .insert((plugin, record.location()), record.clone());
        Ok(())
    }

    fn get_for_location(
        &self,
        x: i32,
        y: i32,
        z: i32,
        world: WorldId,
        plugin: PluginId,
    ) -> Result<Option<D>, StorageError> {
        Ok(self
            .records
            .read()
            .get(&(plugin, BlockLocation::new(world, x, y, z)))
            .cloned())
    }

    fn delete(&self, location: BlockLocation, plugin: PluginId) -> Result<(), StorageError> {
        self.records.write().remove(&(plugin, location));
        Ok(())
    }
}
