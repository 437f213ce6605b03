//! Storage engine contract for block-based metadata, plus the LevelDB and
//! in-memory backends.

mod leveldb;
mod memory;

pub use leveldb::LevelDbBlockEngine;
pub use memory::MemoryBlockEngine;

use std::sync::Arc;

use chunkmeta_world::{BlockLocation, ChunkCoord, PluginId, StorageError, WorldId, XzwCoord};

use crate::record::BlockDataObject;

/// Persistence for one kind of block record, keyed by `(plugin, world, block)`.
///
/// Every call may block on I/O. Callers keep these off threads that must stay
/// responsive.
pub trait BlockStorageEngine<D: BlockDataObject>: Send + Sync {
    /// Every chunk holding at least one record for `plugin`.
    fn all_data_chunks(&self, plugin: PluginId) -> Result<Vec<XzwCoord>, StorageError>;

    /// All records stored for one chunk. Empty when nothing is stored.
    fn load_chunk(&self, plugin: PluginId, chunk: ChunkCoord) -> Result<Vec<D>, StorageError>;

    /// Insert or overwrite one record.
    fn persist(&self, record: &D, world: WorldId, plugin: PluginId) -> Result<(), StorageError>;

    /// Insert or overwrite many records.
    fn persist_batch(&self, records: &[Arc<D>], plugin: PluginId) -> Result<(), StorageError> {
        for record in records {
            self.persist(record, record.location().world, plugin)?;
        }
        Ok(())
    }

    /// Point lookup that does not hydrate the containing chunk.
    fn get_for_location(
        &self,
        x: i32,
        y: i32,
        z: i32,
        world: WorldId,
        plugin: PluginId,
    ) -> Result<Option<D>, StorageError>;

    /// Remove a stored record. Removing a missing record is a no-op.
    fn delete(&self, location: BlockLocation, plugin: PluginId) -> Result<(), StorageError>;
}
