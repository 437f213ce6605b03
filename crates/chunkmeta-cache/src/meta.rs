//! The chunk meta contract and the shared handle the manager hands out.

use std::any::Any;
use std::sync::Arc;

use chunkmeta_world::{ChunkCoord, PluginId, StorageError};
use parking_lot::{Mutex, MutexGuard};

use crate::error::ChunkMetaError;

/// One plugin's working set for one chunk.
pub trait ChunkMeta: Any + Send {
    /// Immutable for the lifetime of the object.
    fn chunk_coord(&self) -> ChunkCoord;

    fn plugin_id(&self) -> PluginId;

    /// Whether there are changes not yet written to storage.
    fn is_dirty(&self) -> bool;

    /// Hydrate from storage. Returns the number of records loaded.
    fn populate(&mut self) -> Result<usize, StorageError>;

    /// Write all pending changes. Clears the dirty flag only on full success.
    fn persist(&mut self) -> Result<(), StorageError>;

    fn is_empty(&self) -> bool;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Builds an empty chunk meta for `(plugin, chunk)`. Supplied by the consumer plugin.
pub type ChunkProducer = Arc<dyn Fn(PluginId, ChunkCoord) -> Box<dyn ChunkMeta> + Send + Sync>;

/// Shared handle to a registered chunk meta.
#[derive(Clone)]
pub struct ChunkMetaHandle {
    plugin: PluginId,
    coord: ChunkCoord,
    inner: Arc<Mutex<Box<dyn ChunkMeta>>>,
}

impl ChunkMetaHandle {
    pub(crate) fn new(meta: Box<dyn ChunkMeta>) -> Self {
        Self {
            plugin: meta.plugin_id(),
            coord: meta.chunk_coord(),
            inner: Arc::new(Mutex::new(meta)),
        }
    }

    pub fn plugin_id(&self) -> PluginId {
        self.plugin
    }

    pub fn chunk_coord(&self) -> ChunkCoord {
        self.coord
    }

    pub fn lock(&self) -> MutexGuard<'_, Box<dyn ChunkMeta>> {
        self.inner.lock()
    }

    /// Run `f` on the concrete meta type, failing if the registered meta is not a `T`.
    pub fn with<T: ChunkMeta, R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, ChunkMetaError> {
        let mut guard = self.inner.lock();
        match (**guard).as_any_mut().downcast_mut::<T>() {
            Some(meta) => Ok(f(meta)),
            None => Err(ChunkMetaError::TypeMismatch {
                plugin: self.plugin,
            }),
        }
    }

    /// Whether both handles point at the same registry entry.
    pub fn same_as(&self, other: &ChunkMetaHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for ChunkMetaHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkMetaHandle")
            .field("plugin", &self.plugin)
            .field("coord", &self.coord)
            .finish()
    }
}
