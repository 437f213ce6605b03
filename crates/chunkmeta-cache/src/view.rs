//! Per-plugin facade over the global manager.

use std::marker::PhantomData;
use std::sync::Arc;

use chunkmeta_world::{ChunkCoord, PluginId, WorldId};

use crate::error::Result;
use crate::manager::{FlushSummary, GlobalChunkMetaManager, PluginHooks};
use crate::meta::{ChunkMeta, ChunkMetaHandle, ChunkProducer};

/// Pins one plugin id and one concrete chunk meta type `T`.
pub struct ChunkMetaView<T: ChunkMeta> {
    manager: Arc<GlobalChunkMetaManager>,
    plugin: PluginId,
    producer: ChunkProducer,
    _meta: PhantomData<fn() -> T>,
}

impl<T: ChunkMeta> ChunkMetaView<T> {
    /// Bind `plugin` to `producer` and register its hooks with the manager.
    pub fn create<F>(
        manager: Arc<GlobalChunkMetaManager>,
        plugin: PluginId,
        producer: F,
        hooks: Option<Arc<dyn PluginHooks>>,
    ) -> Result<Self>
    where
        F: Fn(PluginId, ChunkCoord) -> T + Send + Sync + 'static,
    {
        let producer: ChunkProducer =
            Arc::new(move |plugin: PluginId, chunk: ChunkCoord| {
                Box::new(producer(plugin, chunk)) as Box<dyn ChunkMeta>
            });
        manager.attach(plugin, producer.clone(), hooks)?;
        Ok(Self {
            manager,
            plugin,
            producer,
            _meta: PhantomData,
        })
    }

    pub fn plugin_id(&self) -> PluginId {
        self.plugin
    }

    pub fn manager(&self) -> &Arc<GlobalChunkMetaManager> {
        &self.manager
    }

    pub fn compute_if_absent(&self, world: WorldId, x: i32, z: i32) -> Result<ChunkMetaHandle> {
        self.manager
            .compute_if_absent(self.plugin, ChunkCoord::new(world, x, z), &self.producer)
    }

    /// The entry for `chunk` if it is resident, hydrating it on first access.
    pub fn compute_if_loaded(&self, chunk: ChunkCoord) -> Result<Option<ChunkMetaHandle>> {
        self.manager
            .compute_if_loaded(self.plugin, chunk, &self.producer)
    }

    pub fn get_chunk_meta(&self, chunk: ChunkCoord) -> Option<ChunkMetaHandle> {
        self.manager.get_chunk_meta(self.plugin, chunk)
    }

    /// Load `chunk` if needed and run `f` on its meta.
    pub fn with_chunk<R>(&self, chunk: ChunkCoord, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        self.compute_if_absent(chunk.world, chunk.x, chunk.z)?
            .with(f)
    }

    pub fn is_resident(&self, chunk: ChunkCoord) -> bool {
        self.manager.is_resident(self.plugin, chunk)
    }

    /// Flush this plugin's dirty entries.
    pub fn save_all(&self) -> FlushSummary {
        self.manager.save_plugin(self.plugin)
    }

    pub fn disable(&self) -> FlushSummary {
        self.manager.disable_plugin(self.plugin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;

    use chunkmeta_world::{LevelDbProvider, StorageError, WorldIdRegistry};

    use crate::manager::ManagerOptions;

    /// Chunk meta counting visits, with a fake persisted counter.
    struct Visits {
        plugin: PluginId,
        coord: ChunkCoord,
        count: u32,
        dirty: bool,
    }

    impl ChunkMeta for Visits {
        fn chunk_coord(&self) -> ChunkCoord {
            self.coord
        }
        fn plugin_id(&self) -> PluginId {
            self.plugin
        }
        fn is_dirty(&self) -> bool {
            self.dirty
        }
        fn populate(&mut self) -> std::result::Result<usize, StorageError> {
            Ok(0)
        }
        fn persist(&mut self) -> std::result::Result<(), StorageError> {
            self.dirty = false;
            Ok(())
        }
        fn is_empty(&self) -> bool {
            self.count == 0
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn view() -> ChunkMetaView<Visits> {
        let store = Arc::new(LevelDbProvider::open_in_memory().unwrap());
        let worlds = Arc::new(WorldIdRegistry::load(store.clone()).unwrap());
        let manager = GlobalChunkMetaManager::new(worlds, store, ManagerOptions::default()).unwrap();
        let plugin = manager.register_plugin("visits").unwrap();
        ChunkMetaView::create(
            manager,
            plugin,
            |plugin, coord| Visits {
                plugin,
                coord,
                count: 0,
                dirty: false,
            },
            None,
        )
        .unwrap()
    }

    #[test]
    fn with_chunk_mutates_typed_meta() {
        let view = view();
        let chunk = ChunkCoord::new(WorldId(1), 2, 3);
        for _ in 0..3 {
            view.with_chunk(chunk, |v| {
                v.count += 1;
                v.dirty = true;
            })
            .unwrap();
        }
        assert_eq!(view.with_chunk(chunk, |v| v.count).unwrap(), 3);
        assert!(view.is_resident(chunk));
        assert_eq!(view.save_all().flushed, 1);
    }

    #[test]
    fn disable_evicts_and_blocks_further_loads() {
        let view = view();
        let chunk = ChunkCoord::new(WorldId(1), 0, 0);
        view.compute_if_absent(chunk.world, chunk.x, chunk.z).unwrap();
        assert_eq!(view.disable().evicted, 1);
        assert!(view.get_chunk_meta(chunk).is_none());
        assert!(view
            .compute_if_absent(chunk.world, 0, 0)
            .unwrap_err()
            .is_invalid_argument());
    }

    #[test]
    fn compute_if_loaded_skips_unloaded() {
        let view = view();
        let chunk = ChunkCoord::new(WorldId(1), 5, 5);
        assert!(view.compute_if_loaded(chunk).unwrap().is_none());
        view.manager().load_chunk(chunk);
        assert!(view.compute_if_loaded(chunk).unwrap().is_some());
    }
}
